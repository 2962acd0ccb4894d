//! Deployment descriptors: the immutable input to stack synthesis.

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Countries allowed when a descriptor does not name its own.
pub const DEFAULT_ALLOWED_COUNTRIES: [&str; 4] = [
    "US", // United States
    "UM", // United States Minor Outlying Islands
    "DE", // Germany
    "FR", // France
];

/// Default stack id prefix; the sanitized hostname is appended to it.
pub const DEFAULT_STACK_PREFIX: &str = "CloudFrontWebsiteStack";

/// Everything needed to define one static website deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentDescriptor {
    /// Hostname of the website.
    pub website_url: String,

    /// Description for the website distribution.
    #[serde(default)]
    pub website_description: String,

    /// ARN of the public TLS certificate (ACM, us-east-1).
    #[serde(default)]
    pub certificate_arn: String,

    /// Relative/absolute path containing the built website artifacts.
    pub build_output_path: PathBuf,

    /// Allowed countries to access the website.
    #[serde(default)]
    pub allowed_countries: Option<Vec<String>>,

    /// Serve content over plain HTTP.
    #[serde(default)]
    pub force_http: bool,

    /// Development mode: the bucket and its objects are destroyed with the stack.
    #[serde(default)]
    pub dev_mode: bool,
}

impl DeploymentDescriptor {
    /// Create a TLS-enabled descriptor with default geo restrictions.
    pub fn new(
        website_url: impl Into<String>,
        website_description: impl Into<String>,
        certificate_arn: impl Into<String>,
        build_output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            website_url: website_url.into(),
            website_description: website_description.into(),
            certificate_arn: certificate_arn.into(),
            build_output_path: build_output_path.into(),
            allowed_countries: None,
            force_http: false,
            dev_mode: false,
        }
    }

    pub fn with_allowed_countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_countries = Some(countries.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_force_http(mut self) -> Self {
        self.force_http = true;
        self
    }

    pub fn with_dev_mode(mut self) -> Self {
        self.dev_mode = true;
        self
    }

    /// The geo allow-list that will be applied to the distribution.
    pub fn effective_countries(&self) -> Vec<String> {
        match &self.allowed_countries {
            Some(countries) => countries.clone(),
            None => DEFAULT_ALLOWED_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Check the descriptor for values that would produce a broken stack.
    pub fn validate(&self) -> Result<()> {
        let site = self.website_url.as_str();

        if site.trim().is_empty() {
            return Err(StackError::invalid("<unnamed>", "website_url must not be empty"));
        }

        if !self.force_http && self.certificate_arn.trim().is_empty() {
            return Err(StackError::invalid(
                site,
                "certificate_arn is required unless force_http is set",
            ));
        }

        if self.build_output_path.as_os_str().is_empty() {
            return Err(StackError::invalid(site, "build_output_path must not be empty"));
        }

        if let Some(countries) = &self.allowed_countries {
            if countries.is_empty() {
                return Err(StackError::invalid(
                    site,
                    "allowed_countries must not be empty when provided",
                ));
            }
            if let Some(bad) = countries.iter().find(|c| !is_country_code(c)) {
                return Err(StackError::invalid(
                    site,
                    format!("invalid country code: {bad:?}"),
                ));
            }
        }

        Ok(())
    }
}

fn is_country_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_uppercase())
}

/// A set of websites deployed together (`cdk deploy --all`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppDescriptor {
    #[serde(default = "default_stack_prefix")]
    pub stack_prefix: String,

    pub sites: Vec<DeploymentDescriptor>,
}

fn default_stack_prefix() -> String {
    DEFAULT_STACK_PREFIX.to_string()
}

impl AppDescriptor {
    pub fn new(sites: Vec<DeploymentDescriptor>) -> Self {
        Self {
            stack_prefix: default_stack_prefix(),
            sites,
        }
    }

    /// Parse an app descriptor from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let app: AppDescriptor = serde_json::from_str(json)?;
        app.validate()?;
        Ok(app)
    }

    /// Read and parse an app descriptor file.
    ///
    /// Relative `build_output_path`s are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut app = Self::from_json(&raw)?;
        if let Some(base) = path.parent() {
            for site in &mut app.sites {
                if site.build_output_path.is_relative() {
                    site.build_output_path = base.join(&site.build_output_path);
                }
            }
        }
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(StackError::NoSites);
        }
        let mut seen = HashSet::new();
        for site in &self.sites {
            site.validate()?;
            if !seen.insert(site.website_url.as_str()) {
                return Err(StackError::invalid(
                    &site.website_url,
                    "website_url is declared more than once",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeploymentDescriptor {
        DeploymentDescriptor::new(
            "dev.example.com",
            "dev personal site",
            "arn:aws:acm:us-east-1:123456789012:certificate/abc",
            "../site/dist",
        )
    }

    #[test]
    fn test_default_countries_used_when_unset() {
        let countries = descriptor().effective_countries();
        assert_eq!(countries, vec!["US", "UM", "DE", "FR"]);
    }

    #[test]
    fn test_explicit_countries_override_default() {
        let d = descriptor().with_allowed_countries(["CA"]);
        assert_eq!(d.effective_countries(), vec!["CA"]);
    }

    #[test]
    fn test_validate_accepts_valid_descriptor() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn test_validate_requires_certificate_for_tls() {
        let mut d = descriptor();
        d.certificate_arn = String::new();
        assert!(d.validate().is_err());

        let d = d.with_force_http();
        assert!(d.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_country_codes() {
        assert!(descriptor().with_allowed_countries(["us"]).validate().is_err());
        assert!(descriptor().with_allowed_countries(["USA"]).validate().is_err());
        assert!(descriptor()
            .with_allowed_countries(Vec::<String>::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_empty_url() {
        let mut d = descriptor();
        d.website_url = "  ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_app_descriptor_from_json_defaults() {
        let json = r#"{
            "sites": [{
                "website_url": "example.com",
                "certificate_arn": "arn:aws:acm:us-east-1:1:certificate/x",
                "build_output_path": "dist"
            }]
        }"#;
        let app = AppDescriptor::from_json(json).expect("parse");
        assert_eq!(app.stack_prefix, DEFAULT_STACK_PREFIX);
        assert_eq!(app.sites.len(), 1);
        assert!(!app.sites[0].force_http);
        assert!(!app.sites[0].dev_mode);
        assert!(app.sites[0].allowed_countries.is_none());
    }

    #[test]
    fn test_app_descriptor_rejects_empty_and_duplicates() {
        assert!(matches!(
            AppDescriptor::new(vec![]).validate(),
            Err(StackError::NoSites)
        ));
        let app = AppDescriptor::new(vec![descriptor(), descriptor()]);
        assert!(app.validate().is_err());
    }
}
