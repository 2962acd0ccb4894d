//! Name derivation for stacks, buckets, logical ids and outputs.
//!
//! Every identifier in a synthesized stack is derived from the website
//! hostname, so redeploying the same hostname always targets the same
//! resources.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

/// Output key prefix for the origin bucket name.
pub const BUCKET_NAME_OUTPUT: &str = "bucketName";
/// Output key prefix for the distribution id.
pub const DISTRIBUTION_ID_OUTPUT: &str = "distributionId";
/// Output key prefix for the distribution's `*.cloudfront.net` hostname.
pub const DISTRIBUTION_HOST_NAME_OUTPUT: &str = "distributionHostName";

const BUCKET_SUFFIX: &str = "static-website";

fn non_id_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)[^a-z0-9-]+").expect("static regex"))
}

fn non_bucket_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9.-]+").expect("static regex"))
}

fn separator_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.-]+").expect("static regex"))
}

/// Replace every run of characters outside `[a-zA-Z0-9-]` with a single `-`.
pub fn url_to_id_format(url: &str) -> String {
    non_id_chars().replace_all(url, "-").into_owned()
}

/// Strip a hostname down to characters S3 accepts in bucket names.
///
/// Logs a warning when anything had to be removed.
pub fn sanitize_bucket_base(base: &str) -> String {
    let sanitized = non_bucket_chars().replace_all(base, "").into_owned();
    if sanitized != base {
        warn!(original = %base, sanitized = %sanitized, "Sanitized provided bucket name");
    }
    sanitized
}

/// CloudFormation logical ids are alphanumeric only.
pub fn to_logical_id(id: &str) -> String {
    id.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// All derived names for one website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteNames {
    /// CloudFormation stack name.
    pub stack_name: String,
    /// Physical S3 bucket name.
    pub bucket_name: String,
    /// Hyphenated id shared by the bucket's child resources.
    pub construct_id: String,
    /// Alphanumeric form of `construct_id`.
    pub logical_id: String,
}

impl SiteNames {
    pub fn derive(stack_prefix: &str, website_url: &str) -> Self {
        let stack_name = format!("{}-{}", stack_prefix, url_to_id_format(website_url));
        let bucket_name = format!("{}-{}", sanitize_bucket_base(website_url), BUCKET_SUFFIX);
        let construct_id = separator_runs().replace_all(&bucket_name, "-").into_owned();
        let logical_id = to_logical_id(&construct_id);

        Self {
            stack_name,
            bucket_name,
            construct_id,
            logical_id,
        }
    }

    /// Logical id of a child resource, e.g. `resource("Cdn")`.
    pub fn resource(&self, suffix: &str) -> String {
        format!("{}{}", self.logical_id, suffix)
    }

    /// Key under which an output appears in the deploy outputs file.
    pub fn output_key(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.logical_id)
    }

    /// Stack export name for an output.
    pub fn export_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.construct_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_to_id_format_collapses_runs() {
        assert_eq!(url_to_id_format("dev.example.com"), "dev-example-com");
        assert_eq!(url_to_id_format("a..b//c"), "a-b-c");
        assert_eq!(url_to_id_format("My-Site.IO"), "My-Site-IO");
    }

    #[test]
    fn test_sanitize_bucket_base_drops_invalid_chars() {
        assert_eq!(sanitize_bucket_base("dev.example.com"), "dev.example.com");
        assert_eq!(sanitize_bucket_base("Dev.Example_com"), "ev.xamplecom");
    }

    #[test]
    fn test_site_names_derivation() {
        let names = SiteNames::derive("CloudFrontWebsiteStack", "dev.example.com");
        assert_eq!(names.stack_name, "CloudFrontWebsiteStack-dev-example-com");
        assert_eq!(names.bucket_name, "dev.example.com-static-website");
        assert_eq!(names.construct_id, "dev-example-com-static-website");
        assert_eq!(names.logical_id, "devexamplecomstaticwebsite");
    }

    #[test]
    fn test_output_keys_start_with_prefix() {
        let names = SiteNames::derive("Stack", "example.com");
        assert!(names
            .output_key(BUCKET_NAME_OUTPUT)
            .starts_with(BUCKET_NAME_OUTPUT));
        assert_eq!(
            names.export_name(DISTRIBUTION_ID_OUTPUT),
            "distributionId-example-com-static-website"
        );
    }
}
