//! Deploy configuration, resolved once at startup.

use crate::cloudflare::CLOUDFLARE_API_BASE;
use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

pub const CDK_BIN_VAR: &str = "SITEFRONT_CDK_BIN";
pub const OUTPUTS_FILE_VAR: &str = "SITEFRONT_OUTPUTS_FILE";
pub const DESCRIPTOR_VAR: &str = "SITEFRONT_DESCRIPTOR";
pub const ASSEMBLY_DIR_VAR: &str = "SITEFRONT_ASSEMBLY_DIR";
pub const CLOUDFLARE_EMAIL_VAR: &str = "CLOUDFLARE_EMAIL";
pub const CLOUDFLARE_API_KEY_VAR: &str = "CLOUDFLARE_API_KEY";
pub const CLOUDFLARE_ZONE_ID_VAR: &str = "CLOUDFLARE_ZONE_ID";
pub const CLOUDFLARE_API_BASE_VAR: &str = "CLOUDFLARE_API_BASE";

pub const DEFAULT_CDK_BIN: &str = "cdk";

/// Manifest file name, relative to the working directory.
pub const DEFAULT_OUTPUTS_FILE: &str = "cdk-output-data";

/// Site descriptor, relative to the working directory.
pub const DEFAULT_DESCRIPTOR: &str = "site.json";

/// Cloud assembly directory, relative to the working directory.
pub const DEFAULT_ASSEMBLY_DIR: &str = "cdk.out";

/// Cloudflare global API key credentials for one zone.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudflareCredentials {
    pub email: String,
    pub api_key: String,
    pub zone_id: String,
}

impl fmt::Debug for CloudflareCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudflareCredentials")
            .field("email", &self.email)
            .field("api_key", &"<redacted>")
            .field("zone_id", &self.zone_id)
            .finish()
    }
}

/// Whether the third-party zone purge can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThirdPartyPurge {
    Enabled(CloudflareCredentials),
    /// At least one credential variable was unset or empty.
    Disabled { missing: Vec<&'static str> },
}

impl ThirdPartyPurge {
    fn resolve(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let vars = [
            CLOUDFLARE_EMAIL_VAR,
            CLOUDFLARE_API_KEY_VAR,
            CLOUDFLARE_ZONE_ID_VAR,
        ];
        let values: Vec<Option<String>> = vars.iter().map(|v| non_empty(lookup(v))).collect();

        let missing: Vec<&'static str> = vars
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        match values.as_slice() {
            [Some(email), Some(api_key), Some(zone_id)] => {
                ThirdPartyPurge::Enabled(CloudflareCredentials {
                    email: email.clone(),
                    api_key: api_key.clone(),
                    zone_id: zone_id.clone(),
                })
            }
            _ => ThirdPartyPurge::Disabled { missing },
        }
    }

    pub fn credentials(&self) -> Option<&CloudflareCredentials> {
        match self {
            ThirdPartyPurge::Enabled(credentials) => Some(credentials),
            ThirdPartyPurge::Disabled { .. } => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Everything the deploy pipeline needs from its environment.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// Directory the deployment CLI runs in.
    pub working_dir: PathBuf,

    /// Deployment CLI executable.
    pub cdk_bin: String,

    /// Transient output manifest path.
    pub outputs_file: PathBuf,

    /// Site descriptor synthesized into the deployed stacks.
    pub descriptor_path: PathBuf,

    /// Where the cloud assembly is written and deployed from.
    pub assembly_dir: PathBuf,

    pub cloudflare: ThirdPartyPurge,

    pub cloudflare_api_base: String,
}

impl DeployConfig {
    /// Build from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::from_lookup(&cwd, |key| std::env::var(key).ok()))
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(working_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let cdk_bin = non_empty(lookup(CDK_BIN_VAR)).unwrap_or_else(|| DEFAULT_CDK_BIN.to_string());

        let path_var = |var: &str, default: &str| {
            working_dir.join(non_empty(lookup(var)).unwrap_or_else(|| default.to_string()))
        };
        let outputs_file = path_var(OUTPUTS_FILE_VAR, DEFAULT_OUTPUTS_FILE);
        let descriptor_path = path_var(DESCRIPTOR_VAR, DEFAULT_DESCRIPTOR);
        let assembly_dir = path_var(ASSEMBLY_DIR_VAR, DEFAULT_ASSEMBLY_DIR);

        let cloudflare_api_base = non_empty(lookup(CLOUDFLARE_API_BASE_VAR))
            .unwrap_or_else(|| CLOUDFLARE_API_BASE.to_string());

        Self {
            working_dir: working_dir.to_path_buf(),
            cdk_bin,
            outputs_file,
            descriptor_path,
            assembly_dir,
            cloudflare: ThirdPartyPurge::resolve(&lookup),
            cloudflare_api_base,
        }
    }
}
