//! Deploy stage definitions and failure policies.

use crate::config::DeployConfig;
use crate::runner::CommandSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a stage failure means for the rest of the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run and surface the error.
    Fatal,

    /// Log, record in the report and continue.
    BestEffort,
}

/// Deploy stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Render the site descriptor into a cloud assembly.
    SynthesizeInfra,

    /// cdk deploy --app <assembly> --all --outputs-file <manifest>
    DeployInfra,

    /// Sync each site's build output into its bucket.
    UploadAssets,

    /// Read and classify the output manifest.
    ParseOutputs,

    /// CloudFront `/*` invalidation per distribution.
    InvalidateCdn,

    /// Cloudflare purge-everything for the configured zone.
    PurgeThirdParty,

    /// Delete the output manifest.
    Cleanup,
}

impl Stage {
    /// Every stage, in the order the pipeline runs them.
    pub const ORDER: [Stage; 7] = [
        Stage::SynthesizeInfra,
        Stage::DeployInfra,
        Stage::UploadAssets,
        Stage::ParseOutputs,
        Stage::InvalidateCdn,
        Stage::PurgeThirdParty,
        Stage::Cleanup,
    ];

    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::SynthesizeInfra => "synthesize_infra",
            Stage::DeployInfra => "deploy_infra",
            Stage::UploadAssets => "upload_assets",
            Stage::ParseOutputs => "parse_outputs",
            Stage::InvalidateCdn => "invalidate_cdn",
            Stage::PurgeThirdParty => "purge_third_party",
            Stage::Cleanup => "cleanup",
        }
    }

    /// Section header printed when the stage starts.
    pub fn title(&self) -> &'static str {
        match self {
            Stage::SynthesizeInfra => "CDK Synth",
            Stage::DeployInfra => "CDK Deploy",
            Stage::UploadAssets => "Website Upload",
            Stage::ParseOutputs => "CDK Outputs",
            Stage::InvalidateCdn => "CloudFront Cache Purge",
            Stage::PurgeThirdParty => "Cloudflare Cache Purge",
            Stage::Cleanup => "Clean up CDK output file if exists",
        }
    }

    /// Infrastructure and content changes are fatal. Once the site is
    /// live, everything after it is best effort.
    pub fn policy(&self) -> FailurePolicy {
        match self {
            Stage::SynthesizeInfra | Stage::DeployInfra | Stage::UploadAssets => {
                FailurePolicy::Fatal
            }
            Stage::ParseOutputs
            | Stage::InvalidateCdn
            | Stage::PurgeThirdParty
            | Stage::Cleanup => FailurePolicy::BestEffort,
        }
    }

    /// External command run by this stage, if it runs one.
    pub fn command(&self, config: &DeployConfig) -> Option<CommandSpec> {
        match self {
            Stage::DeployInfra => Some(CommandSpec::new(
                &config.cdk_bin,
                [
                    "deploy".to_string(),
                    "--app".to_string(),
                    config.assembly_dir.to_string_lossy().into_owned(),
                    "--all".to_string(),
                    "--outputs-file".to_string(),
                    config.outputs_file.to_string_lossy().into_owned(),
                ],
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config() -> DeployConfig {
        DeployConfig::from_lookup(Path::new("/work"), |_| None)
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::SynthesizeInfra.name(), "synthesize_infra");
        assert_eq!(Stage::DeployInfra.name(), "deploy_infra");
        assert_eq!(Stage::Cleanup.to_string(), "cleanup");
    }

    #[test]
    fn test_only_infra_stages_are_fatal() {
        let fatal: Vec<Stage> = Stage::ORDER
            .into_iter()
            .filter(|s| s.policy() == FailurePolicy::Fatal)
            .collect();
        assert_eq!(
            fatal,
            vec![Stage::SynthesizeInfra, Stage::DeployInfra, Stage::UploadAssets]
        );
    }

    #[test]
    fn test_cleanup_runs_last() {
        assert_eq!(Stage::ORDER.last(), Some(&Stage::Cleanup));
        assert_eq!(Stage::ORDER[0], Stage::SynthesizeInfra);
    }

    #[test]
    fn test_upload_precedes_cache_purges() {
        let position = |stage: Stage| Stage::ORDER.iter().position(|s| *s == stage);
        assert!(position(Stage::DeployInfra) < position(Stage::UploadAssets));
        assert!(position(Stage::UploadAssets) < position(Stage::InvalidateCdn));
    }

    #[test]
    fn test_stage_commands() {
        let config = config();

        // Synthesis runs in-process.
        assert!(Stage::SynthesizeInfra.command(&config).is_none());

        let deploy = Stage::DeployInfra.command(&config).expect("deploy");
        assert_eq!(deploy.program, "cdk");
        assert_eq!(deploy.flag_value("--app"), Some("/work/cdk.out"));
        assert_eq!(
            deploy.flag_value("--outputs-file"),
            Some("/work/cdk-output-data")
        );
        assert!(deploy.args.contains(&"--all".to_string()));

        assert!(Stage::UploadAssets.command(&config).is_none());
        assert!(Stage::ParseOutputs.command(&config).is_none());
        assert!(Stage::Cleanup.command(&config).is_none());
    }
}
