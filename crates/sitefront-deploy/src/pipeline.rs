//! Deploy pipeline orchestration.

use crate::cloudflare::{PurgeReceipt, ZonePurger};
use crate::cloudfront::{DistributionInvalidator, InvalidationReceipt};
use crate::config::{DeployConfig, ThirdPartyPurge};
use crate::error::{DeployError, InvalidationError, Result};
use crate::manifest::{load_manifest, StackOutputs};
use crate::runner::CommandRunner;
use crate::stage::{FailurePolicy, Stage};
use crate::upload::{sync_directory, BucketStore, SyncReceipt};
use serde::Serialize;
use sitefront_stack::{synthesize_assembly, AppDescriptor, CloudAssembly};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// How a stage ended.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Skipped(String),
    Failed(String),
}

/// Result of one executed stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub duration_ms: u64,
}

/// Build output synced into one stack's bucket.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadOutcome {
    pub stack_name: String,
    pub bucket_name: String,
    pub receipt: SyncReceipt,
}

/// Per-distribution invalidation result.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvalidationStatus {
    Created(InvalidationReceipt),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidationOutcome {
    pub stack_name: String,
    pub distribution_id: Option<String>,
    pub status: InvalidationStatus,
}

impl InvalidationOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, InvalidationStatus::Created(_))
    }
}

/// Result of a deploy run that got past the infrastructure stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeployReport {
    /// Executed stages, in order.
    pub stages: Vec<StageReport>,

    /// The synthesized cloud assembly that was deployed.
    pub assembly: Option<CloudAssembly>,

    pub uploads: Vec<UploadOutcome>,

    /// Stacks parsed from the output manifest.
    pub stacks: Vec<StackOutputs>,

    pub invalidations: Vec<InvalidationOutcome>,

    /// Set when the third-party purge ran and was accepted.
    pub purge: Option<PurgeReceipt>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl DeployReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|r| r.stage == stage)
    }

    /// Number of stages that failed (best effort only; fatal failures abort).
    pub fn failed_count(&self) -> usize {
        self.stages
            .iter()
            .filter(|r| matches!(r.status, StageStatus::Failed(_)))
            .count()
    }

    /// Whether every stage either succeeded or was deliberately skipped.
    pub fn is_clean(&self) -> bool {
        self.failed_count() == 0
    }
}

/// Sequential deploy pipeline.
///
/// Stages run strictly one after another in [`Stage::ORDER`]. A failure in a
/// [`FailurePolicy::Fatal`] stage aborts the run with an error; failures in
/// [`FailurePolicy::BestEffort`] stages are logged, recorded in the report
/// and do not stop later stages. Once the deploy stage has succeeded, the
/// output manifest is cleaned up exactly once even if a later stage aborts.
pub struct DeployPipeline {
    config: DeployConfig,
    runner: Arc<dyn CommandRunner>,
    store: Arc<dyn BucketStore>,
    invalidator: Arc<dyn DistributionInvalidator>,
    purger: Arc<dyn ZonePurger>,
}

impl DeployPipeline {
    pub fn new(
        config: DeployConfig,
        runner: Arc<dyn CommandRunner>,
        store: Arc<dyn BucketStore>,
        invalidator: Arc<dyn DistributionInvalidator>,
        purger: Arc<dyn ZonePurger>,
    ) -> Self {
        Self {
            config,
            runner,
            store,
            invalidator,
            purger,
        }
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Execute every stage and return the report.
    pub async fn run(&self) -> Result<DeployReport> {
        let start = Instant::now();
        let mut report = DeployReport::default();

        info!(
            working_dir = %self.config.working_dir.display(),
            descriptor = %self.config.descriptor_path.display(),
            outputs_file = %self.config.outputs_file.display(),
            "Starting website deploy"
        );

        let mut deployed = false;
        for stage in Stage::ORDER {
            info!(stage = %stage, "*** {} ***", stage.title());
            let stage_start = Instant::now();

            let status = match self.execute(stage, &mut report).await {
                Ok(status) => status,
                Err(err) => match stage.policy() {
                    FailurePolicy::Fatal => {
                        error!(stage = %stage, error = %err, "Fatal stage failed, aborting deploy");
                        if deployed {
                            info!(stage = %Stage::Cleanup, "*** {} ***", Stage::Cleanup.title());
                            if let Err(cleanup_err) = self.cleanup().await {
                                warn!(error = %cleanup_err, "Cleanup after aborted deploy failed");
                            }
                        }
                        return Err(err);
                    }
                    FailurePolicy::BestEffort => {
                        warn!(stage = %stage, error = %err, "Stage failed, continuing");
                        StageStatus::Failed(err.to_string())
                    }
                },
            };

            if stage == Stage::DeployInfra {
                deployed = true;
            }

            report.stages.push(StageReport {
                stage,
                status,
                duration_ms: stage_start.elapsed().as_millis() as u64,
            });
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if report.is_clean() {
            info!(duration_ms = report.duration_ms, "Website deploy completed");
        } else {
            warn!(
                duration_ms = report.duration_ms,
                failed_stages = report.failed_count(),
                "Website deploy completed with failed best-effort stages"
            );
        }

        Ok(report)
    }

    async fn execute(&self, stage: Stage, report: &mut DeployReport) -> Result<StageStatus> {
        match stage {
            Stage::SynthesizeInfra => self.synthesize_infra(report).await,
            Stage::DeployInfra => self.run_command(stage).await,
            Stage::UploadAssets => self.upload_assets(report).await,
            Stage::ParseOutputs => self.parse_outputs(report).await,
            Stage::InvalidateCdn => self.invalidate_cdn(report).await,
            Stage::PurgeThirdParty => self.purge_third_party(report).await,
            Stage::Cleanup => self.cleanup().await,
        }
    }

    async fn run_command(&self, stage: Stage) -> Result<StageStatus> {
        let Some(command) = stage.command(&self.config) else {
            return Ok(StageStatus::Skipped("stage has no command".to_string()));
        };

        info!("> {}", command);
        self.runner
            .run(&command)
            .await
            .map_err(|source| DeployError::Command {
                stage: stage.name(),
                source,
            })?;

        Ok(StageStatus::Succeeded)
    }

    async fn synthesize_infra(&self, report: &mut DeployReport) -> Result<StageStatus> {
        let path = &self.config.descriptor_path;
        let app = AppDescriptor::load(path).map_err(|source| DeployError::Descriptor {
            path: path.display().to_string(),
            source,
        })?;

        let assembly = synthesize_assembly(&app, &self.config.assembly_dir)?;
        for stack in &assembly.stacks {
            info!(stack = %stack.stack_name, template = %stack.template_file.display(), "Synthesized");
        }
        report.assembly = Some(assembly);

        Ok(StageStatus::Succeeded)
    }

    async fn upload_assets(&self, report: &mut DeployReport) -> Result<StageStatus> {
        let Some(assembly) = &report.assembly else {
            return Ok(StageStatus::Skipped("nothing synthesized".to_string()));
        };

        for stack in &assembly.stacks {
            let receipt =
                sync_directory(self.store.as_ref(), &stack.bucket_name, &stack.source_dir)
                    .await
                    .map_err(|source| DeployError::Upload {
                        stack: stack.stack_name.clone(),
                        source,
                    })?;

            info!(
                stack = %stack.stack_name,
                uploaded = receipt.uploaded,
                deleted = receipt.deleted,
                "[S3][{}] Upload status: SUCCESS",
                stack.bucket_name
            );
            report.uploads.push(UploadOutcome {
                stack_name: stack.stack_name.clone(),
                bucket_name: stack.bucket_name.clone(),
                receipt,
            });
        }

        Ok(StageStatus::Succeeded)
    }

    async fn parse_outputs(&self, report: &mut DeployReport) -> Result<StageStatus> {
        let stacks = load_manifest(&self.config.outputs_file).await?;

        for stack in &stacks {
            info!("\n{}", stack);
        }
        report.stacks = stacks;

        Ok(StageStatus::Succeeded)
    }

    async fn invalidate_cdn(&self, report: &mut DeployReport) -> Result<StageStatus> {
        if report.stacks.is_empty() {
            return Ok(StageStatus::Skipped("no deployed stacks".to_string()));
        }

        for stack in &report.stacks {
            let status = match stack.distribution_id.as_deref() {
                None => InvalidationStatus::Failed {
                    error: InvalidationError::MissingDistributionId {
                        stack: stack.stack_name.clone(),
                    }
                    .to_string(),
                },
                Some(distribution_id) => {
                    match self.invalidator.invalidate_all(distribution_id).await {
                        Ok(receipt) => {
                            info!(
                                invalidation_id = %receipt.invalidation_id,
                                "[CloudFront][{}] Cache purge status: {}",
                                distribution_id,
                                receipt.status
                            );
                            InvalidationStatus::Created(receipt)
                        }
                        Err(e) => InvalidationStatus::Failed {
                            error: e.to_string(),
                        },
                    }
                }
            };

            if let InvalidationStatus::Failed { error } = &status {
                warn!(
                    stack = %stack.stack_name,
                    "[CloudFront][{}] Cache purge status: FAIL ({})",
                    stack.distribution_id.as_deref().unwrap_or("-"),
                    error
                );
            }

            report.invalidations.push(InvalidationOutcome {
                stack_name: stack.stack_name.clone(),
                distribution_id: stack.distribution_id.clone(),
                status,
            });
        }

        let total = report.invalidations.len();
        let failed = report
            .invalidations
            .iter()
            .filter(|o| !o.succeeded())
            .count();
        if failed > 0 {
            return Err(DeployError::Invalidation { failed, total });
        }

        Ok(StageStatus::Succeeded)
    }

    async fn purge_third_party(&self, report: &mut DeployReport) -> Result<StageStatus> {
        let credentials = match &self.config.cloudflare {
            ThirdPartyPurge::Enabled(credentials) => credentials,
            ThirdPartyPurge::Disabled { missing } => {
                let missing = missing.join(", ");
                warn!(missing = %missing, "Missing required env variables, skipping Cloudflare purge");
                return Ok(StageStatus::Skipped(format!("missing {}", missing)));
            }
        };

        let receipt = self.purger.purge_everything(credentials).await?;
        info!(purge_id = %receipt.id, "[Cloudflare] Cache purge status: SUCCESS");
        report.purge = Some(receipt);

        Ok(StageStatus::Succeeded)
    }

    async fn cleanup(&self) -> Result<StageStatus> {
        let path = &self.config.outputs_file;
        info!("> {}", path.display());

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                info!("File deletion status: SUCCESS");
                Ok(StageStatus::Succeeded)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("File deletion status: SUCCESS (already absent)");
                Ok(StageStatus::Succeeded)
            }
            Err(source) => Err(DeployError::Cleanup {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage_report(stage: Stage, status: StageStatus) -> StageReport {
        StageReport {
            stage,
            status,
            duration_ms: 10,
        }
    }

    #[test]
    fn test_report_counts() {
        let report = DeployReport {
            stages: vec![
                stage_report(Stage::SynthesizeInfra, StageStatus::Succeeded),
                stage_report(Stage::DeployInfra, StageStatus::Succeeded),
                stage_report(Stage::UploadAssets, StageStatus::Succeeded),
                stage_report(Stage::ParseOutputs, StageStatus::Succeeded),
                stage_report(
                    Stage::InvalidateCdn,
                    StageStatus::Failed("1 of 1 CloudFront invalidations failed".to_string()),
                ),
                stage_report(
                    Stage::PurgeThirdParty,
                    StageStatus::Skipped("missing CLOUDFLARE_ZONE_ID".to_string()),
                ),
                stage_report(Stage::Cleanup, StageStatus::Succeeded),
            ],
            ..Default::default()
        };

        assert_eq!(report.failed_count(), 1);
        assert!(!report.is_clean());
        assert!(matches!(
            report.stage(Stage::PurgeThirdParty).map(|r| &r.status),
            Some(StageStatus::Skipped(_))
        ));
    }

    #[test]
    fn test_stage_status_serialization() {
        let value = serde_json::to_value(StageStatus::Skipped("no stacks".to_string()))
            .expect("serialize");
        assert_eq!(
            value,
            serde_json::json!({ "status": "skipped", "reason": "no stacks" })
        );
        let value = serde_json::to_value(StageStatus::Succeeded).expect("serialize");
        assert_eq!(value, serde_json::json!({ "status": "succeeded" }));
    }
}
