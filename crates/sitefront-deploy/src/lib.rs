//! sitefront deploy - release pipeline for static websites
//!
//! Runs the deploy as an ordered list of stages:
//! - synthesizes a cloud assembly in-process and deploys it via the deployment CLI
//! - syncs each site's build output into its origin bucket
//! - parses the output manifest into typed per-stack records
//! - invalidates each CloudFront distribution and purges the Cloudflare zone
//! - removes the transient manifest
//!
//! Synthesis, deploy and upload are fatal; everything after them is best effort.

pub mod cloudflare;
pub mod cloudfront;
pub mod config;
pub mod error;
pub mod fakes;
pub mod manifest;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod telemetry;
pub mod upload;

// Re-export key types
pub use cloudflare::{CloudflareClient, PurgeReceipt, ZonePurger};
pub use cloudfront::{CloudFrontInvalidator, DistributionInvalidator, InvalidationReceipt};
pub use config::{CloudflareCredentials, DeployConfig, ThirdPartyPurge};
pub use error::{
    DeployError, InvalidationError, ManifestError, PurgeError, Result, RunnerError, UploadError,
};
pub use manifest::{load_manifest, parse_manifest, OutputField, OutputKind, StackOutputs};
pub use pipeline::{
    DeployPipeline, DeployReport, InvalidationStatus, StageReport, StageStatus, UploadOutcome,
};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, ProcessRunner};
pub use stage::{FailurePolicy, Stage};
pub use upload::{sync_directory, BucketStore, LocalAsset, S3BucketStore, SyncReceipt};
