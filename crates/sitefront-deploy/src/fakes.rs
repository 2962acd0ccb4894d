//! In-memory fakes for the pipeline's external seams (testing only)
//!
//! Provides `ScriptedRunner`, `InMemoryBucketStore`, `RecordingInvalidator`
//! and `RecordingPurger`, which satisfy the trait contracts without spawning
//! processes or touching the network.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cloudflare::{PurgeReceipt, ZonePurger};
use crate::cloudfront::{DistributionInvalidator, InvalidationReceipt};
use crate::config::CloudflareCredentials;
use crate::error::{InvalidationError, PurgeError, RunnerError, UploadError};
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};
use crate::upload::{BucketStore, LocalAsset};

const OUTPUTS_FILE_FLAG: &str = "--outputs-file";

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Records every command and plays back a scripted outcome.
///
/// A command carrying `--outputs-file <path>` gets the configured manifest
/// written to `<path>`, mimicking `cdk deploy`.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    manifest: Option<String>,
    fail_on: Option<(String, i32)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manifest contents written by the deploy command.
    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    /// Fail any command whose first argument is `subcommand`.
    pub fn failing_on(mut self, subcommand: impl Into<String>, exit_code: i32) -> Self {
        self.fail_on = Some((subcommand.into(), exit_code));
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(command.clone());

        if let Some((subcommand, exit_code)) = &self.fail_on {
            if command.args.first() == Some(subcommand) {
                return Err(RunnerError::Failed {
                    command: command.to_string(),
                    exit_code: *exit_code,
                    stdout: String::new(),
                    stderr: format!("{} failed", subcommand),
                });
            }
        }

        if let (Some(path), Some(manifest)) = (command.flag_value(OUTPUTS_FILE_FLAG), &self.manifest) {
            std::fs::write(path, manifest).map_err(|source| RunnerError::Launch {
                command: command.to_string(),
                source,
            })?;
        }

        Ok(CommandOutput {
            stdout: format!("ran {}", command),
            stderr: String::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryBucketStore
// ---------------------------------------------------------------------------

/// Buckets as sets of keys; uploads to configured buckets fail.
#[derive(Debug, Default)]
pub struct InMemoryBucketStore {
    failing: HashSet<String>,
    buckets: Mutex<BTreeMap<String, BTreeSet<String>>>,
    puts: Mutex<Vec<(String, String)>>,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing object.
    pub fn with_object(self, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.into())
            .or_default()
            .insert(key.into());
        self
    }

    pub fn failing_for(mut self, bucket: impl Into<String>) -> Self {
        self.failing.insert(bucket.into());
        self
    }

    /// Current keys in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every `(bucket, key)` uploaded, in call order.
    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, UploadError> {
        Ok(self.keys(bucket))
    }

    async fn put_object(&self, bucket: &str, asset: &LocalAsset) -> Result<(), UploadError> {
        self.puts
            .lock()
            .unwrap()
            .push((bucket.to_string(), asset.key.clone()));

        if self.failing.contains(bucket) {
            return Err(UploadError::Api(format!("AccessDenied: {}", bucket)));
        }

        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(asset.key.clone());
        Ok(())
    }

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), UploadError> {
        if let Some(existing) = self.buckets.lock().unwrap().get_mut(bucket) {
            for key in keys {
                existing.remove(key);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingInvalidator
// ---------------------------------------------------------------------------

/// Records requested distribution ids; fails for the configured ones.
#[derive(Debug, Default)]
pub struct RecordingInvalidator {
    failing: HashSet<String>,
    requested: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, distribution_id: impl Into<String>) -> Self {
        self.failing.insert(distribution_id.into());
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl DistributionInvalidator for RecordingInvalidator {
    async fn invalidate_all(
        &self,
        distribution_id: &str,
    ) -> Result<InvalidationReceipt, InvalidationError> {
        let mut requested = self.requested.lock().unwrap();
        requested.push(distribution_id.to_string());

        if self.failing.contains(distribution_id) {
            return Err(InvalidationError::Api(format!(
                "NoSuchDistribution: {}",
                distribution_id
            )));
        }

        Ok(InvalidationReceipt {
            invalidation_id: format!("I{}", requested.len()),
            status: "InProgress".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingPurger
// ---------------------------------------------------------------------------

/// Records purge calls by zone id.
#[derive(Debug, Default)]
pub struct RecordingPurger {
    fail: bool,
    zones: Mutex<Vec<String>>,
}

impl RecordingPurger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.zones.lock().unwrap().len()
    }

    pub fn zones(&self) -> Vec<String> {
        self.zones.lock().unwrap().clone()
    }
}

#[async_trait]
impl ZonePurger for RecordingPurger {
    async fn purge_everything(
        &self,
        credentials: &CloudflareCredentials,
    ) -> Result<PurgeReceipt, PurgeError> {
        self.zones.lock().unwrap().push(credentials.zone_id.clone());

        if self.fail {
            return Err(PurgeError::Rejected {
                status: 403,
                message: "[10000] Authentication error".to_string(),
            });
        }

        Ok(PurgeReceipt {
            id: credentials.zone_id.clone(),
        })
    }
}
