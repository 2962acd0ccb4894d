//! Output manifest parsing.
//!
//! The deploy step writes `{ [stackName]: { [outputKey]: string } }`. Each
//! output key is classified by prefix into a typed field; keys with no
//! recognized prefix become [`OutputField::Unknown`] instead of failing the
//! parse.

use crate::error::ManifestError;
use serde::Serialize;
use sitefront_stack::{BUCKET_NAME_OUTPUT, DISTRIBUTION_HOST_NAME_OUTPUT, DISTRIBUTION_ID_OUTPUT};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

/// Outputs the pipeline knows how to use.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    BucketName,
    DistributionId,
    DistributionHostName,
}

impl OutputKind {
    pub const ALL: [OutputKind; 3] = [
        OutputKind::BucketName,
        OutputKind::DistributionId,
        OutputKind::DistributionHostName,
    ];

    /// Key prefix the stack definition gives this output.
    pub fn prefix(&self) -> &'static str {
        match self {
            OutputKind::BucketName => BUCKET_NAME_OUTPUT,
            OutputKind::DistributionId => DISTRIBUTION_ID_OUTPUT,
            OutputKind::DistributionHostName => DISTRIBUTION_HOST_NAME_OUTPUT,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| key.starts_with(kind.prefix()))
    }
}

/// One classified manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputField {
    Known { kind: OutputKind, value: String },
    Unknown { key: String, value: String },
}

impl OutputField {
    pub fn classify(key: &str, value: String) -> Self {
        match OutputKind::from_key(key) {
            Some(kind) => OutputField::Known { kind, value },
            None => OutputField::Unknown {
                key: key.to_string(),
                value,
            },
        }
    }
}

/// An output key with no recognized prefix.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UnknownOutput {
    pub key: String,
    pub value: String,
}

/// Identifiers of one deployed stack.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StackOutputs {
    pub stack_name: String,
    pub bucket_name: Option<String>,
    pub distribution_id: Option<String>,
    pub distribution_host_name: Option<String>,
    pub unknown: Vec<UnknownOutput>,
}

impl StackOutputs {
    fn from_fields(stack_name: String, fields: Vec<OutputField>) -> Self {
        let mut outputs = StackOutputs {
            stack_name,
            ..Default::default()
        };

        for field in fields {
            match field {
                OutputField::Known { kind, value } => {
                    let slot = match kind {
                        OutputKind::BucketName => &mut outputs.bucket_name,
                        OutputKind::DistributionId => &mut outputs.distribution_id,
                        OutputKind::DistributionHostName => &mut outputs.distribution_host_name,
                    };
                    if let Some(previous) = slot.replace(value) {
                        warn!(
                            stack = %outputs.stack_name,
                            output = ?kind,
                            %previous,
                            "Duplicate CDK output, keeping the later value"
                        );
                    }
                }
                OutputField::Unknown { key, value } => {
                    warn!(
                        stack = %outputs.stack_name,
                        "CDK output name not recognized: {} (value: {})",
                        key,
                        value
                    );
                    outputs.unknown.push(UnknownOutput { key, value });
                }
            }
        }

        outputs
    }

    pub fn get(&self, kind: OutputKind) -> Option<&str> {
        match kind {
            OutputKind::BucketName => self.bucket_name.as_deref(),
            OutputKind::DistributionId => self.distribution_id.as_deref(),
            OutputKind::DistributionHostName => self.distribution_host_name.as_deref(),
        }
    }
}

impl fmt::Display for StackOutputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
        writeln!(f, "stackName\t\t{}", self.stack_name)?;
        writeln!(f, "s3BucketName\t\t{}", show(&self.bucket_name))?;
        writeln!(f, "distributionId\t\t{}", show(&self.distribution_id))?;
        write!(
            f,
            "distributionHostName\t{}",
            show(&self.distribution_host_name)
        )
    }
}

/// Parse manifest JSON into one record per stack, ordered by stack name.
pub fn parse_manifest(raw: &str) -> Result<Vec<StackOutputs>, ManifestError> {
    let stacks: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(raw)?;

    Ok(stacks
        .into_iter()
        .map(|(stack_name, outputs)| {
            let fields = outputs
                .into_iter()
                .map(|(key, value)| OutputField::classify(&key, value))
                .collect();
            StackOutputs::from_fields(stack_name, fields)
        })
        .collect())
}

/// Read and parse the manifest at `path`.
pub async fn load_manifest(path: &Path) -> Result<Vec<StackOutputs>, ManifestError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ManifestError::Read {
            path: path.display().to_string(),
            source,
        })?;
    parse_manifest(&raw)
}
