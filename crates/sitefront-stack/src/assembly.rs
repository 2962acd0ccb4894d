//! Cloud assembly output.
//!
//! `cdk deploy --app <dir>` accepts a pre-synthesized assembly directory:
//! a `manifest.json` listing one `aws:cloudformation:stack` artifact per
//! template, the templates themselves, and a `cdk.out` version marker.

use crate::error::Result;
use crate::synth::write_templates;
use crate::template::StackTemplate;
use serde::Serialize;
use serde_json::{json, Map};
use std::path::{Path, PathBuf};
use tracing::info;

/// Assembly schema version written to `manifest.json`.
pub const CLOUD_ASSEMBLY_VERSION: &str = "21.0.0";

pub const MANIFEST_FILE: &str = "manifest.json";

/// Version marker file the CLI checks before reading the manifest.
pub const VERSION_MARKER_FILE: &str = "cdk.out";

const STACK_ARTIFACT_TYPE: &str = "aws:cloudformation:stack";

// Resolved at deploy time from the caller's credentials and region.
const AGNOSTIC_ENVIRONMENT: &str = "aws://unknown-account/unknown-region";

/// One deployable stack in the assembly.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssemblyStack {
    pub stack_name: String,
    pub template_file: PathBuf,
    /// Bucket the site's build output is synced into.
    pub bucket_name: String,
    /// Built website artifacts for this stack.
    pub source_dir: PathBuf,
}

/// A written cloud assembly directory.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CloudAssembly {
    pub dir: PathBuf,
    pub stacks: Vec<AssemblyStack>,
}

impl CloudAssembly {
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn stack(&self, stack_name: &str) -> Option<&AssemblyStack> {
        self.stacks.iter().find(|s| s.stack_name == stack_name)
    }
}

/// Write templates, `manifest.json` and the version marker into `out_dir`.
///
/// `sources` pairs each template with its build output directory, in the
/// same order as `templates`.
pub fn write_assembly(
    templates: &[StackTemplate],
    sources: &[PathBuf],
    out_dir: &Path,
) -> Result<CloudAssembly> {
    let written = write_templates(templates, out_dir)?;

    let mut artifacts = Map::new();
    let mut stacks = Vec::with_capacity(templates.len());

    for ((template, template_path), source_dir) in templates.iter().zip(written).zip(sources) {
        let template_file = template_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| template_path.clone());

        artifacts.insert(
            template.stack_name().to_string(),
            json!({
                "type": STACK_ARTIFACT_TYPE,
                "environment": AGNOSTIC_ENVIRONMENT,
                "displayName": template.stack_name(),
                "properties": {
                    "templateFile": template_file,
                    "stackName": template.stack_name(),
                    "validateOnSynth": false,
                },
            }),
        );

        stacks.push(AssemblyStack {
            stack_name: template.stack_name().to_string(),
            template_file: template_path,
            bucket_name: template.names.bucket_name.clone(),
            source_dir: source_dir.clone(),
        });
    }

    let manifest = json!({
        "version": CLOUD_ASSEMBLY_VERSION,
        "artifacts": artifacts,
    });
    std::fs::write(
        out_dir.join(MANIFEST_FILE),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    std::fs::write(
        out_dir.join(VERSION_MARKER_FILE),
        json!({ "version": CLOUD_ASSEMBLY_VERSION }).to_string(),
    )?;

    info!(dir = %out_dir.display(), stacks = stacks.len(), "Wrote cloud assembly");

    Ok(CloudAssembly {
        dir: out_dir.to_path_buf(),
        stacks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DeploymentDescriptor;
    use crate::template::render;

    #[test]
    fn test_manifest_lists_every_stack() {
        let dir = tempfile::tempdir().expect("tempdir");
        let site = DeploymentDescriptor::new("dev.example.com", "", "arn:cert", "/srv/dist");
        let templates = vec![render("CloudFrontWebsiteStack", &site)];

        let assembly = write_assembly(&templates, &[site.build_output_path.clone()], dir.path())
            .expect("assembly");

        let raw = std::fs::read_to_string(assembly.manifest_path()).expect("manifest");
        let manifest: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(manifest["version"], CLOUD_ASSEMBLY_VERSION);

        let artifact = &manifest["artifacts"]["CloudFrontWebsiteStack-dev-example-com"];
        assert_eq!(artifact["type"], "aws:cloudformation:stack");
        assert_eq!(
            artifact["properties"]["templateFile"],
            "CloudFrontWebsiteStack-dev-example-com.template.json"
        );
        assert!(dir.path().join(VERSION_MARKER_FILE).exists());

        let stack = assembly
            .stack("CloudFrontWebsiteStack-dev-example-com")
            .expect("stack");
        assert_eq!(stack.bucket_name, "dev.example.com-static-website");
        assert_eq!(stack.source_dir, PathBuf::from("/srv/dist"));
        assert!(stack.template_file.exists());
    }
}
