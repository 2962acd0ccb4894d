//! Synthesis: validated descriptors in, template files out.

use crate::assembly::{write_assembly, CloudAssembly};
use crate::descriptor::AppDescriptor;
use crate::error::{Result, StackError};
use crate::template::{render, StackTemplate};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Render one template per site in the app.
pub fn synthesize(app: &AppDescriptor) -> Result<Vec<StackTemplate>> {
    app.validate()?;

    let mut stack_names = HashSet::new();
    let mut templates = Vec::with_capacity(app.sites.len());

    for site in &app.sites {
        if !site.build_output_path.is_dir() {
            warn!(
                site = %site.website_url,
                path = %site.build_output_path.display(),
                "Build output directory does not exist yet"
            );
        }

        let template = render(&app.stack_prefix, site);
        if !stack_names.insert(template.stack_name().to_string()) {
            return Err(StackError::DuplicateStack(template.stack_name().to_string()));
        }

        info!(stack = %template.stack_name(), bucket = %template.names.bucket_name, "Synthesized stack");
        templates.push(template);
    }

    Ok(templates)
}

/// Synthesize every site and write the deployable cloud assembly.
pub fn synthesize_assembly(app: &AppDescriptor, out_dir: &Path) -> Result<CloudAssembly> {
    let templates = synthesize(app)?;
    let sources: Vec<PathBuf> = app
        .sites
        .iter()
        .map(|site| site.build_output_path.clone())
        .collect();
    write_assembly(&templates, &sources, out_dir)
}

/// Write each template to `<out_dir>/<stack>.template.json`.
pub fn write_templates(templates: &[StackTemplate], out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)?;

    let mut written = Vec::with_capacity(templates.len());
    for template in templates {
        let path = out_dir.join(format!("{}.template.json", template.stack_name()));
        std::fs::write(&path, template.to_json_pretty()?)?;
        written.push(path);
    }
    Ok(written)
}
