//! sitefront - static website deploys to S3 + CloudFront
//!
//! ## Commands
//!
//! - `deploy` (default): synthesize, deploy, upload, invalidate caches, clean up
//! - `synth`: write a cloud assembly for the sites in a descriptor
//! - `outputs`: print the stacks recorded in an output manifest

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sitefront_deploy::telemetry::init_tracing;
use sitefront_deploy::{
    load_manifest, CloudFrontInvalidator, CloudflareClient, DeployConfig, DeployPipeline,
    DeployReport, InvalidationStatus, ProcessRunner, S3BucketStore, StageStatus,
};
use sitefront_stack::{synthesize_assembly, AppDescriptor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "sitefront")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deploy static websites to S3 behind CloudFront", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON report
    #[arg(long, global = true)]
    json: bool,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, global = true, value_name = "PATH")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Deploy every stack and purge caches (the default)
    Deploy,

    /// Write a deployable cloud assembly for the sites in a descriptor
    Synth {
        /// Site descriptor (JSON)
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Assembly directory (pass to `cdk deploy --app`)
        #[arg(short, long, default_value = "cdk.out")]
        out_dir: PathBuf,
    },

    /// Print the stacks recorded in an output manifest
    Outputs {
        /// Manifest path (default: the configured outputs file)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_env_file(cli.env_file.as_deref())?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command.unwrap_or(Commands::Deploy) {
        Commands::Deploy => cmd_deploy(cli.json).await,
        Commands::Synth {
            descriptor,
            out_dir,
        } => cmd_synth(&descriptor, &out_dir),
        Commands::Outputs { file } => cmd_outputs(file, cli.json).await,
    }
}

/// An explicit env file must exist; the implicit `./.env` is optional.
fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

async fn cmd_deploy(json: bool) -> Result<()> {
    let config = DeployConfig::from_env().context("Failed to load deploy configuration")?;

    let runner = ProcessRunner::in_dir(config.working_dir.clone());
    let store = S3BucketStore::from_env().await;
    let invalidator = CloudFrontInvalidator::from_env().await;
    let purger = CloudflareClient::new(config.cloudflare_api_base.clone())
        .context("Failed to build Cloudflare client")?;

    let pipeline = DeployPipeline::new(
        config,
        Arc::new(runner),
        Arc::new(store),
        Arc::new(invalidator),
        Arc::new(purger),
    );

    let report = pipeline.run().await.context("Website deploy failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &DeployReport) {
    println!();
    for stage in &report.stages {
        match &stage.status {
            StageStatus::Succeeded => {
                println!("  ✓ {} ({}ms)", stage.stage.title(), stage.duration_ms)
            }
            StageStatus::Skipped(reason) => {
                println!("  - {} (skipped: {})", stage.stage.title(), reason)
            }
            StageStatus::Failed(reason) => {
                println!("  ✗ {} ({})", stage.stage.title(), reason)
            }
        }
    }

    for upload in &report.uploads {
        println!(
            "  [S3][{}] {} uploaded, {} removed",
            upload.bucket_name, upload.receipt.uploaded, upload.receipt.deleted
        );
    }

    for outcome in &report.invalidations {
        let distribution = outcome.distribution_id.as_deref().unwrap_or("-");
        match &outcome.status {
            InvalidationStatus::Created(receipt) => println!(
                "  [CloudFront][{}] {} {}",
                distribution, receipt.invalidation_id, receipt.status
            ),
            InvalidationStatus::Failed { error } => {
                println!("  [CloudFront][{}] FAIL: {}", distribution, error)
            }
        }
    }

    println!();
    println!("Duration: {}ms", report.duration_ms);
    println!("{}", summary_line(report));
}

fn summary_line(report: &DeployReport) -> String {
    if report.is_clean() {
        "✓ Deploy complete".to_string()
    } else {
        format!(
            "✓ Deploy complete, {} best-effort stage(s) failed",
            report.failed_count()
        )
    }
}

fn cmd_synth(descriptor: &Path, out_dir: &Path) -> Result<()> {
    let app = AppDescriptor::load(descriptor)
        .with_context(|| format!("Failed to load descriptor {}", descriptor.display()))?;

    let assembly = synthesize_assembly(&app, out_dir)
        .with_context(|| format!("Failed to write cloud assembly to {}", out_dir.display()))?;

    info!(stacks = assembly.stacks.len(), manifest = %assembly.manifest_path().display(), "Cloud assembly written");
    for stack in &assembly.stacks {
        println!("{}  {}", stack.stack_name, stack.template_file.display());
    }

    Ok(())
}

async fn cmd_outputs(file: Option<PathBuf>, json: bool) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => DeployConfig::from_env()?.outputs_file,
    };

    let stacks = load_manifest(&path)
        .await
        .with_context(|| format!("Failed to read outputs from {}", path.display()))?;

    if stacks.is_empty() {
        warn!(path = %path.display(), "Manifest contains no stacks");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&stacks)?);
    } else {
        for stack in &stacks {
            println!("{}", stack);
        }
    }

    Ok(())
}
