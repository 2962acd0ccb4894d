//! sitefront stack - infrastructure definition for static websites
//!
//! Turns a [`DeploymentDescriptor`] into a CloudFormation template with:
//! - a private, versioned, lifecycle-managed S3 origin bucket
//! - a CloudFront distribution behind an Origin Access Control
//! - TLS enforcement, geo restriction and SPA-friendly 403/404 routing
//! - outputs for the bucket name, distribution id and distribution hostname
//!
//! [`synthesize_assembly`] writes the stacks as a cloud assembly that
//! `cdk deploy --app <dir>` deploys directly.

pub mod assembly;
pub mod descriptor;
pub mod error;
pub mod naming;
pub mod synth;
pub mod template;

pub use assembly::{write_assembly, AssemblyStack, CloudAssembly};
pub use descriptor::{AppDescriptor, DeploymentDescriptor, DEFAULT_ALLOWED_COUNTRIES};
pub use error::{Result, StackError};
pub use naming::{
    SiteNames, BUCKET_NAME_OUTPUT, DISTRIBUTION_HOST_NAME_OUTPUT, DISTRIBUTION_ID_OUTPUT,
};
pub use synth::{synthesize, synthesize_assembly, write_templates};
pub use template::{render, StackTemplate, AUTO_DELETE_OBJECTS_TYPE};
