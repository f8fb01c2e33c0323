//! Pipeline orchestration for cocosbuild.
//!
//! This crate ties the parameter store and the process runner together into
//! the four build stages and the driver that sequences them.

pub mod pipeline;
pub mod stages;

#[cfg(test)]
mod testing;

pub use pipeline::{Pipeline, PipelineOptions, PipelinePlan, PipelineReport, StageResult, format_hms};
pub use stages::{Artifact, StageContext};
