//! Shared types, error model, logging sinks, and configuration for cocosbuild.
//!
//! This crate is the foundation depended on by all other cocosbuild crates.
//! It provides:
//! - [`PipelineError`]: the unified error type
//! - Domain types ([`StageId`], [`BuildMode`], [`RunId`])
//! - The build parameter store ([`BuildParameters`], [`load_build_params`])
//! - Pipeline settings ([`Settings`], settings loading)
//! - Log sinks ([`PipelineLog`], [`TracingLog`], [`MemoryLog`])

pub mod config;
pub mod error;
pub mod log;
pub mod params;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    DefaultsSettings, GitFailurePolicy, GitSettings, RunnerSettings, Settings, init_settings,
    load_settings, load_settings_from, settings_dir, settings_file_path,
};
pub use error::{GENERIC_FAILURE_EXIT_CODE, PipelineError, Result};
pub use log::{LogEntry, MemoryLog, PipelineLog, TracingLog};
pub use params::{
    BuildParameters, DEFAULT_CONFIG_FILE, DEFAULT_CREATOR_PATH, DEFAULT_PARAMS_FILE,
    DEFAULT_PROJECT_PATH, ParamKey, load_build_params,
};
pub use types::{BuildMode, RunId, StageId};
