//! External process runner for cocosbuild.
//!
//! Spawns one command at a time, streams its merged stdout/stderr to a
//! [`PipelineLog`](cocosbuild_shared::PipelineLog) with UTF-8 → GBK decoding
//! fallback, and classifies the exit status against a per-tool policy.

pub mod decode;
pub mod policy;
pub mod process;

pub use decode::decode_line;
pub use policy::ToolKind;
pub use process::{CommandRunner, CommandSpec, ProcessOutcome, SystemRunner};
