//! Command-line interface for repo-digest.
//!
//! Provides commands for enqueueing repositories, running scheduling passes,
//! mirroring repository subtrees and inspecting groups.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
