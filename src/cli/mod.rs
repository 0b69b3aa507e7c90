//! Command-line interface for quiz-forge.
//!
//! Provides commands for quiz generation, result processing and exam
//! session control.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
