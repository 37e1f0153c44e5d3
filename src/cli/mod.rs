//! Command-line interface for the pipeline.
//!
//! Every pipeline stage is an independently runnable subcommand; `run`
//! chains them all in order.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
