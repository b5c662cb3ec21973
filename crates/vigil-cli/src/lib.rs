//! # vigil-cli — Vigil Command-Line Interface
//!
//! Runs the assessment pipeline over evidence read from a file or stdin.
//!
//! ## Subcommands
//!
//! - `assess`: assess JSON-lines evidence and print responses and results
//!   as JSON lines
//! - `metrics`: list the metrics of a rule catalog
//!
//! ## Crate Policy
//!
//! - CLI construction (argument parsing) is separated from business logic.
//! - Handler functions delegate to the library crates.
//! - Data goes to stdout, logs go to stderr.

pub mod assess;
pub mod metrics;

use tracing_subscriber::EnvFilter;

/// Log filter from `RUST_LOG`, defaulting to `info` when it is unset or
/// invalid.
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
