//! # Metrics Subcommand
//!
//! Prints every metric of a rule catalog as one JSON line.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use vigil_assessment::AssessmentConfig;
use vigil_policy::{PolicyCatalog, RuleCatalog};

/// Arguments for the metrics subcommand.
#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Directory of YAML rule bundles [default: $VIGIL_POLICY_DIR or
    /// policies/bundles].
    #[arg(long)]
    pub policies: Option<PathBuf>,
}

/// Write the catalog's metrics to `out`. Returns how many were written.
pub fn run_metrics(args: &MetricsArgs, mut out: impl Write) -> anyhow::Result<usize> {
    let dir = match &args.policies {
        Some(dir) => dir.clone(),
        None => AssessmentConfig::from_env()?.policy_dir,
    };
    let catalog = RuleCatalog::from_dir(&dir)
        .with_context(|| format!("loading rule catalog from {}", dir.display()))?;
    let metrics = catalog.metrics();
    for metric in &metrics {
        serde_json::to_writer(&mut out, metric)?;
        writeln!(out)?;
    }
    Ok(metrics.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_bundled_metrics() {
        let args = MetricsArgs {
            policies: Some(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../policies/bundles")),
        };
        let mut out = Vec::new();
        let count = run_metrics(&args, &mut out).unwrap();
        assert_eq!(count, 13);

        let text = String::from_utf8(out).unwrap();
        let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(first["id"], "ActivityLoggingEnabled");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let args = MetricsArgs {
            policies: Some(PathBuf::from("/nonexistent/vigil/bundles")),
        };
        let err = run_metrics(&args, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("loading rule catalog"));
    }
}
