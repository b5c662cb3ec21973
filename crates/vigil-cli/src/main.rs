//! # vigil CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;

/// Vigil: continuous compliance assessment of cloud resources.
///
/// Assesses tool-collected evidence against a catalog of metrics and
/// prints the results.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about)]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Assess JSON-lines evidence.
    Assess(vigil_cli::assess::AssessArgs),
    /// List the metrics of a rule catalog.
    Metrics(vigil_cli::metrics::MetricsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(vigil_cli::log_filter())
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Assess(args) => {
            let out = Arc::new(Mutex::new(std::io::stdout()));
            let summary = vigil_cli::assess::run_assess(&args, out).await?;
            tracing::info!(
                submitted = summary.submitted,
                malformed = summary.malformed,
                assessed = summary.assessed,
                waiting = summary.waiting,
                failed = summary.failed,
                results = summary.results,
                parked = summary.parked.len(),
                "assessment run finished"
            );
        }
        Commands::Metrics(args) => {
            let count = vigil_cli::metrics::run_metrics(&args, std::io::stdout().lock())?;
            tracing::info!(metrics = count, "listed metrics");
        }
    }

    Ok(())
}
