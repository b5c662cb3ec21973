//! # Assess Subcommand
//!
//! Reads evidence as JSON lines, streams it through an
//! [`AssessmentService`](vigil_assessment::AssessmentService) and prints
//! one JSON line per response and one per result:
//!
//! ```text
//! {"kind":"response","evidenceId":"…","status":"WAITING_FOR_RELATED"}
//! {"kind":"result","id":"…","metricId":"BootLoggingEnabled",…}
//! ```
//!
//! Lines that do not parse as evidence are logged and skipped. Once the
//! input ends, waiting evidence gets `--settle-secs` to resolve; anything
//! still waiting after that is reported as parked.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use vigil_assessment::{AssessmentConfig, AssessmentError, AssessmentServiceBuilder, HookError};
use vigil_core::{AssessmentResult, AssessmentStatus, Evidence};

/// Arguments for the assess subcommand.
#[derive(Args, Debug)]
pub struct AssessArgs {
    /// Directory of YAML rule bundles [default: $VIGIL_POLICY_DIR or
    /// policies/bundles].
    #[arg(long)]
    pub policies: Option<PathBuf>,

    /// JSON-lines evidence file. Reads stdin if omitted.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Seconds to wait for waiting evidence after the input ends.
    #[arg(long, default_value_t = 5)]
    pub settle_secs: u64,
}

/// Counts of one run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessSummary {
    /// Evidences handed to the service.
    pub submitted: usize,
    /// Lines skipped because they were not evidence JSON.
    pub malformed: usize,
    /// Evidences answered `ASSESSED`.
    pub assessed: usize,
    /// Evidences answered `WAITING_FOR_RELATED`.
    pub waiting: usize,
    /// Evidences answered `FAILED`.
    pub failed: usize,
    /// Results printed.
    pub results: usize,
    /// Evidences still waiting when the run ended.
    pub parked: Vec<String>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum OutputLine<'a> {
    #[serde(rename_all = "camelCase")]
    Response {
        evidence_id: &'a str,
        status: AssessmentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<&'a str>,
    },
    Result(&'a AssessmentResult),
}

fn emit<W: Write>(out: &Mutex<W>, line: &OutputLine<'_>) -> anyhow::Result<()> {
    let mut out = out.lock();
    serde_json::to_writer(&mut *out, line)?;
    writeln!(out)?;
    Ok(())
}

/// Assess the evidence named by `args`, writing JSON lines to `out`.
pub async fn run_assess<W>(args: &AssessArgs, out: Arc<Mutex<W>>) -> anyhow::Result<AssessSummary>
where
    W: Write + Send + 'static,
{
    let mut config = AssessmentConfig::from_env()?;
    if let Some(dir) = &args.policies {
        config.policy_dir = dir.clone();
    }
    let service = AssessmentServiceBuilder::from_config(&config)
        .with_context(|| format!("loading rule catalog from {}", config.policy_dir.display()))?
        .build();

    let results = Arc::new(AtomicUsize::new(0));
    {
        let out = Arc::clone(&out);
        let results = Arc::clone(&results);
        service.register_result_hook(Arc::new(
            move |result: Option<&AssessmentResult>,
                  _: Option<&AssessmentError>|
                  -> Result<(), HookError> {
                let Some(result) = result else {
                    return Ok(());
                };
                results.fetch_add(1, Ordering::SeqCst);
                emit(&out, &OutputLine::Result(result)).map_err(|e| HookError(e.to_string()))
            },
        ));
    }

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let (tx, rx) = mpsc::channel(config.stream_buffer);
    let (ids_tx, mut ids_rx) = mpsc::unbounded_channel();
    let mut responses = service.assess_evidences(rx);
    let reader = tokio::spawn(read_evidence(reader, tx, ids_tx));

    let mut summary = AssessSummary::default();
    while let Some(response) = responses.recv().await {
        let evidence_id = ids_rx.recv().await.unwrap_or_default();
        match response.status {
            AssessmentStatus::Assessed => summary.assessed += 1,
            AssessmentStatus::WaitingForRelated => summary.waiting += 1,
            AssessmentStatus::Failed => summary.failed += 1,
        }
        emit(
            &out,
            &OutputLine::Response {
                evidence_id: &evidence_id,
                status: response.status,
                message: response.message.as_deref(),
            },
        )?;
    }
    let (submitted, malformed) = reader.await.context("evidence reader panicked")??;
    summary.submitted = submitted;
    summary.malformed = malformed;

    let settle = Duration::from_secs(args.settle_secs);
    if tokio::time::timeout(settle, service.wait_idle()).await.is_err() {
        summary.parked = service.waiting_evidence_ids();
        tracing::warn!(
            parked = summary.parked.len(),
            "evidence still waiting for related resources"
        );
    }
    summary.results = results.load(Ordering::SeqCst);
    Ok(summary)
}

/// Forward parsed evidence to the service, announcing each id first so
/// responses can be matched to evidences in order.
async fn read_evidence(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    tx: mpsc::Sender<Evidence>,
    ids: mpsc::UnboundedSender<String>,
) -> anyhow::Result<(usize, usize)> {
    let mut lines = reader.lines();
    let (mut line_no, mut submitted, mut malformed) = (0usize, 0usize, 0usize);
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Evidence>(&line) {
            Ok(evidence) => {
                if ids.send(evidence.id.clone()).is_err() || tx.send(evidence).await.is_err() {
                    tracing::warn!(line = line_no, "assessment stream closed; stopping input");
                    break;
                }
                submitted += 1;
            }
            Err(e) => {
                malformed += 1;
                tracing::warn!(line = line_no, error = %e, "skipping malformed evidence");
            }
        }
    }
    Ok((submitted, malformed))
}
