//! Command-line entry points.

use std::time::Duration;

use clap::Args;
use futures::future;
use tokio::{
    fs,
    io::{self, AsyncWriteExt as _},
    signal,
};

use crate::{
    aggregate::aggregate_text,
    poll::{PollOutcome, PollPolicy, poll_until_terminal},
    prelude::*,
    read_api::{AnalyzeResult, OperationId, ReadApi},
    ui::{ProgressConfig, Ui},
};

pub mod ocr;
pub mod status;

/// Options controlling how we wait for an OCR operation.
#[derive(Debug, Clone, Args)]
pub struct PollOpts {
    /// Seconds to wait between status checks.
    #[clap(
        long = "poll-interval",
        value_name = "SECS",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval_secs: u64,

    /// Give up after this many status checks.
    #[clap(long, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Give up after polling for this many seconds. Use 0 to wait forever.
    #[clap(long = "timeout", value_name = "SECS", default_value = "600")]
    timeout_secs: u64,
}

impl PollOpts {
    /// Build the corresponding [`PollPolicy`].
    pub fn to_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_attempts,
            max_elapsed: (self.timeout_secs > 0)
                .then(|| Duration::from_secs(self.timeout_secs)),
        }
    }
}

/// Where and how to write our results.
#[derive(Debug, Clone, Args)]
pub struct OutputOpts {
    /// Write the result to this file instead of stdout.
    #[clap(short = 'o', long = "output")]
    pub output_path: Option<PathBuf>,

    /// Write the full OCR result as JSON, including page sizes, bounding
    /// boxes and word confidences, instead of plain text.
    #[clap(long)]
    pub json: bool,
}

impl OutputOpts {
    /// Write the result of a successful OCR operation.
    pub async fn write_result(&self, result: &AnalyzeResult) -> Result<()> {
        let ocr_text = aggregate_text(result);
        debug!(
            %ocr_text,
            model_version = ?result.model_version,
            pages = result.read_results.len(),
            "Recognized text"
        );
        if self.json {
            let mut json = serde_json::to_string_pretty(result)
                .context("Could not serialize OCR result")?;
            json.push('\n');
            write_text(self.output_path.as_deref(), &json).await
        } else {
            write_text(self.output_path.as_deref(), &ocr_text).await
        }
    }
}

/// Poll `id` until it's done, showing progress on a spinner.
pub async fn wait_for_operation<A, C>(
    ui: &Ui,
    api: &A,
    id: &OperationId,
    policy: &PollPolicy,
    cancel: C,
) -> Result<PollOutcome>
where
    A: ReadApi + ?Sized,
    C: Future<Output = ()>,
{
    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🔎",
        msg: "Waiting for OCR",
        done_msg: "OCR finished",
    });
    let outcome = poll_until_terminal(api, id, policy, cancel, |status, attempt| {
        spinner.set_message(format!("Waiting for OCR: {status} (check {attempt})"));
    })
    .await;
    spinner.finish_and_clear();

    let outcome = outcome?;
    info!(%id, attempts = outcome.attempts(), "Finished polling");
    Ok(outcome)
}

/// Resolves when the user presses Ctrl-C.
///
/// If we can't listen for Ctrl-C, this never resolves, and the process can
/// still be killed the usual way.
pub async fn ctrl_c() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Could not listen for Ctrl-C: {err}");
        future::pending::<()>().await;
    }
    info!("Received Ctrl-C, cancelling");
}

/// Write recognized text to `output_path`, or to stdout.
pub async fn write_text(output_path: Option<&Path>, text: &str) -> Result<()> {
    match output_path {
        Some(path) => fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write output to {:?}", path)),
        None => {
            let mut stdout = io::stdout();
            stdout
                .write_all(text.as_bytes())
                .await
                .context("Failed to write output to stdout")?;
            stdout.flush().await.context("Failed to flush stdout")
        }
    }
}
