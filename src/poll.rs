//! Polling a Read operation until it reaches a terminal state.

use std::time::Duration;

use tokio::time::{self, Instant};

use crate::{
    prelude::*,
    read_api::{AnalyzeResult, OperationId, OperationStatus, ReadApi},
};

/// How often, and for how long, we poll an operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between the end of one status request and the start of the next.
    pub interval: Duration,

    /// Give up after this many status requests.
    pub max_attempts: Option<u32>,

    /// Give up once this much time has passed since polling started.
    pub max_elapsed: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
            max_elapsed: Some(Duration::from_secs(10 * 60)),
        }
    }
}

impl PollPolicy {
    /// Should we stop after `attempts` requests, `elapsed` into polling?
    fn is_exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        let too_many = self.max_attempts.is_some_and(|max| attempts >= max);
        // Don't start a sleep that would end past the deadline.
        let too_long = self
            .max_elapsed
            .is_some_and(|max| elapsed + self.interval > max);
        too_many || too_long
    }
}

/// How polling ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The operation succeeded.
    Succeeded {
        result: AnalyzeResult,
        attempts: u32,
    },

    /// The service reported that recognition failed.
    JobFailed { attempts: u32 },

    /// We hit a [`PollPolicy`] limit before the operation finished.
    TimedOut { attempts: u32, elapsed: Duration },

    /// We were cancelled before the operation finished.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    /// How many status requests did we make?
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Succeeded { attempts, .. }
            | PollOutcome::JobFailed { attempts }
            | PollOutcome::TimedOut { attempts, .. }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }

    /// Convert anything but success into an error.
    pub fn into_result(self, id: &OperationId) -> Result<AnalyzeResult> {
        match self {
            PollOutcome::Succeeded { result, .. } => Ok(result),
            PollOutcome::JobFailed { attempts } => Err(anyhow!(
                "OCR operation {id} failed (after {attempts} status checks)"
            )),
            PollOutcome::TimedOut { attempts, elapsed } => Err(anyhow!(
                "Gave up waiting for OCR operation {id} after {attempts} status checks and {:.1}s",
                elapsed.as_secs_f64()
            )),
            PollOutcome::Cancelled { attempts } => Err(anyhow!(
                "Cancelled while waiting for OCR operation {id} (after {attempts} status checks)"
            )),
        }
    }
}

/// Poll `id` until it succeeds or fails, `policy` runs out, or `cancel`
/// resolves.
///
/// The first status request is made immediately, and each later request
/// follows the previous one by `policy.interval`. `on_status` is called with
/// every status we observe.
#[instrument(level = "debug", skip_all, fields(id = %id))]
pub async fn poll_until_terminal<A, C, S>(
    api: &A,
    id: &OperationId,
    policy: &PollPolicy,
    cancel: C,
    mut on_status: S,
) -> Result<PollOutcome>
where
    A: ReadApi + ?Sized,
    C: Future<Output = ()>,
    S: FnMut(&OperationStatus, u32),
{
    tokio::pin!(cancel);
    let started = Instant::now();
    let mut attempts = 0;
    loop {
        let result = tokio::select! {
            biased;
            _ = &mut cancel => return Ok(PollOutcome::Cancelled { attempts }),
            result = api.get_read_result(id) => result?,
        };
        attempts += 1;
        debug!(attempt = attempts, status = %result.status, "ocr: {}", result.status);
        on_status(&result.status, attempts);

        match result.status {
            OperationStatus::Succeeded => {
                let result = result.analyze_result.ok_or_else(|| {
                    anyhow!("OCR operation {id} succeeded, but returned no analyzeResult")
                })?;
                return Ok(PollOutcome::Succeeded { result, attempts });
            }
            OperationStatus::Failed => {
                warn!(attempts, "OCR operation {id} failed");
                return Ok(PollOutcome::JobFailed { attempts });
            }
            OperationStatus::NotStarted
            | OperationStatus::Running
            | OperationStatus::Other(_) => {}
        }

        let elapsed = started.elapsed();
        if policy.is_exhausted(attempts, elapsed) {
            warn!(attempts, ?elapsed, "Gave up polling OCR operation {id}");
            return Ok(PollOutcome::TimedOut { attempts, elapsed });
        }

        tokio::select! {
            biased;
            _ = &mut cancel => return Ok(PollOutcome::Cancelled { attempts }),
            _ = time::sleep(policy.interval) => {}
        }
    }
}
