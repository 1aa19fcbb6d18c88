//! Async wait loops, driven by `tokio::time`.

use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{Deadline, WaitError, WaitOptions, WaitState, Waited};

/// Poll `probe` until it yields a value or the budget in `opts` is spent.
///
/// `what` names the awaited resource and ends up in the timeout error.
pub async fn wait_for<T, P, PFut>(
    what: &str,
    opts: &WaitOptions,
    probe: P,
) -> Result<Waited<T>, WaitError>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = anyhow::Result<Option<T>>>,
{
    poll(what, opts, probe, || async { Ok(()) }).await
}

/// Wait until `predicate` holds, calling `refresh` after each failed attempt.
pub async fn wait_until<P, PFut, R, RFut>(
    what: &str,
    opts: &WaitOptions,
    mut predicate: P,
    refresh: R,
) -> Result<Waited<()>, WaitError>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = anyhow::Result<bool>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = anyhow::Result<()>>,
{
    poll(
        what,
        opts,
        || {
            let check = predicate();
            async move { Ok(check.await?.then_some(())) }
        },
        refresh,
    )
    .await
}

/// The general loop: probe, and on failure refresh then sleep.
///
/// `refresh` runs only when another attempt is going to follow. Probe errors
/// abort the wait unless `opts.handle_errors` is set; refresh errors always
/// abort it.
pub async fn poll<T, P, PFut, R, RFut>(
    what: &str,
    opts: &WaitOptions,
    mut probe: P,
    mut refresh: R,
) -> Result<Waited<T>, WaitError>
where
    P: FnMut() -> PFut,
    PFut: Future<Output = anyhow::Result<Option<T>>>,
    R: FnMut() -> RFut,
    RFut: Future<Output = anyhow::Result<()>>,
{
    let start = Instant::now();
    let mut deadline = Deadline::new(opts);
    let mut last_error = None;

    while deadline.begin_attempt(start.elapsed()) {
        let attempt = deadline.attempts();

        let found = match probe().await {
            Ok(found) => found,
            Err(err) if opts.handle_errors => {
                debug!(what, attempt, error = %err, "Probe failed, treating as not ready");
                last_error = Some(format!("{err:#}"));
                None
            }
            Err(source) => {
                warn!(what, attempt, error = %source, "Probe failed, aborting wait");
                return Err(WaitError::Probe {
                    what: what.to_string(),
                    attempt,
                    source,
                });
            }
        };

        let elapsed = start.elapsed();
        let succeeded = found.is_some();
        let state = deadline.record(succeeded, elapsed);

        if let Some(value) = found {
            debug!(what, attempt, elapsed_ms = elapsed.as_millis() as u64, "Wait finished");
            return Ok(Waited {
                value,
                attempts: attempt,
                elapsed,
            });
        }

        debug!(what, attempt, elapsed_ms = elapsed.as_millis() as u64, "Not ready yet");
        if state == WaitState::TimedOut {
            break;
        }

        if let Err(source) = refresh().await {
            warn!(what, attempt, error = %source, "Refresh failed, aborting wait");
            return Err(WaitError::Refresh {
                what: what.to_string(),
                attempt,
                source,
            });
        }

        tokio::time::sleep(deadline.delay()).await;
    }

    Err(timed_out(what, opts, &deadline, start.elapsed(), last_error))
}

pub(crate) fn timed_out(
    what: &str,
    opts: &WaitOptions,
    deadline: &Deadline,
    elapsed: std::time::Duration,
    last_error: Option<String>,
) -> WaitError {
    warn!(
        what,
        attempts = deadline.attempts(),
        elapsed_ms = elapsed.as_millis() as u64,
        timeout_ms = opts.timeout.as_millis() as u64,
        "Wait timed out"
    );
    WaitError::Timeout {
        what: what.to_string(),
        message: opts.message.clone(),
        attempts: deadline.attempts(),
        elapsed,
        last_error,
    }
}
