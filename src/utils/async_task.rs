use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::NetworkError;
use crate::Result;

/// Runs `task` until it succeeds, at most `policy.max_retries` times.
/// Each attempt is bounded by `policy.timeout_ms`; the delay between attempts
/// starts at `base_delay_ms` and doubles up to `max_delay_ms`.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,                               // The type of the async function
    T: std::future::Future<Output = Result<P>>, // The future returned by the async function
{
    let mut retries = 0;
    let mut current_delay = policy.base_delay();
    let timeout_duration = policy.timeout();
    let max_delay = policy.max_delay();
    let max_retries = policy.max_retries.max(1);

    let mut last_error = String::from("no attempt made");
    while retries < max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r); // Exit on success
            }
            Ok(Err(error)) => {
                warn!(?error, "failed with error.");
                last_error = error.to_string();
            }
            Err(error) => {
                warn!(?timeout_duration, ?error, "Task timed out");
                last_error = format!("timed out after {timeout_duration:?}");
            }
        };

        if retries < max_retries - 1 {
            debug!("Retrying in {:?}...", current_delay);
            sleep(current_delay).await;

            // Exponential backoff (double the delay each time)
            current_delay = (current_delay * 2).min(max_delay);
        }
        retries += 1;
    }
    warn!("Task failed after {} retries", max_retries);
    Err(NetworkError::RetryExhausted {
        retries: max_retries,
        reason: last_error,
    }
    .into())
}

/// Spawns a named background task and tracks its handle.
/// Errors returned by the task are logged, never propagated.
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<tokio::task::JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    // Clone the name so it can be safely moved into the async block
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        } else {
            debug!("spawned task: {name} exited");
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}

/// Sleeps for `duration` unless the shutdown signal fires first.
/// Returns `true` when shutdown was requested.
pub(crate) async fn sleep_or_shutdown(
    duration: Duration,
    shutdown: &mut tokio::sync::watch::Receiver<()>,
) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => true,
        _ = sleep(duration) => false,
    }
}
