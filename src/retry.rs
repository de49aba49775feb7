//! Bounded polling

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::WallpaperError;

/// Outcome of a single poll
#[derive(Debug, PartialEq, Eq)]
pub enum Poll<T> {
    /// Done, stop polling
    Ready(T),
    /// Not there yet, wait and poll again
    Pending,
}

/// Calls `op` up to `max_attempts` times, sleeping `delay` after every attempt
/// that did not finish.
///
/// `op` receives the 1-based attempt number. A [`Poll::Ready`] value is returned
/// as is. Retryable errors (see [`WallpaperError::is_retryable`]) use up an
/// attempt; any other error is returned immediately. Running out of attempts
/// yields [`WallpaperError::ProviderTimeout`].
pub async fn poll_bounded<T, F, Fut>(
    max_attempts: u32,
    delay: Duration,
    mut op: F,
) -> Result<T, WallpaperError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Poll<T>, WallpaperError>>,
{
    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Ok(Poll::Ready(value)) => return Ok(value),
            Ok(Poll::Pending) => debug!(attempt, max_attempts, "not ready yet"),
            Err(err) if err.is_retryable() => {
                warn!(attempt, max_attempts, error = %err, "poll failed, will retry");
            }
            Err(err) => return Err(err),
        }
        sleep(delay).await;
    }
    Err(WallpaperError::ProviderTimeout {
        attempts: max_attempts,
    })
}
