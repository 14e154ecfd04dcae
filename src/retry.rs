use anyhow::{Error, Result};
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub fn new_backoff() -> ExponentialBuilder {
    ExponentialBuilder::new()
        .with_jitter()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
}

pub fn new_backoff_limited() -> ExponentialBuilder {
    new_backoff().with_max_times(5)
}

pub fn notify<E: std::fmt::Debug>(action: &str) -> impl FnMut(&E, Duration) {
    move |e, d| {
        warn!("Retrying {} due to {:?} after {:?}", action, e, d);
    }
}

/// Retries while `should_retry` accepts the error and the token is still live.
pub fn retryable<E>(
    cancel_token: CancellationToken,
    should_retry: fn(&E) -> bool,
) -> impl FnMut(&E) -> bool {
    move |e| !cancel_token.is_cancelled() && should_retry(e)
}

pub async fn retry<T, E, F, Fut>(
    operation: F,
    action: &str,
    backoff: ExponentialBuilder,
    should_retry: fn(&E) -> bool,
    cancel_token: CancellationToken,
) -> Result<T>
where
    E: std::fmt::Debug + Into<Error>,
    Fut: Future<Output = Result<T, E>>,
    F: FnMut() -> Fut,
{
    operation
        .retry(&backoff)
        .notify(notify(action))
        .when(retryable(cancel_token, should_retry))
        .await
        .map_err(Into::into)
}
