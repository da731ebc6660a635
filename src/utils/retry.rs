//! Retry utilities: backoff builders.
//!
//! Uses `backon` for exponential backoff with jitter. Provides the standard
//! configurations for gRPC connection retries and consumer redelivery.

use std::time::Duration;

use backon::ExponentialBuilder;

/// Backoff for gRPC connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Backoff between redeliveries of a message whose handler failed.
///
/// Unbounded: a consumer keeps retrying the same message until it succeeds
/// or the consumer shuts down.
pub fn redelivery_backoff(min_delay: Duration, max_delay: Duration) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(min_delay)
        .with_max_delay(max_delay.max(min_delay))
        .without_max_times()
        .with_jitter()
}
