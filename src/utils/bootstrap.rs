//! Bootstrap utilities for the broker binary.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the BROKER_LOG environment variable.
///
/// Defaults to "info" level if BROKER_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Backoff used while waiting for a dependency at startup.
pub fn startup_backoff(max_attempts: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(max_attempts.saturating_sub(1))
        .with_jitter()
}

/// Run `connect` until it succeeds or `max_attempts` attempts have failed.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "rabbitmq")
/// * `address` - The address being connected to
/// * `connect` - Async function that attempts to establish a connection
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    max_attempts: usize,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(startup_backoff(max_attempts))
        .notify(|e: &E, delay: Duration| {
            warn!(
                service = %service_name,
                address = %address,
                error = %e,
                backoff_ms = %delay.as_millis(),
                "Connection attempt failed, retrying"
            );
        })
        .await;

    match &result {
        Ok(_) => info!(service = %service_name, address = %address, "Connected"),
        Err(e) => error!(
            service = %service_name,
            address = %address,
            attempts = max_attempts,
            error = %e,
            "Giving up on connection"
        ),
    }
    result
}
