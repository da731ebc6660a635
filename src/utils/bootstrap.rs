//! Bootstrap utilities for shipyard binaries.
//!
//! Shared initialization code for all service binaries.

use std::time::Duration;

use backon::Retryable;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::utils::retry::connection_backoff;

/// Environment variable holding the tracing filter directive.
pub const LOG_ENV_VAR: &str = "SHIPYARD_LOG";

/// Environment variable selecting the log output format (`json` or `text`).
pub const LOG_FORMAT_ENV_VAR: &str = "SHIPYARD_LOG_FORMAT";

/// Initialize tracing with the SHIPYARD_LOG environment variable.
///
/// Defaults to "info" level if SHIPYARD_LOG is not set. JSON lines are
/// emitted when SHIPYARD_LOG_FORMAT=json.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Parse `--config <path>` from the command line, if present.
pub fn parse_config_path() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Normalize a bare `host:port` into an http URI for tonic.
pub fn grpc_uri(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Connect a gRPC channel with exponential backoff retry.
///
/// `service_name` is only used for logging. Each request on the returned
/// channel is bounded by `request_timeout`.
pub async fn connect_with_retry(
    service_name: &str,
    address: &str,
    request_timeout: Duration,
) -> Result<Channel, tonic::transport::Error> {
    let uri = grpc_uri(address);
    let channel = (|| {
        let uri = uri.clone();
        async move {
            Endpoint::from_shared(uri)?
                .timeout(request_timeout)
                .connect()
                .await
        }
    })
    .retry(connection_backoff())
    .notify(|err: &tonic::transport::Error, dur: Duration| {
        warn!(service = %service_name, error = %err, delay = ?dur, "Connection failed, retrying");
    })
    .await?;

    info!(service = %service_name, address = %address, "Connected");
    Ok(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grpc_uri_adds_scheme() {
        assert_eq!(grpc_uri("localhost:50051"), "http://localhost:50051");
        assert_eq!(grpc_uri("http://inventory:50051"), "http://inventory:50051");
        assert_eq!(grpc_uri("https://iam:443"), "https://iam:443");
    }
}
