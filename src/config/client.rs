//! Addresses of the gRPC services the Order service and authz call.

use std::time::Duration;

use serde::Deserialize;

/// Dependency endpoints (host:port or full http URI).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub inventory_address: String,
    pub payment_address: String,
    pub iam_address: String,
    /// Per-request deadline.
    pub request_timeout_ms: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            inventory_address: "localhost:50051".to_string(),
            payment_address: "localhost:50052".to_string(),
            iam_address: "localhost:50053".to_string(),
            request_timeout_ms: 5000,
        }
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
