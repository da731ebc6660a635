//! Topic, consumer group and consumer behaviour settings.

use std::time::Duration;

use serde::Deserialize;

use crate::bus::ConsumerSettings;
use crate::handlers::InvalidPayloadPolicy;

/// Topic names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    pub order_paid: String,
    pub ship_assembled: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            order_paid: "order.paid".to_string(),
            ship_assembled: "ship.assembled".to_string(),
        }
    }
}

/// Consumer group names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupsConfig {
    /// Order service consuming ShipAssembled.
    pub order_ship_assembled: String,
    /// Assembly worker consuming OrderPaid.
    pub assembly_order_paid: String,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self {
            order_ship_assembled: "order.ship_assembled".to_string(),
            assembly_order_paid: "assembly.order_paid".to_string(),
        }
    }
}

/// Behaviour shared by every consumer group.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Grace period for in-flight deliveries at shutdown.
    pub shutdown_timeout_secs: u64,
    pub retry_min_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// What to do with payloads that fail to decode.
    pub invalid_payload: InvalidPayloadPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 15,
            retry_min_delay_ms: 100,
            retry_max_delay_ms: 10_000,
            invalid_payload: InvalidPayloadPolicy::Retry,
        }
    }
}

impl ConsumerConfig {
    /// Settings for one group subscribed to one topic.
    pub fn settings(&self, group_id: &str, topic: &str) -> ConsumerSettings {
        ConsumerSettings::new(group_id, vec![topic.to_string()])
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
            .with_retry_delays(
                Duration::from_millis(self.retry_min_delay_ms),
                Duration::from_millis(self.retry_max_delay_ms),
            )
    }
}
