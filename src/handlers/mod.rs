//! Bus message handlers.
//!
//! - [`ship_assembled`]: applies `ShipAssembled` to orders (Order service)
//! - [`assembly`]: builds ships for paid orders (Assembly service)

use serde::Deserialize;

pub mod assembly;
pub mod ship_assembled;

pub use assembly::{AssemblyConfig, AssemblyWorker};
pub use ship_assembled::ShipAssembledHandler;

/// What a consumer does with a payload it cannot decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidPayloadPolicy {
    /// Return an error so the bus redelivers. The partition stalls until an
    /// operator intervenes.
    #[default]
    Retry,
    /// Log and acknowledge.
    Drop,
}

/// Apply `policy` to a message whose payload failed to decode.
pub(crate) fn reject_payload(
    policy: InvalidPayloadPolicy,
    message: &crate::bus::Message,
    err: crate::codec::CodecError,
) -> Result<(), crate::bus::BusError> {
    match policy {
        InvalidPayloadPolicy::Retry => {
            tracing::error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %err,
                "Invalid payload, leaving for redelivery"
            );
            Err(crate::bus::BusError::Handler(err.to_string()))
        }
        InvalidPayloadPolicy::Drop => {
            tracing::error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %err,
                "Invalid payload, dropping"
            );
            Ok(())
        }
    }
}
