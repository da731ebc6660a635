//! Wire codec for order lifecycle events.
//!
//! Events travel as protobuf messages from `proto/events/v1/events.proto`.
//! Field numbers and names are part of the contract between the Order,
//! Assembly and Notification services and must not change. Decoding ignores
//! unknown fields and rejects payloads whose required fields are missing or
//! malformed.

use prost::Message;
use uuid::Uuid;

use crate::domain::{Event, EventKind, OrderPaid, PaymentMethod, ShipAssembled};
use crate::proto::events::v1 as pb;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding or decoding event payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Invalid {kind} payload: {reason}")]
    InvalidPayload { kind: EventKind, reason: String },
}

impl CodecError {
    fn invalid(kind: EventKind, reason: impl Into<String>) -> Self {
        CodecError::InvalidPayload {
            kind,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Generic API
// ============================================================================

/// Encode any lifecycle event.
pub fn encode(event: &Event) -> Result<Vec<u8>> {
    match event {
        Event::OrderPaid(e) => encode_order_paid(e),
        Event::ShipAssembled(e) => encode_ship_assembled(e),
    }
}

/// Decode a payload of the given kind.
pub fn decode(bytes: &[u8], kind: EventKind) -> Result<Event> {
    match kind {
        EventKind::OrderPaid => decode_order_paid(bytes).map(Event::OrderPaid),
        EventKind::ShipAssembled => decode_ship_assembled(bytes).map(Event::ShipAssembled),
    }
}

// ============================================================================
// OrderPaid
// ============================================================================

pub fn encode_order_paid(event: &OrderPaid) -> Result<Vec<u8>> {
    if event.transaction_id.is_empty() {
        return Err(CodecError::Encode(
            "OrderPaid without transaction id".to_string(),
        ));
    }
    let msg = pb::OrderPaid {
        event_uuid: event.event_id.to_string(),
        order_uuid: event.order_id.to_string(),
        user_uuid: event.user_id.to_string(),
        payment_method: payment_method_to_proto(event.payment_method) as i32,
        transaction_uuid: event.transaction_id.clone(),
    };
    Ok(msg.encode_to_vec())
}

pub fn decode_order_paid(bytes: &[u8]) -> Result<OrderPaid> {
    const KIND: EventKind = EventKind::OrderPaid;

    let msg = pb::OrderPaid::decode(bytes).map_err(|e| CodecError::invalid(KIND, e.to_string()))?;

    let payment_method = pb::PaymentMethod::try_from(msg.payment_method)
        .ok()
        .and_then(payment_method_from_proto)
        .ok_or_else(|| {
            CodecError::invalid(
                KIND,
                format!("unsupported payment_method {}", msg.payment_method),
            )
        })?;

    if msg.transaction_uuid.is_empty() {
        return Err(CodecError::invalid(KIND, "missing transaction_uuid"));
    }

    Ok(OrderPaid {
        event_id: parse_uuid(KIND, "event_uuid", &msg.event_uuid)?,
        order_id: parse_uuid(KIND, "order_uuid", &msg.order_uuid)?,
        user_id: parse_uuid(KIND, "user_uuid", &msg.user_uuid)?,
        payment_method,
        transaction_id: msg.transaction_uuid,
    })
}

// ============================================================================
// ShipAssembled
// ============================================================================

pub fn encode_ship_assembled(event: &ShipAssembled) -> Result<Vec<u8>> {
    if event.build_time_seconds < 0 {
        return Err(CodecError::Encode(format!(
            "negative build time {}",
            event.build_time_seconds
        )));
    }
    let msg = pb::ShipAssembled {
        event_uuid: event.event_id.to_string(),
        order_uuid: event.order_id.to_string(),
        user_uuid: event.user_id.to_string(),
        build_time_sec: event.build_time_seconds,
    };
    Ok(msg.encode_to_vec())
}

pub fn decode_ship_assembled(bytes: &[u8]) -> Result<ShipAssembled> {
    const KIND: EventKind = EventKind::ShipAssembled;

    let msg =
        pb::ShipAssembled::decode(bytes).map_err(|e| CodecError::invalid(KIND, e.to_string()))?;

    if msg.build_time_sec < 0 {
        return Err(CodecError::invalid(
            KIND,
            format!("negative build_time_sec {}", msg.build_time_sec),
        ));
    }

    Ok(ShipAssembled {
        event_id: parse_uuid(KIND, "event_uuid", &msg.event_uuid)?,
        order_id: parse_uuid(KIND, "order_uuid", &msg.order_uuid)?,
        user_id: parse_uuid(KIND, "user_uuid", &msg.user_uuid)?,
        build_time_seconds: msg.build_time_sec,
    })
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_uuid(kind: EventKind, field: &str, value: &str) -> Result<Uuid> {
    if value.is_empty() {
        return Err(CodecError::invalid(kind, format!("missing {field}")));
    }
    Uuid::parse_str(value)
        .map_err(|e| CodecError::invalid(kind, format!("{field} is not a UUID: {e}")))
}

fn payment_method_to_proto(method: PaymentMethod) -> pb::PaymentMethod {
    match method {
        PaymentMethod::Card => pb::PaymentMethod::Card,
        PaymentMethod::Sbp => pb::PaymentMethod::Sbp,
        PaymentMethod::CreditCard => pb::PaymentMethod::CreditCard,
        PaymentMethod::InvestorMoney => pb::PaymentMethod::InvestorMoney,
    }
}

fn payment_method_from_proto(method: pb::PaymentMethod) -> Option<PaymentMethod> {
    match method {
        pb::PaymentMethod::Unspecified => None,
        pb::PaymentMethod::Card => Some(PaymentMethod::Card),
        pb::PaymentMethod::Sbp => Some(PaymentMethod::Sbp),
        pb::PaymentMethod::CreditCard => Some(PaymentMethod::CreditCard),
        pb::PaymentMethod::InvestorMoney => Some(PaymentMethod::InvestorMoney),
    }
}
