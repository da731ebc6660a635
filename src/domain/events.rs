//! Order lifecycle events exchanged over the bus.

use std::fmt;

use uuid::Uuid;

use super::PaymentMethod;

/// Emitted once an order transitions to PAID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPaid {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub payment_method: PaymentMethod,
    pub transaction_id: String,
}

impl OrderPaid {
    /// Build the event with a fresh `event_id`.
    pub fn new(
        order_id: Uuid,
        user_id: Uuid,
        payment_method: PaymentMethod,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            user_id,
            payment_method,
            transaction_id: transaction_id.into(),
        }
    }
}

/// Emitted by the Assembly worker when a ship is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipAssembled {
    pub event_id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub build_time_seconds: i64,
}

impl ShipAssembled {
    /// Build the event with a fresh `event_id`.
    pub fn new(order_id: Uuid, user_id: Uuid, build_time_seconds: i64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            order_id,
            user_id,
            build_time_seconds,
        }
    }
}

/// Event discriminator, used to pick a decoder for raw payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderPaid,
    ShipAssembled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OrderPaid => "ORDER_PAID",
            EventKind::ShipAssembled => "SHIP_ASSEMBLED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = super::ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ORDER_PAID" => Ok(EventKind::OrderPaid),
            "SHIP_ASSEMBLED" => Ok(EventKind::ShipAssembled),
            other => Err(super::ParseVariantError::new("event kind", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    OrderPaid(OrderPaid),
    ShipAssembled(ShipAssembled),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::OrderPaid(_) => EventKind::OrderPaid,
            Event::ShipAssembled(_) => EventKind::ShipAssembled,
        }
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            Event::OrderPaid(e) => e.event_id,
            Event::ShipAssembled(e) => e.event_id,
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderPaid(e) => e.order_id,
            Event::ShipAssembled(e) => e.order_id,
        }
    }
}

impl From<OrderPaid> for Event {
    fn from(e: OrderPaid) -> Self {
        Event::OrderPaid(e)
    }
}

impl From<ShipAssembled> for Event {
    fn from(e: ShipAssembled) -> Self {
        Event::ShipAssembled(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_allocate_fresh_event_ids() {
        let order_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let a = ShipAssembled::new(order_id, user_id, 10);
        let b = ShipAssembled::new(order_id, user_id, 10);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn test_event_accessors() {
        let paid = OrderPaid::new(Uuid::new_v4(), Uuid::new_v4(), PaymentMethod::Sbp, "tx");
        let event = Event::from(paid.clone());
        assert_eq!(event.kind(), EventKind::OrderPaid);
        assert_eq!(event.event_id(), paid.event_id);
        assert_eq!(event.order_id(), paid.order_id);
    }

    #[test]
    fn test_kind_string_encoding() {
        for kind in [EventKind::OrderPaid, EventKind::ShipAssembled] {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
    }
}
