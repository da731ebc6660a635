//! Domain model shared by the Order, Assembly and authorization components.
//!
//! Plain Rust types with no transport or storage concerns. Conversions to and
//! from the protobuf schema live next to the code that owns each wire format.

pub mod events;
pub mod order;
pub mod part;
pub mod session;

pub use events::{Event, EventKind, OrderPaid, ShipAssembled};
pub use order::{Order, OrderStatus, PaymentMethod, Transition, TransitionError};
pub use part::{Category, Dimensions, Manufacturer, MetadataValue, Part, PartsFilter};
pub use session::{Identity, Session, User};

/// Error returned when a string does not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct ParseVariantError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseVariantError {
    pub(crate) fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}
