//! Service implementations.
//!
//! [`order`] is the core of the crate. The Inventory, Payment and IAM
//! services are small in-memory stand-ins that serve both gRPC and the
//! in-process client traits, so one binary can run the whole suite.

pub mod iam;
pub mod inventory;
pub mod order;
pub mod payment;

pub use iam::{IamConfig, IamDirectory};
pub use inventory::InventoryCatalog;
pub use order::{OrderError, OrderService};
pub use payment::PaymentGateway;
