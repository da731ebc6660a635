//! Inbound transports for the Order service.

pub mod http;

pub use http::{router, serve};
