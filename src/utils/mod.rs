//! Shared helpers for binaries and background tasks.

pub mod bootstrap;
pub mod retry;
pub mod shutdown;
