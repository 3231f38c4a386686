//! Shared utilities

pub mod error;

pub use error::{ErrorBody, GatewayError, Result};
