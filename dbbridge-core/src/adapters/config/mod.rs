//! Configuration types for database adapters.
//!
//! - `ConnectionConfig`: one connection's target, credentials and pool limits
//! - `ConnectionRegistry`: JSON file of connection configs
//!
//! # Security
//! Passwords live in zeroizing buffers and are never serialized or logged.

mod connection;
mod registry;

pub use connection::ConnectionConfig;
pub use registry::ConnectionRegistry;
