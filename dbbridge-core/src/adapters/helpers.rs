//! Lifecycle state shared by the engine adapters.
//!
//! Each adapter keeps its native handle inside a `ConnectionState` behind a
//! `tokio::sync::RwLock`: operations take a read lock just long enough to
//! clone the handle, while `connect` and `disconnect` take the write lock.

use crate::Result;
use crate::error::DbBridgeError;
use std::fmt;

/// Externally visible lifecycle state of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// Constructed, or a connect attempt failed
    Unconnected,
    /// Native handle established and pinged
    Live,
    /// Disconnected; the adapter must not be reused
    Closed,
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unconnected => "unconnected",
            Self::Live => "live",
            Self::Closed => "closed",
        })
    }
}

/// Native handle slot of an adapter.
#[derive(Debug)]
pub(crate) enum ConnectionState<H> {
    Unconnected,
    Live(H),
    Closed,
}

impl<H: Clone> ConnectionState<H> {
    pub(crate) const fn new() -> Self {
        Self::Unconnected
    }

    pub(crate) const fn state(&self) -> AdapterState {
        match self {
            Self::Unconnected => AdapterState::Unconnected,
            Self::Live(_) => AdapterState::Live,
            Self::Closed => AdapterState::Closed,
        }
    }

    /// Clones the live handle, or fails with a connection error.
    pub(crate) fn handle(&self, engine: &str) -> Result<H> {
        match self {
            Self::Live(handle) => Ok(handle.clone()),
            other => Err(DbBridgeError::not_connected(engine, other.state())),
        }
    }

    /// Checks whether a connect attempt may proceed.
    ///
    /// Returns `Ok(true)` when already live, `Ok(false)` when a new handle
    /// must be opened.
    pub(crate) fn ready_to_connect(&self, engine: &str) -> Result<bool> {
        match self {
            Self::Live(_) => Ok(true),
            Self::Unconnected => Ok(false),
            Self::Closed => Err(DbBridgeError::not_connected(engine, AdapterState::Closed)),
        }
    }

    /// Moves to `Closed`, handing back the handle if one was live.
    pub(crate) fn close(&mut self) -> Option<H> {
        match std::mem::replace(self, Self::Closed) {
            Self::Live(handle) => Some(handle),
            Self::Unconnected | Self::Closed => None,
        }
    }
}
