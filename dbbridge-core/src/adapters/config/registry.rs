//! File-backed store of connection configurations.
//!
//! The durable registry normally lives outside this crate; this minimal JSON
//! store lets the CLI and tests hand configs to the factory without one.

use super::ConnectionConfig;
use crate::error::DbBridgeError;
use std::fs;
use std::path::Path;

/// Connection configs loaded from a JSON array on disk.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Vec<ConnectionConfig>,
}

impl ConnectionRegistry {
    /// Creates a registry from configs already in memory.
    pub fn new(connections: Vec<ConnectionConfig>) -> Self {
        Self { connections }
    }

    /// Loads the registry file; a missing file yields an empty registry.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            DbBridgeError::configuration(format!(
                "Failed to read connection registry {}: {}",
                path.display(),
                e
            ))
        })?;
        let connections: Vec<ConnectionConfig> = serde_json::from_str(&content).map_err(|e| {
            DbBridgeError::serialization(
                format!("Failed to parse connection registry {}", path.display()),
                e,
            )
        })?;

        tracing::debug!(path = %path.display(), count = connections.len(), "Loaded connection registry");
        Ok(Self { connections })
    }

    /// Writes the registry as pretty JSON. Passwords are never written.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(&self.connections)
            .map_err(|e| DbBridgeError::serialization("Failed to serialize connections", e))?;
        fs::write(path, content).map_err(|e| {
            DbBridgeError::configuration(format!(
                "Failed to write connection registry {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Looks up a config by id.
    pub fn get(&self, id: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Adds a config, replacing any existing entry with the same id.
    pub fn upsert(&mut self, config: ConnectionConfig) {
        if let Some(existing) = self.connections.iter_mut().find(|c| c.id == config.id) {
            *existing = config;
        } else {
            self.connections.push(config);
        }
    }

    /// Removes a config by id, returning whether it existed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.connections.len();
        self.connections.retain(|c| c.id != id);
        self.connections.len() != before
    }

    /// All configs in file order.
    pub fn connections(&self) -> &[ConnectionConfig] {
        &self.connections
    }
}
