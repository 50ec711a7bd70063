//! Database connection configuration.
//!
//! This module provides the `ConnectionConfig` record an adapter is built
//! from. A config is treated as immutable once an adapter exists for it.

use crate::error::{DbBridgeError, redact_database_url};
use crate::models::EngineType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;
use zeroize::Zeroizing;

/// Configuration for one database connection.
///
/// # Security
/// The password is held in a [`Zeroizing`] buffer, is accepted on
/// deserialization but never serialized back out, and is omitted from
/// `Debug` and `Display`.
///
/// # Example
/// ```rust
/// use dbbridge_core::adapters::ConnectionConfig;
/// use dbbridge_core::models::EngineType;
///
/// let config = ConnectionConfig::new(EngineType::Relational, "localhost")
///     .with_port(3306)
///     .with_database("shop")
///     .with_username("app");
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Registry identity of this connection
    pub id: String,
    /// Display name
    pub name: String,
    pub engine_type: EngineType,
    pub host: String,
    /// Falls back to the engine default port when unset
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<Zeroizing<String>>,
    /// Require TLS to the server
    pub ssl: bool,
    /// Raw connection string; takes precedence over the individual fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    /// Free-form caller data, carried but never interpreted
    pub metadata: Map<String, Value>,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub query_timeout: Duration,
    /// Maximum number of connections in the native pool
    pub max_connections: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: String::new(),
            engine_type: EngineType::Relational,
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            password: None,
            ssl: false,
            connection_string: None,
            metadata: Map::new(),
            connect_timeout: Duration::from_secs(10),
            query_timeout: Duration::from_secs(30),
            max_connections: 10,
        }
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("engine_type", &self.engine_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("ssl", &self.ssl)
            .field(
                "connection_string",
                &self.connection_string.as_deref().map(redact_database_url),
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("query_timeout", &self.query_timeout)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(raw) = &self.connection_string {
            return write!(f, "{}", redact_database_url(raw));
        }
        write!(
            f,
            "{}://{}:{}{}",
            self.engine_type,
            self.host,
            self.effective_port(),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
        // Intentionally omit username and never include credentials
    }
}

impl ConnectionConfig {
    /// Creates a new connection config with safe defaults.
    pub fn new(engine_type: EngineType, host: impl Into<String>) -> Self {
        Self {
            engine_type,
            host: host.into(),
            ..Default::default()
        }
    }

    /// Creates a config from a raw connection string.
    ///
    /// The engine type is taken from the URL scheme.
    pub fn from_connection_string(connection_string: &str) -> crate::Result<Self> {
        let engine_type = engine_for_scheme(connection_string)?;
        Ok(Self {
            engine_type,
            connection_string: Some(connection_string.to_string()),
            ..Default::default()
        })
    }

    /// Builder method to set the registry id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Builder method to set password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Builder method to require TLS.
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Port to dial, falling back to the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.engine_type.default_port())
    }

    /// Renders the URL handed to the native driver.
    ///
    /// Returns the raw connection string when one is configured. The result
    /// may contain the password; never log it without
    /// [`redact_database_url`].
    pub fn connection_url(&self) -> crate::Result<String> {
        if let Some(raw) = &self.connection_string {
            return Ok(raw.clone());
        }

        let scheme = match self.engine_type {
            EngineType::Relational => "mysql",
            EngineType::Document => "mongodb",
        };
        let mut url = Url::parse(&format!("{}://{}", scheme, self.host)).map_err(|e| {
            DbBridgeError::configuration(format!("Invalid host '{}': {}", self.host, e))
        })?;

        url.set_port(Some(self.effective_port()))
            .map_err(|()| DbBridgeError::configuration("Cannot set port on connection URL"))?;
        if let Some(username) = &self.username {
            url.set_username(username)
                .map_err(|()| DbBridgeError::configuration("Cannot set username on connection URL"))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password.as_str()))
                .map_err(|()| DbBridgeError::configuration("Cannot set password on connection URL"))?;
        }
        match &self.database {
            Some(database) => url.set_path(&format!("/{}", database)),
            None => url.set_path("/"),
        }
        if self.ssl && self.engine_type == EngineType::Document {
            url.query_pairs_mut().append_pair("tls", "true");
        }

        Ok(url.to_string())
    }

    /// Returns every validation problem without failing.
    ///
    /// An empty list means the config is safe to hand to an adapter.
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(raw) = &self.connection_string {
            match Url::parse(raw) {
                Ok(url) => {
                    let expected = match self.engine_type {
                        EngineType::Relational => &["mysql"][..],
                        EngineType::Document => &["mongodb", "mongodb+srv"][..],
                    };
                    if !expected.contains(&url.scheme()) {
                        errors.push(format!(
                            "connection string scheme '{}' does not match engine type '{}'",
                            url.scheme(),
                            self.engine_type
                        ));
                    }
                    if url.host_str().is_none_or(str::is_empty) {
                        errors.push("connection string must specify a host".to_string());
                    }
                }
                Err(e) => errors.push(format!("connection string is malformed: {}", e)),
            }
        } else {
            if self.host.trim().is_empty() {
                errors.push("host is required".to_string());
            }
            if self.engine_type == EngineType::Relational
                && self.database.as_deref().is_none_or(|db| db.trim().is_empty())
            {
                errors.push("database is required for relational connections".to_string());
            }
        }

        if self.port == Some(0) {
            errors.push("port must be greater than 0".to_string());
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            errors.push("max_connections must be between 1 and 100".to_string());
        }

        if self.connect_timeout.is_zero() {
            errors.push("connect_timeout must be greater than 0".to_string());
        }

        if self.query_timeout.is_zero() {
            errors.push("query_timeout must be greater than 0".to_string());
        }

        errors
    }

    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns a configuration error listing every problem found
    pub fn validate(&self) -> crate::Result<()> {
        let errors = self.validation_errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DbBridgeError::configuration(errors.join("; ")))
        }
    }
}

fn engine_for_scheme(connection_string: &str) -> crate::Result<EngineType> {
    let url = Url::parse(connection_string).map_err(|e| {
        DbBridgeError::configuration(format!(
            "Invalid connection string {}: {}",
            redact_database_url(connection_string),
            e
        ))
    })?;

    match url.scheme() {
        "mysql" => Ok(EngineType::Relational),
        "mongodb" | "mongodb+srv" => Ok(EngineType::Document),
        other => Err(DbBridgeError::configuration(format!(
            "Unsupported connection scheme: {}",
            other
        ))),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
