//! Database adapter trait and constructor for uniform data access.
//!
//! Every engine variant implements [`DatabaseAdapter`], so callers and the
//! factory hold `Arc<dyn DatabaseAdapter>` and never inspect the concrete
//! type. The variant is selected by the config's tagged `engine_type`.
//!
//! # Module Structure
//! - `config`: Connection configuration and the JSON connection registry
//! - `helpers`: Adapter lifecycle state shared by the engine variants
//! - `mysql`: Relational engine adapter (feature `mysql`)
//! - `mongodb`: Document engine adapter (feature `mongodb`)

use crate::Result;
use crate::dialect::Dialect;
use crate::models::{
    EngineType, IndexInfo, PoolStats, QueryResult, Row, Statement, TableInfo, TableSchema,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub mod config;
pub mod helpers;

#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use config::{ConnectionConfig, ConnectionRegistry};
pub use helpers::AdapterState;

/// Capabilities that differ between engine variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFeature {
    /// All-or-nothing multi-statement execution
    Transactions,
    /// Schema reported from sampled data instead of a declared catalog
    SchemaInference,
    /// Native pool with observable statistics
    ConnectionPooling,
    /// SQL-shaped text translated to native operations
    QueryTranslation,
}

/// Uniform data-access contract implemented by every engine variant.
///
/// # Lifecycle
/// `unconnected -> connect() -> live -> disconnect() -> closed`. A closed
/// adapter is never reused; operations outside the live state fail with a
/// connection error.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn DatabaseAdapter>`.
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Engine family this adapter speaks to.
    fn engine_type(&self) -> EngineType;

    /// The configuration this adapter was built from.
    fn connection_config(&self) -> &ConnectionConfig;

    /// Syntax generator for this engine.
    fn dialect(&self) -> &'static dyn Dialect;

    /// Current lifecycle state.
    async fn state(&self) -> AdapterState;

    /// Checks if the adapter supports a specific feature.
    fn supports_feature(&self, feature: AdapterFeature) -> bool;

    /// Establishes the native handle and runs one liveness check.
    ///
    /// # Errors
    /// Any failure leaves the adapter unconnected with no handle retained.
    /// Calling `connect` on a closed adapter is an error.
    async fn connect(&self) -> Result<()>;

    /// Releases every native resource. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Non-throwing liveness check. Never changes adapter state.
    async fn test_connection(&self) -> bool;

    /// Executes one statement with positional parameters.
    async fn execute_query(&self, text: &str, params: &[Value]) -> Result<QueryResult>;

    /// Executes statements in order, all-or-nothing.
    ///
    /// # Errors
    /// On the first failure every prior statement is rolled back and a
    /// `TransactionAborted` error wrapping the original failure is returned.
    async fn execute_transaction(&self, statements: &[Statement]) -> Result<Vec<QueryResult>>;

    /// Lists databases visible to the configured user.
    async fn get_databases(&self) -> Result<Vec<String>>;

    /// Lists tables (or collections) of the configured database.
    async fn get_tables(&self) -> Result<Vec<TableInfo>>;

    /// Describes the columns of one table.
    ///
    /// For the document engine this is inferred from a bounded sample and is
    /// flagged with `inferred = true`.
    async fn get_table_schema(&self, table: &str) -> Result<TableSchema>;

    /// Lists indexes of one table.
    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;

    /// Inserts one row built from `data`.
    async fn insert(&self, table: &str, data: &Row) -> Result<QueryResult>;

    /// Updates rows matching `filter` (all rows when `None`).
    async fn update(&self, table: &str, data: &Row, filter: Option<&Row>) -> Result<QueryResult>;

    /// Deletes rows matching `filter` (all rows when `None`).
    async fn delete(&self, table: &str, filter: Option<&Row>) -> Result<QueryResult>;

    /// Snapshot of the native pool, when the engine exposes one.
    async fn pool_status(&self) -> Option<PoolStats> {
        None
    }
}

/// Constructs an unconnected adapter for the config's engine type.
///
/// # Errors
/// Returns error if:
/// - The configuration fails validation
/// - The engine's driver was not compiled in
pub fn create_adapter(config: ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
    config.validate()?;

    match config.engine_type {
        EngineType::Relational => {
            #[cfg(feature = "mysql")]
            {
                Ok(Arc::new(mysql::MySqlAdapter::new(config)))
            }
            #[cfg(not(feature = "mysql"))]
            {
                Err(crate::error::DbBridgeError::unsupported_feature(
                    "MySQL driver (compile with --features mysql)",
                    EngineType::Relational.as_str(),
                ))
            }
        }
        EngineType::Document => {
            #[cfg(feature = "mongodb")]
            {
                Ok(Arc::new(mongodb::MongoAdapter::new(config)))
            }
            #[cfg(not(feature = "mongodb"))]
            {
                Err(crate::error::DbBridgeError::unsupported_feature(
                    "MongoDB driver (compile with --features mongodb)",
                    EngineType::Document.as_str(),
                ))
            }
        }
    }
}
