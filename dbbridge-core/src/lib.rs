//! Core adapters, dialects and adapter factory for DBBridge.
//!
//! This crate gives callers one data-access contract over a relational
//! engine (MySQL) and a document engine (MongoDB). SQL-shaped text sent to
//! the document engine goes through a restricted translator; anything it
//! cannot express is rejected instead of guessed.
//!
//! # Security Guarantees
//! - Passwords are zeroized on drop and never serialized or logged
//! - Connection strings are redacted in every error and log line
//! - Row-level helpers always bind values; only dialect-quoted identifiers
//!   are interpolated
//!
//! # Architecture
//! - Adapter contract with one variant per engine, selected by `engine_type`
//! - Factory with a per-key single-flight cache, health checks and metrics
//! - Error taxonomy that keeps the engine's native message
//!
//! # Example
//! ```rust,no_run
//! use dbbridge_core::{AdapterFactory, ConnectionConfig, EngineType};
//!
//! # async fn example() -> dbbridge_core::Result<()> {
//! let factory = AdapterFactory::new();
//! let config = ConnectionConfig::new(EngineType::Relational, "localhost")
//!     .with_database("shop")
//!     .with_username("app");
//!
//! let result = factory.execute_query(&config, "SELECT 1", &[]).await?;
//! assert_eq!(result.row_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod dialect;
pub mod error;
pub mod factory;
pub mod logging;
pub mod models;
pub mod translator;

// Re-export commonly used types
pub use adapters::{
    AdapterFeature, AdapterState, ConnectionConfig, ConnectionRegistry, DatabaseAdapter,
    create_adapter,
};
pub use dialect::{Dialect, dialect_for};
pub use error::{DbBridgeError, ErrorKind, Result};
pub use factory::{AdapterFactory, AdapterKey, ConnectionMetrics};
pub use models::{
    ColumnDefinition, ColumnInfo, EngineType, FieldInfo, IndexInfo, PoolStatistics, PoolStats,
    QueryResult, Row, Statement, TableInfo, TableSchema,
};
pub use translator::{DocumentOperation, TranslatedQuery, translate};
