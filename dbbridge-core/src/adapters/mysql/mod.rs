//! MySQL database adapter with connection pooling.
//!
//! # Module Structure
//! - `connection`: Connection pool creation and statistics
//! - `query`: Statement execution, parameter binding and row conversion
//! - `schema_collection`: Database, table, column and index introspection
//!
//! # Security Guarantees
//! - Every value is sent as a bound parameter, never spliced into SQL
//! - Identifiers built by CRUD helpers are quoted by the MySQL dialect
//! - Connection strings are sanitized in error messages
//! - Query timeouts prevent resource exhaustion

mod connection;
mod query;
mod schema_collection;


use super::helpers::{AdapterState, ConnectionState};
use super::{AdapterFeature, ConnectionConfig, DatabaseAdapter};
use crate::Result;
use crate::dialect::{self, Dialect};
use crate::error::DbBridgeError;
use crate::models::*;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::MySqlPool;
use tokio::sync::RwLock;

const ENGINE: &str = "MySQL";

/// MySQL database adapter with connection pooling
pub struct MySqlAdapter {
    /// Connection configuration (pool settings, timeouts, etc.)
    config: ConnectionConfig,
    /// Pool handle, present only while live
    state: RwLock<ConnectionState<MySqlPool>>,
}

impl std::fmt::Debug for MySqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MySqlAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MySqlAdapter {
    /// Creates an unconnected adapter. No network activity happens until
    /// [`DatabaseAdapter::connect`].
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::new()),
        }
    }

    async fn pool(&self) -> Result<MySqlPool> {
        self.state.read().await.handle(ENGINE)
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn engine_type(&self) -> EngineType {
        EngineType::Relational
    }

    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn dialect(&self) -> &'static dyn Dialect {
        dialect::dialect_for(EngineType::Relational)
    }

    async fn state(&self) -> AdapterState {
        self.state.read().await.state()
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::Transactions | AdapterFeature::ConnectionPooling
        )
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.ready_to_connect(ENGINE)? {
            return Ok(());
        }

        tracing::info!("Connecting to MySQL at {}", self.config);
        let pool = connection::open_pool(&self.config).await.inspect_err(|e| {
            tracing::warn!("MySQL connect to {} failed: {}", self.config, e);
        })?;

        *state = ConnectionState::Live(pool);
        tracing::debug!("MySQL pool ready for connection {}", self.config.id);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let pool = self.state.write().await.close();
        if let Some(pool) = pool {
            pool.close().await;
            tracing::info!("Closed MySQL pool for connection {}", self.config.id);
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        let Ok(pool) = self.pool().await else {
            return false;
        };

        let ping = sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool);
        match tokio::time::timeout(self.config.connect_timeout, ping).await {
            Ok(Ok(value)) => value == 1,
            Ok(Err(e)) => {
                tracing::debug!("MySQL liveness check failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("MySQL liveness check timed out");
                false
            }
        }
    }

    async fn execute_query(&self, text: &str, params: &[Value]) -> Result<QueryResult> {
        let pool = self.pool().await?;
        let mut conn = pool.acquire().await.map_err(DbBridgeError::from_sqlx)?;
        tracing::debug!("Executing MySQL statement with {} parameter(s)", params.len());
        query::run_statement(&mut conn, text, params).await
    }

    async fn execute_transaction(&self, statements: &[Statement]) -> Result<Vec<QueryResult>> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await.map_err(DbBridgeError::from_sqlx)?;
        let mut results = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            match query::run_statement(&mut *tx, &statement.text, &statement.params).await {
                Ok(result) => results.push(result),
                Err(error) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        tracing::error!("MySQL rollback failed: {}", rollback_error);
                    }
                    tracing::warn!(
                        "MySQL transaction rolled back at statement {}: {}",
                        index,
                        error
                    );
                    return Err(DbBridgeError::transaction_aborted(index, error));
                }
            }
        }

        tx.commit().await.map_err(DbBridgeError::from_sqlx)?;
        Ok(results)
    }

    async fn get_databases(&self) -> Result<Vec<String>> {
        schema_collection::list_databases(&self.pool().await?).await
    }

    async fn get_tables(&self) -> Result<Vec<TableInfo>> {
        schema_collection::list_tables(&self.pool().await?).await
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        schema_collection::table_schema(&self.pool().await?, table).await
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        schema_collection::table_indexes(&self.pool().await?, table).await
    }

    async fn insert(&self, table: &str, data: &Row) -> Result<QueryResult> {
        let (text, params) = query::insert_statement(self.dialect(), table, data)?;
        self.execute_query(&text, &params).await
    }

    async fn update(&self, table: &str, data: &Row, filter: Option<&Row>) -> Result<QueryResult> {
        let (text, params) = query::update_statement(self.dialect(), table, data, filter)?;
        self.execute_query(&text, &params).await
    }

    async fn delete(&self, table: &str, filter: Option<&Row>) -> Result<QueryResult> {
        let (text, params) = query::delete_statement(self.dialect(), table, filter);
        self.execute_query(&text, &params).await
    }

    async fn pool_status(&self) -> Option<PoolStats> {
        let pool = self.pool().await.ok()?;
        Some(connection::pool_stats(&pool, self.config.max_connections))
    }
}
