//! MySQL connection pool management.
//!
//! # Security Features
//! - Credentials come from the config and never appear in error messages
//! - Enforces connection limits to prevent resource exhaustion
//! - Sets statement and connect timeouts on every pooled connection

use crate::Result;
use crate::adapters::ConnectionConfig;
use crate::error::{DbBridgeError, redact_database_url};
use crate::models::PoolStats;
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use std::str::FromStr;

/// Builds connect options from either the raw connection string or the
/// discrete config fields.
pub(super) fn connect_options(config: &ConnectionConfig) -> Result<MySqlConnectOptions> {
    let options = match &config.connection_string {
        Some(raw) => MySqlConnectOptions::from_str(raw).map_err(|e| {
            DbBridgeError::configuration(format!(
                "Invalid MySQL connection string {}: {}",
                redact_database_url(raw),
                e
            ))
        })?,
        None => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.effective_port());
            if let Some(username) = &config.username {
                options = options.username(username);
            }
            if let Some(password) = &config.password {
                options = options.password(password.as_str());
            }
            if let Some(database) = &config.database {
                options = options.database(database);
            }
            options
        }
    };

    // An explicit ssl-mode in the connection string wins unless TLS is required
    if config.ssl {
        Ok(options.ssl_mode(MySqlSslMode::Required))
    } else if config.connection_string.is_none() {
        Ok(options.ssl_mode(MySqlSslMode::Preferred))
    } else {
        Ok(options)
    }
}

/// Opens the pool and runs one liveness check.
///
/// The whole attempt is bounded by `connect_timeout`. On any failure the
/// partially opened pool is closed before returning.
///
/// # Errors
/// - `Configuration` when the connection string cannot be parsed
/// - `Connection` for network, authentication and timeout failures
pub(super) async fn open_pool(config: &ConnectionConfig) -> Result<MySqlPool> {
    use sqlx::Executor;

    let options = connect_options(config)?;
    let query_timeout_ms = config.query_timeout.as_millis();
    let target = config.to_string();

    let pool_options = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout)
        .test_before_acquire(true)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Set timezone to UTC for consistent timestamps
                conn.execute("SET time_zone = '+00:00'").await?;

                conn.execute(
                    format!("SET SESSION max_execution_time = {}", query_timeout_ms).as_str(),
                )
                .await?;

                Ok(())
            })
        });

    let pool = tokio::time::timeout(config.connect_timeout, pool_options.connect_with(options))
        .await
        .map_err(|_| DbBridgeError::connection_timeout("MySQL", config.connect_timeout))?
        .map_err(|e| connect_error(&target, e))?;

    let ping = tokio::time::timeout(
        config.connect_timeout,
        sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(&pool),
    )
    .await;

    match ping {
        Ok(Ok(_)) => Ok(pool),
        Ok(Err(e)) => {
            pool.close().await;
            Err(connect_error(&target, e))
        }
        Err(_) => {
            pool.close().await;
            Err(DbBridgeError::connection_timeout(
                "MySQL",
                config.connect_timeout,
            ))
        }
    }
}

/// Every failure while connecting is a connection failure, including
/// server-side rejections such as access denied.
fn connect_error(target: &str, error: sqlx::Error) -> DbBridgeError {
    match error {
        sqlx::Error::Configuration(e) => DbBridgeError::configuration(e.to_string()),
        other => DbBridgeError::connection_failed(
            format!("Failed to connect to MySQL at {}", target),
            other,
        ),
    }
}

/// Snapshot of the pool counters.
pub(super) fn pool_stats(pool: &MySqlPool, max_connections: u32) -> PoolStats {
    let total = pool.size();
    let idle = u32::try_from(pool.num_idle()).unwrap_or(u32::MAX);
    PoolStats {
        idle_connections: idle,
        active_connections: total.saturating_sub(idle),
        total_connections: total,
        max_connections,
    }
}
