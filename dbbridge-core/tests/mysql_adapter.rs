//! MySQL adapter integration tests.
//!
//! This test suite covers:
//! - Connect, ping and idempotent disconnect
//! - Read and write result invariants
//! - Transaction rollback when a later statement fails
//! - Introspection through INFORMATION_SCHEMA
//! - Factory caching against a live server

#![cfg(feature = "mysql")]

use dbbridge_core::{
    AdapterFactory, AdapterState, ConnectionConfig, DatabaseAdapter, DbBridgeError, ErrorKind,
    Result, Row, Statement, adapters::mysql::MySqlAdapter,
};
use serde_json::json;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Helper function to wait for MySQL to be ready
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) -> Result<()> {
    let mut attempts = 0;
    while attempts < max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                pool.close().await;
                return Ok(());
            }
            pool.close().await;
        }
        attempts += 1;
        if attempts < max_attempts {
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
    Err(DbBridgeError::connection_failed(
        "MySQL test container",
        std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("MySQL failed to become ready after {} attempts", max_attempts),
        ),
    ))
}

fn config_for(database_url: &str) -> ConnectionConfig {
    ConnectionConfig::from_connection_string(database_url)
        .unwrap()
        .with_id("mysql-it")
        .with_connect_timeout(Duration::from_secs(10))
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}

/// Test connect, ping and disconnect lifecycle
#[tokio::test]
async fn test_mysql_connection_lifecycle() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let adapter = MySqlAdapter::new(config_for(&database_url));
    adapter.connect().await?;
    assert_eq!(adapter.state().await, AdapterState::Live);
    assert!(adapter.test_connection().await);

    let stats = adapter.pool_status().await.unwrap();
    assert!(stats.total_connections >= 1);
    assert_eq!(stats.max_connections, 10);

    adapter.disconnect().await?;
    adapter.disconnect().await?;
    assert_eq!(adapter.state().await, AdapterState::Closed);
    assert!(!adapter.test_connection().await);

    let error = adapter.execute_query("SELECT 1", &[]).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Connection);

    Ok(())
}

/// Test read and write result shapes
#[tokio::test]
async fn test_mysql_read_write_results() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let adapter = MySqlAdapter::new(config_for(&database_url));
    adapter.connect().await?;

    adapter
        .execute_query(
            "CREATE TABLE users (
                id INT AUTO_INCREMENT PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email VARCHAR(255),
                balance DECIMAL(10, 2),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            &[],
        )
        .await?;

    let inserted = adapter
        .insert(
            "users",
            &row(json!({"name": "alice", "email": null, "balance": "10.50"})),
        )
        .await?;
    assert_eq!(inserted.affected_rows, Some(1));
    assert_eq!(inserted.row_count, 1);
    assert_eq!(inserted.insert_id, Some(json!(1)));

    let inserted = adapter
        .execute_query(
            "INSERT INTO users (name, email) VALUES (?, ?), (?, ?)",
            &[json!("bob"), json!("bob@example.com"), json!("carol"), json!(null)],
        )
        .await?;
    assert_eq!(inserted.affected_rows, Some(2));
    assert_eq!(inserted.row_count, 2);
    assert!(inserted.rows.is_empty());

    let selected = adapter
        .execute_query(
            "SELECT id, name, email, balance FROM users WHERE id > ? ORDER BY id",
            &[json!(0)],
        )
        .await?;
    assert_eq!(selected.row_count, 3);
    assert_eq!(selected.row_count as usize, selected.rows.len());
    assert_eq!(selected.affected_rows, None);
    assert_eq!(selected.rows[0]["name"], json!("alice"));
    assert_eq!(selected.rows[0]["email"], json!(null));
    assert_eq!(selected.rows[0]["balance"], json!("10.50"));
    let field_names: Vec<&str> = selected.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(field_names, vec!["id", "name", "email", "balance"]);

    let updated = adapter
        .update(
            "users",
            &row(json!({"email": "carol@example.com"})),
            Some(&row(json!({"name": "carol", "email": null}))),
        )
        .await?;
    assert_eq!(updated.affected_rows, Some(1));

    let deleted = adapter
        .delete("users", Some(&row(json!({"name": "bob"}))))
        .await?;
    assert_eq!(deleted.affected_rows, Some(1));

    let error = adapter
        .execute_query("SELECT * FROM missing_table", &[])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Statement);
    assert!(error.to_string().contains("missing_table"));

    adapter.disconnect().await
}

/// Test that a failing statement rolls back the whole batch
#[tokio::test]
async fn test_mysql_transaction_rollback() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let adapter = MySqlAdapter::new(config_for(&database_url));
    adapter.connect().await?;
    adapter
        .execute_query(
            "CREATE TABLE ledger (id INT PRIMARY KEY, amount INT NOT NULL) ENGINE=InnoDB",
            &[],
        )
        .await?;

    let error = adapter
        .execute_transaction(&[
            Statement::with_params(
                "INSERT INTO ledger (id, amount) VALUES (?, ?)",
                vec![json!(1), json!(100)],
            ),
            Statement::with_params(
                "INSERT INTO ledger (id, amount) VALUES (?, ?)",
                vec![json!(1), json!(200)],
            ),
            Statement::with_params(
                "INSERT INTO ledger (id, amount) VALUES (?, ?)",
                vec![json!(3), json!(300)],
            ),
        ])
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::TransactionAbort);
    match &error {
        DbBridgeError::TransactionAborted {
            statement_index,
            source,
        } => {
            assert_eq!(*statement_index, 1);
            assert_eq!(source.kind(), ErrorKind::Statement);
            assert!(source.to_string().contains("Duplicate entry"));
        }
        other => panic!("unexpected error: {}", other),
    }

    let count = adapter
        .execute_query("SELECT COUNT(*) AS n FROM ledger", &[])
        .await?;
    assert_eq!(count.rows[0]["n"], json!(0));

    let results = adapter
        .execute_transaction(&[
            Statement::new("INSERT INTO ledger (id, amount) VALUES (1, 100)"),
            Statement::new("UPDATE ledger SET amount = amount + 1 WHERE id = 1"),
            Statement::new("SELECT amount FROM ledger WHERE id = 1"),
        ])
        .await?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[1].affected_rows, Some(1));
    assert_eq!(results[2].rows[0]["amount"], json!(101));

    adapter.disconnect().await
}

/// Test INFORMATION_SCHEMA introspection
#[tokio::test]
async fn test_mysql_introspection() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let adapter = MySqlAdapter::new(config_for(&database_url));
    adapter.connect().await?;
    for statement in [
        "CREATE TABLE accounts (
            id INT AUTO_INCREMENT PRIMARY KEY,
            email VARCHAR(255) NOT NULL COMMENT 'login address',
            tenant INT NOT NULL DEFAULT 0,
            UNIQUE KEY email_tenant (email, tenant)
        )",
        "CREATE VIEW account_emails AS SELECT email FROM accounts",
    ] {
        adapter.execute_query(statement, &[]).await?;
    }

    let databases = adapter.get_databases().await?;
    assert!(databases.contains(&"test".to_string()));
    assert!(!databases.contains(&"mysql".to_string()));
    assert!(!databases.contains(&"information_schema".to_string()));

    let tables = adapter.get_tables().await?;
    let accounts = tables.iter().find(|t| t.name == "accounts").unwrap();
    assert_eq!(accounts.table_type, "table");
    assert_eq!(accounts.schema.as_deref(), Some("test"));
    let view = tables.iter().find(|t| t.name == "account_emails").unwrap();
    assert_eq!(view.table_type, "view");

    let schema = adapter.get_table_schema("accounts").await?;
    assert!(!schema.inferred);
    let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "tenant"]);
    assert!(schema.columns[0].is_primary_key);
    assert_eq!(schema.columns[0].extra.as_deref(), Some("auto_increment"));
    assert!(!schema.columns[1].nullable);
    assert_eq!(schema.columns[1].comment.as_deref(), Some("login address"));
    assert_eq!(schema.columns[2].default_value.as_deref(), Some("0"));

    let error = adapter.get_table_schema("nope").await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Statement);

    let indexes = adapter.get_indexes("accounts").await?;
    let primary = indexes.iter().find(|i| i.is_primary).unwrap();
    assert_eq!(primary.columns, vec!["id"]);
    let unique = indexes.iter().find(|i| i.name == "email_tenant").unwrap();
    assert!(unique.is_unique);
    assert_eq!(unique.columns, vec!["email", "tenant"]);

    adapter.disconnect().await
}

/// Test that the factory caches one live adapter per connection
#[tokio::test]
async fn test_mysql_factory_caches_live_adapter() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let factory = AdapterFactory::new();
    let config = config_for(&database_url);

    assert!(factory.test_connection(&config).await);
    assert!(factory.cached_keys().is_empty());

    let first = factory.get_adapter(&config).await?;
    let second = factory.get_adapter(&config).await?;
    assert!(Arc::ptr_eq(&first, &second));

    let result = factory.execute_query(&config, "SELECT 1 AS one", &[]).await?;
    assert_eq!(result.rows[0]["one"], json!(1));
    assert_eq!(factory.get_pool_statistics().total_queries, 1);

    assert!(factory.remove_adapter(&config.id).await);
    assert_eq!(first.state().await, AdapterState::Closed);

    Ok(())
}

/// Test empty result metadata, commented reads and pool wait exclusion
#[tokio::test]
async fn test_mysql_empty_results_and_execution_time() -> Result<()> {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let database_url = format!("mysql://root@localhost:{}/test", port);
    wait_for_mysql_ready(&database_url, 30).await?;

    let adapter = MySqlAdapter::new(config_for(&database_url).with_max_connections(1));
    adapter.connect().await?;
    adapter
        .execute_query(
            "CREATE TABLE audit (id INT PRIMARY KEY, event VARCHAR(50))",
            &[],
        )
        .await?;

    let empty = adapter
        .execute_query("SELECT id, event FROM audit WHERE id = ?", &[json!(1)])
        .await?;
    assert_eq!(empty.row_count, 0);
    assert!(empty.rows.is_empty());
    let names: Vec<&str> = empty.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["id", "event"]);
    assert_eq!(empty.fields[0].data_type, "INT");

    let commented = adapter
        .execute_query("/* dashboard */ SELECT COUNT(*) AS n FROM audit", &[])
        .await?;
    assert_eq!(commented.row_count, 1);
    assert_eq!(commented.rows[0]["n"], json!(0));
    assert_eq!(commented.affected_rows, None);

    // The single pooled connection is held by the sleeping query
    let slow = adapter.execute_query("SELECT SLEEP(1) AS slept", &[]);
    let queued = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        adapter.execute_query("SELECT 1 AS one", &[]).await
    };
    let (slow, queued) = tokio::join!(slow, queued);
    assert!(slow?.execution_time_ms >= 900);
    assert!(queued?.execution_time_ms < 500);

    adapter.disconnect().await?;
    Ok(())
}

/// Test that an unreachable server fails fast without caching
#[tokio::test]
async fn test_mysql_unreachable_server() {
    let config = ConnectionConfig::from_connection_string("mysql://root@127.0.0.1:1/test")
        .unwrap()
        .with_connect_timeout(Duration::from_secs(2));
    let factory = AdapterFactory::new();

    let Err(error) = factory.get_adapter(&config).await else {
        panic!("unreachable server should not connect");
    };
    assert!(error.is_connection_error());
    assert!(factory.cached_keys().is_empty());
    assert!(!factory.test_connection(&config).await);
}
