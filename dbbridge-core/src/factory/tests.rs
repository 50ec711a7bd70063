//! Factory tests against in-memory mock adapters.

use super::*;
use crate::adapters::{AdapterFeature, AdapterState};
use crate::dialect::{Dialect, dialect_for};
use crate::error::{DbBridgeError, ErrorKind};
use crate::models::{IndexInfo, Row, Statement, TableInfo, TableSchema};
use async_trait::async_trait;
use chrono::TimeDelta;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Switches shared by every mock adapter a builder creates.
#[derive(Debug)]
struct Behavior {
    fail_connect: AtomicBool,
    healthy: AtomicBool,
    connect_delay: Duration,
    built: AtomicUsize,
    disconnected: AtomicUsize,
    health_checks: AtomicUsize,
}

impl Behavior {
    fn new(connect_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            fail_connect: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            connect_delay,
            built: AtomicUsize::new(0),
            disconnected: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
        })
    }

    fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }

    fn disconnected(&self) -> usize {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }
}

struct MockBuilder(Arc<Behavior>);

impl AdapterBuilder for MockBuilder {
    fn build(&self, config: ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        config.validate()?;
        self.0.built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockAdapter {
            config,
            behavior: Arc::clone(&self.0),
            state: Mutex::new(AdapterState::Unconnected),
        }))
    }
}

struct MockAdapter {
    config: ConnectionConfig,
    behavior: Arc<Behavior>,
    state: Mutex<AdapterState>,
}

#[async_trait]
impl DatabaseAdapter for MockAdapter {
    fn engine_type(&self) -> EngineType {
        self.config.engine_type
    }

    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn dialect(&self) -> &'static dyn Dialect {
        dialect_for(self.config.engine_type)
    }

    async fn state(&self) -> AdapterState {
        *self.state.lock()
    }

    fn supports_feature(&self, _feature: AdapterFeature) -> bool {
        false
    }

    async fn connect(&self) -> Result<()> {
        tokio::time::sleep(self.behavior.connect_delay).await;
        if self.behavior.fail_connect.load(Ordering::SeqCst) {
            return Err(DbBridgeError::connection_failed(
                format!("Failed to connect to mock at {}", self.config),
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            ));
        }
        *self.state.lock() = AdapterState::Live;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state == AdapterState::Live {
            self.behavior.disconnected.fetch_add(1, Ordering::SeqCst);
        }
        *state = AdapterState::Closed;
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.behavior.health_checks.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() == AdapterState::Live && self.behavior.healthy.load(Ordering::SeqCst)
    }

    async fn execute_query(&self, text: &str, _params: &[Value]) -> Result<QueryResult> {
        if text.starts_with("FAIL") {
            return Err(DbBridgeError::statement_failed(
                "mock",
                std::io::Error::other("syntax error"),
            ));
        }
        Ok(QueryResult::read(Vec::new(), Vec::new(), Duration::ZERO))
    }

    async fn execute_transaction(&self, statements: &[Statement]) -> Result<Vec<QueryResult>> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.execute_query(&statement.text, &statement.params).await?);
        }
        Ok(results)
    }

    async fn get_databases(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(Vec::new())
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        Ok(TableSchema {
            table: table.to_string(),
            columns: Vec::new(),
            inferred: false,
        })
    }

    async fn get_indexes(&self, _table: &str) -> Result<Vec<IndexInfo>> {
        Ok(Vec::new())
    }

    async fn insert(&self, _table: &str, _data: &Row) -> Result<QueryResult> {
        Ok(QueryResult::write(1, None, Duration::ZERO))
    }

    async fn update(&self, _table: &str, _data: &Row, _filter: Option<&Row>) -> Result<QueryResult> {
        Ok(QueryResult::write(0, None, Duration::ZERO))
    }

    async fn delete(&self, _table: &str, _filter: Option<&Row>) -> Result<QueryResult> {
        Ok(QueryResult::write(0, None, Duration::ZERO))
    }
}

fn mock_factory(connect_delay: Duration) -> (AdapterFactory, Arc<Behavior>) {
    let behavior = Behavior::new(connect_delay);
    (
        AdapterFactory::with_builder(MockBuilder(Arc::clone(&behavior))),
        behavior,
    )
}

fn config(id: &str) -> ConnectionConfig {
    ConnectionConfig::new(EngineType::Document, "localhost").with_id(id)
}

fn same_adapter(a: &Arc<dyn DatabaseAdapter>, b: &Arc<dyn DatabaseAdapter>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Moves the key's last use `age` into the past.
fn backdate(factory: &AdapterFactory, key: &AdapterKey, age: TimeDelta) {
    let mut metrics = factory.metrics.lock();
    let entry = metrics.get_mut(key).unwrap();
    entry.last_used = Utc::now() - age;
}

// =============================================================================
// Adapter Key Tests
// =============================================================================

#[test]
fn test_adapter_key_display() {
    let key = AdapterKey::new(EngineType::Relational, "orders-db");
    assert_eq!(key.to_string(), "relational:orders-db");

    let key = AdapterKey::for_config(&config("events"));
    assert_eq!(key.to_string(), "document:events");
}

// =============================================================================
// Single-Flight Cache Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_share_one_adapter() {
    let (factory, behavior) = mock_factory(Duration::from_millis(50));
    let factory = Arc::new(factory);
    let config = config("shared");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let factory = Arc::clone(&factory);
        let config = config.clone();
        handles.push(tokio::spawn(
            async move { factory.get_adapter(&config).await },
        ));
    }

    let mut adapters = Vec::new();
    for handle in handles {
        adapters.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(behavior.built(), 1);
    assert!(adapters.iter().all(|a| same_adapter(a, &adapters[0])));
    assert_eq!(factory.cached_keys(), vec![AdapterKey::for_config(&config)]);
}

#[tokio::test]
async fn test_distinct_connections_get_distinct_adapters() {
    let (factory, behavior) = mock_factory(Duration::ZERO);

    let first = factory.get_adapter(&config("a")).await.unwrap();
    let second = factory.get_adapter(&config("b")).await.unwrap();
    let first_again = factory.get_adapter(&config("a")).await.unwrap();

    assert_eq!(behavior.built(), 2);
    assert!(!same_adapter(&first, &second));
    assert!(same_adapter(&first, &first_again));
}

#[tokio::test]
async fn test_stale_adapter_is_evicted_and_rebuilt() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let config = config("flaky");
    let key = AdapterKey::for_config(&config);

    let first = factory.get_adapter(&config).await.unwrap();
    factory.record_query(&config.id, config.engine_type);
    assert_eq!(factory.metrics(&key).unwrap().query_count, 1);

    behavior.healthy.store(false, Ordering::SeqCst);
    let second = factory.get_adapter(&config).await.unwrap();
    behavior.healthy.store(true, Ordering::SeqCst);

    assert_eq!(behavior.built(), 2);
    assert!(!same_adapter(&first, &second));
    assert_eq!(first.state().await, AdapterState::Closed);
    assert_eq!(behavior.disconnected(), 1);
    assert_eq!(factory.metrics(&key).unwrap().query_count, 0);

    let third = factory.get_adapter(&config).await.unwrap();
    assert!(same_adapter(&second, &third));
}

#[tokio::test]
async fn test_failed_connect_is_not_cached() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let config = config("down");

    behavior.fail_connect.store(true, Ordering::SeqCst);
    let Err(error) = factory.get_adapter(&config).await else {
        panic!("connect should fail");
    };
    assert_eq!(error.kind(), ErrorKind::Connection);
    assert!(factory.cached_keys().is_empty());
    assert!(factory.slots.lock().is_empty());
    assert_eq!(factory.get_pool_statistics().total_connections, 0);

    behavior.fail_connect.store(false, Ordering::SeqCst);
    factory.get_adapter(&config).await.unwrap();
    assert_eq!(behavior.built(), 2);
    assert_eq!(factory.get_pool_statistics().total_connections, 1);
}

#[tokio::test]
async fn test_invalid_config_never_builds() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let config = config("bad").with_max_connections(0);

    let Err(error) = factory.get_adapter(&config).await else {
        panic!("invalid config should be rejected");
    };
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert_eq!(behavior.built(), 0);
    assert!(factory.cached_keys().is_empty());
    assert!(factory.slots.lock().is_empty());
}

#[tokio::test]
async fn test_failed_connects_leave_no_slots() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    behavior.fail_connect.store(true, Ordering::SeqCst);

    for n in 0..50 {
        let config = config(&format!("down-{}", n));
        assert!(factory.get_adapter(&config).await.is_err());
    }

    assert_eq!(behavior.built(), 50);
    assert!(factory.cached_keys().is_empty());
    assert!(factory.slots.lock().is_empty());
    assert_eq!(factory.cleanup_idle_connections(Duration::ZERO).await, 0);
}

#[tokio::test]
async fn test_failed_rebuild_after_health_check_leaves_no_slot() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let config = config("flaky");
    let key = AdapterKey::for_config(&config);

    factory.get_adapter(&config).await.unwrap();
    behavior.healthy.store(false, Ordering::SeqCst);
    behavior.fail_connect.store(true, Ordering::SeqCst);

    assert!(factory.get_adapter(&config).await.is_err());
    assert!(factory.metrics(&key).is_none());
    assert!(factory.slots.lock().is_empty());
    assert_eq!(behavior.disconnected(), 1);
}

// =============================================================================
// Removal and Idle Cleanup Tests
// =============================================================================

#[tokio::test]
async fn test_remove_adapter() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let adapter = factory.get_adapter(&config("a")).await.unwrap();

    assert!(factory.remove_adapter("a").await);
    assert!(!factory.remove_adapter("a").await);
    assert!(factory.cached_keys().is_empty());
    assert_eq!(adapter.state().await, AdapterState::Closed);
    assert_eq!(behavior.disconnected(), 1);

    factory.get_adapter(&config("a")).await.unwrap();
    assert_eq!(behavior.built(), 2);
}

#[tokio::test]
async fn test_remove_all_adapters() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    for id in ["a", "b", "c"] {
        factory.get_adapter(&config(id)).await.unwrap();
    }

    factory.remove_all_adapters().await;

    assert!(factory.cached_keys().is_empty());
    assert_eq!(behavior.disconnected(), 3);
    assert_eq!(factory.get_pool_statistics(), PoolStatistics::default());
}

#[tokio::test]
async fn test_cleanup_idle_connections_evicts_only_idle_keys() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let mut adapters = Vec::new();
    for id in ["a", "b", "c"] {
        adapters.push(factory.get_adapter(&config(id)).await.unwrap());
    }
    backdate(&factory, &AdapterKey::for_config(&config("a")), TimeDelta::minutes(10));
    backdate(&factory, &AdapterKey::for_config(&config("b")), TimeDelta::minutes(2));

    let before = factory.get_pool_statistics().total_connections;
    let evicted = factory.cleanup_idle_connections(Duration::from_secs(60)).await;
    let after = factory.get_pool_statistics().total_connections;

    assert_eq!(evicted, 2);
    assert_eq!(before - after, evicted);
    assert_eq!(
        factory.cached_keys(),
        vec![AdapterKey::for_config(&config("c"))]
    );
    assert_eq!(adapters[0].state().await, AdapterState::Closed);
    assert_eq!(adapters[1].state().await, AdapterState::Closed);
    assert_eq!(adapters[2].state().await, AdapterState::Live);
    assert_eq!(behavior.disconnected(), 2);

    assert_eq!(factory.cleanup_idle_connections(Duration::from_secs(60)).await, 0);
}

#[tokio::test]
async fn test_reuse_refreshes_last_used() {
    let (factory, _behavior) = mock_factory(Duration::ZERO);
    let key = AdapterKey::for_config(&config("a"));

    factory.get_adapter(&config("a")).await.unwrap();
    backdate(&factory, &key, TimeDelta::minutes(10));
    factory.get_adapter(&config("a")).await.unwrap();

    assert_eq!(factory.cleanup_idle_connections(Duration::from_secs(60)).await, 0);
    assert_eq!(factory.cached_keys(), vec![key]);
}

// =============================================================================
// Metrics and Statistics Tests
// =============================================================================

#[tokio::test]
async fn test_pool_statistics_aggregate_metrics() {
    let (factory, _behavior) = mock_factory(Duration::ZERO);
    let relational = ConnectionConfig::new(EngineType::Relational, "localhost")
        .with_id("orders")
        .with_database("shop");
    factory.get_adapter(&relational).await.unwrap();
    factory.get_adapter(&config("events")).await.unwrap();
    factory.get_adapter(&config("audit")).await.unwrap();

    factory.record_query("orders", EngineType::Relational);
    factory.record_query("orders", EngineType::Relational);
    factory.record_query("events", EngineType::Document);
    factory.record_error("events", EngineType::Document);
    // Unknown keys are ignored
    factory.record_query("missing", EngineType::Document);
    backdate(&factory, &AdapterKey::for_config(&config("audit")), TimeDelta::minutes(6));

    let statistics = factory.get_pool_statistics();
    assert_eq!(statistics.total_connections, 3);
    assert_eq!(statistics.active_connections, 2);
    assert_eq!(statistics.connections_by_type[&EngineType::Relational], 1);
    assert_eq!(statistics.connections_by_type[&EngineType::Document], 2);
    assert_eq!(statistics.total_queries, 3);
    assert_eq!(statistics.total_errors, 1);
}

#[tokio::test]
async fn test_execute_query_records_outcome() {
    let (factory, _behavior) = mock_factory(Duration::ZERO);
    let config = config("reports");
    let key = AdapterKey::for_config(&config);

    factory.execute_query(&config, "SELECT * FROM t", &[]).await.unwrap();
    let error = factory
        .execute_query(&config, "FAIL please", &[])
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Statement);

    let metrics = factory.metrics(&key).unwrap();
    assert_eq!(metrics.query_count, 1);
    assert_eq!(metrics.error_count, 1);
    assert!(metrics.last_used >= metrics.created_at);
}

#[tokio::test]
async fn test_execute_on_held_adapter_skips_health_check() {
    let (factory, behavior) = mock_factory(Duration::ZERO);
    let config = config("cli");
    let key = AdapterKey::for_config(&config);

    let adapter = factory.get_adapter(&config).await.unwrap();
    assert_eq!(behavior.health_checks(), 0);

    factory
        .execute_on(adapter.as_ref(), "SELECT * FROM t", &[])
        .await
        .unwrap();
    assert!(factory.execute_on(adapter.as_ref(), "FAIL", &[]).await.is_err());

    assert_eq!(behavior.health_checks(), 0);
    let metrics = factory.metrics(&key).unwrap();
    assert_eq!(metrics.query_count, 1);
    assert_eq!(metrics.error_count, 1);

    factory.execute_query(&config, "SELECT 1", &[]).await.unwrap();
    assert_eq!(behavior.health_checks(), 1);
}

#[tokio::test]
async fn test_metrics_follow_cache_entries() {
    let (factory, _behavior) = mock_factory(Duration::ZERO);
    let key = AdapterKey::for_config(&config("a"));

    assert!(factory.metrics(&key).is_none());
    factory.get_adapter(&config("a")).await.unwrap();
    let metrics = factory.metrics(&key).unwrap();
    assert_eq!(metrics.query_count, 0);
    assert_eq!(metrics.created_at, metrics.last_used);

    factory.remove_adapter("a").await;
    assert!(factory.metrics(&key).is_none());
}

// =============================================================================
// Connection Test and Metadata Tests
// =============================================================================

#[tokio::test]
async fn test_test_connection_uses_throwaway_adapter() {
    let (factory, behavior) = mock_factory(Duration::ZERO);

    assert!(factory.test_connection(&config("ping-check")).await);
    assert!(factory.cached_keys().is_empty());
    assert_eq!(behavior.disconnected(), 1);

    behavior.fail_connect.store(true, Ordering::SeqCst);
    assert!(!factory.test_connection(&config("ping-check")).await);
    assert!(!factory.test_connection(&config("ping-check").with_max_connections(0)).await);
}

#[test]
fn test_engine_metadata() {
    let factory = AdapterFactory::new();

    assert_eq!(
        factory.get_supported_engine_types(),
        vec![EngineType::Relational, EngineType::Document]
    );
    assert_eq!(factory.get_default_port(EngineType::Relational), 3306);
    assert_eq!(factory.get_default_port(EngineType::Document), 27017);
}

#[test]
fn test_validate_connection_config() {
    let factory = AdapterFactory::new();

    let errors = factory.validate_connection_config(
        &ConnectionConfig::new(EngineType::Relational, "").with_port(0),
    );
    assert!(errors.contains(&"host is required".to_string()));
    assert!(errors.contains(&"database is required for relational connections".to_string()));
    assert!(errors.contains(&"port must be greater than 0".to_string()));

    assert!(factory.validate_connection_config(&config("ok")).is_empty());
}
