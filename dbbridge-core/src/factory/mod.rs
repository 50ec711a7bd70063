//! Adapter factory: per-connection adapter cache with health checks,
//! idle eviction and usage metrics.
//!
//! The factory is an explicitly constructed object. Callers create one per
//! process (or per test) and share it through an `Arc`.
//!
//! # Caching
//! Adapters are cached under an [`AdapterKey`] derived from the config's
//! engine type and connection id. Each key owns a slot behind its own async
//! mutex, so at most one adapter is connecting for a key at any time and
//! concurrent callers for that key wait for the same creation. Requests for
//! different keys never block each other.
//!
//! Metrics entries are inserted and removed only while the key's slot lock
//! is held, which keeps them in lockstep with the cached adapters.
//!
//! # Eviction
//! Evicting an entry only removes it from the cache. Callers that already
//! hold the `Arc` keep using it until their request completes.

use crate::Result;
use crate::adapters::{ConnectionConfig, DatabaseAdapter, create_adapter};
use crate::models::{EngineType, PoolStatistics, QueryResult};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod metrics;

pub use metrics::ConnectionMetrics;

/// Window within which a cached adapter counts as active in statistics.
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Cache identity of an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterKey {
    pub engine_type: EngineType,
    pub connection_id: String,
}

impl AdapterKey {
    pub fn new(engine_type: EngineType, connection_id: impl Into<String>) -> Self {
        Self {
            engine_type,
            connection_id: connection_id.into(),
        }
    }

    pub fn for_config(config: &ConnectionConfig) -> Self {
        Self::new(config.engine_type, config.id.clone())
    }
}

impl fmt::Display for AdapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.engine_type, self.connection_id)
    }
}

/// Constructs unconnected adapters for the factory.
pub trait AdapterBuilder: Send + Sync {
    /// Builds an adapter for `config` without connecting it.
    ///
    /// # Errors
    /// Returns a configuration error when no adapter can be built.
    fn build(&self, config: ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>>;
}

/// Builds the compiled-in engine adapters via [`create_adapter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineAdapterBuilder;

impl AdapterBuilder for EngineAdapterBuilder {
    fn build(&self, config: ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        create_adapter(config)
    }
}

enum Slot {
    Empty,
    Ready(Arc<dyn DatabaseAdapter>),
}

type SlotCell = Arc<tokio::sync::Mutex<Slot>>;

/// Cache of live adapters keyed by engine type and connection id.
pub struct AdapterFactory {
    builder: Box<dyn AdapterBuilder>,
    slots: Mutex<HashMap<AdapterKey, SlotCell>>,
    metrics: Mutex<HashMap<AdapterKey, ConnectionMetrics>>,
}

impl Default for AdapterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdapterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterFactory")
            .field("cached", &self.cached_keys())
            .finish_non_exhaustive()
    }
}

impl AdapterFactory {
    /// Creates a factory that builds the compiled-in engine adapters.
    pub fn new() -> Self {
        Self::with_builder(EngineAdapterBuilder)
    }

    /// Creates a factory with a custom adapter builder.
    pub fn with_builder(builder: impl AdapterBuilder + 'static) -> Self {
        Self {
            builder: Box::new(builder),
            slots: Mutex::new(HashMap::new()),
            metrics: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a live adapter for `config`, connecting one if needed.
    ///
    /// A cached adapter is health-checked first; if the check fails it is
    /// evicted and a new adapter is built. Connect failures are returned to
    /// the caller and nothing is cached.
    ///
    /// # Errors
    /// - `Configuration` when the config is invalid or its engine is not compiled in
    /// - `Connection` when the new adapter cannot connect
    pub async fn get_adapter(&self, config: &ConnectionConfig) -> Result<Arc<dyn DatabaseAdapter>> {
        let key = AdapterKey::for_config(config);

        loop {
            let cell = self.slot_cell(&key);
            let mut slot = cell.lock().await;
            if !self.is_current(&key, &cell) {
                // Removed while we waited; retry against the new slot.
                continue;
            }

            if let Slot::Ready(adapter) = &*slot {
                let adapter = Arc::clone(adapter);
                if let Some(metrics) = self.metrics.lock().get_mut(&key) {
                    metrics.touch(Utc::now());
                }

                if adapter.test_connection().await {
                    tracing::debug!(key = %key, "Reusing cached adapter");
                    return Ok(adapter);
                }

                tracing::warn!(key = %key, "Cached adapter failed its health check, rebuilding");
                *slot = Slot::Empty;
                self.metrics.lock().remove(&key);
                disconnect_quietly(&key, adapter).await;
            }

            let adapter = match self.builder.build(config.clone()) {
                Ok(adapter) => adapter,
                Err(error) => {
                    self.release_empty_slot(&key, &cell);
                    return Err(error);
                }
            };
            tracing::info!(key = %key, engine = %config.engine_type, "Creating adapter for {}", config);

            return match adapter.connect().await {
                Ok(()) => {
                    self.metrics
                        .lock()
                        .insert(key.clone(), ConnectionMetrics::new(Utc::now()));
                    *slot = Slot::Ready(Arc::clone(&adapter));
                    Ok(adapter)
                }
                Err(error) => {
                    self.release_empty_slot(&key, &cell);
                    tracing::warn!(key = %key, "Adapter failed to connect: {}", error);
                    Err(error)
                }
            };
        }
    }

    /// Checks whether `config` can connect, using a throwaway adapter.
    ///
    /// Never fails; any error is logged and reported as `false`.
    pub async fn test_connection(&self, config: &ConnectionConfig) -> bool {
        let adapter = match self.builder.build(config.clone()) {
            Ok(adapter) => adapter,
            Err(e) => {
                tracing::debug!("Connection test for {} rejected: {}", config, e);
                return false;
            }
        };

        let reachable = match adapter.connect().await {
            Ok(()) => adapter.test_connection().await,
            Err(e) => {
                tracing::debug!("Connection test for {} failed: {}", config, e);
                false
            }
        };

        if let Err(e) = adapter.disconnect().await {
            tracing::warn!("Failed to close test connection to {}: {}", config, e);
        }
        reachable
    }

    /// Evicts and disconnects the adapters cached for `connection_id` under
    /// every engine type.
    ///
    /// Returns whether anything was evicted.
    pub async fn remove_adapter(&self, connection_id: &str) -> bool {
        let mut removed = false;
        for engine_type in EngineType::ALL {
            let key = AdapterKey::new(engine_type, connection_id);
            if let Some(adapter) = self.evict(&key, |_| true).await {
                disconnect_quietly(&key, adapter).await;
                removed = true;
            }
        }
        removed
    }

    /// Evicts and disconnects every cached adapter.
    pub async fn remove_all_adapters(&self) {
        let keys: Vec<AdapterKey> = self.slots.lock().keys().cloned().collect();
        for key in keys {
            if let Some(adapter) = self.evict(&key, |_| true).await {
                disconnect_quietly(&key, adapter).await;
            }
        }
        tracing::info!("Removed all cached adapters");
    }

    /// Evicts adapters unused for longer than `idle_timeout`.
    ///
    /// Idleness is checked again under the key's lock, so an adapter handed
    /// out while the scan ran is kept. Returns the number evicted.
    pub async fn cleanup_idle_connections(&self, idle_timeout: Duration) -> usize {
        let now = Utc::now();
        let candidates: Vec<AdapterKey> = self
            .metrics
            .lock()
            .iter()
            .filter(|(_, metrics)| metrics.is_idle(now, idle_timeout))
            .map(|(key, _)| key.clone())
            .collect();

        let mut evicted = 0_usize;
        for key in candidates {
            let evicted_adapter = self
                .evict(&key, |metrics| {
                    metrics.is_some_and(|m| m.is_idle(now, idle_timeout))
                })
                .await;
            if let Some(adapter) = evicted_adapter {
                tracing::info!(key = %key, "Evicted idle adapter");
                disconnect_quietly(&key, adapter).await;
                evicted = evicted.saturating_add(1);
            }
        }

        if evicted > 0 {
            tracing::debug!("Idle cleanup evicted {} adapter(s)", evicted);
        }
        evicted
    }

    /// Counts a successful query against a cached adapter.
    pub fn record_query(&self, connection_id: &str, engine_type: EngineType) {
        let key = AdapterKey::new(engine_type, connection_id);
        if let Some(metrics) = self.metrics.lock().get_mut(&key) {
            metrics.record_query(Utc::now());
        }
    }

    /// Counts a failed query against a cached adapter.
    pub fn record_error(&self, connection_id: &str, engine_type: EngineType) {
        let key = AdapterKey::new(engine_type, connection_id);
        if let Some(metrics) = self.metrics.lock().get_mut(&key) {
            metrics.record_error(Utc::now());
        }
    }

    /// Aggregates the metrics of every cached adapter.
    pub fn get_pool_statistics(&self) -> PoolStatistics {
        let now = Utc::now();
        let metrics = self.metrics.lock();
        let mut statistics = PoolStatistics {
            total_connections: metrics.len(),
            ..PoolStatistics::default()
        };

        for (key, entry) in metrics.iter() {
            if entry.is_active(now, ACTIVE_WINDOW) {
                statistics.active_connections = statistics.active_connections.saturating_add(1);
            }
            let by_type = statistics
                .connections_by_type
                .entry(key.engine_type)
                .or_insert(0);
            *by_type = by_type.saturating_add(1);
            statistics.total_queries = statistics.total_queries.saturating_add(entry.query_count);
            statistics.total_errors = statistics.total_errors.saturating_add(entry.error_count);
        }

        statistics
    }

    /// Engine types this factory can build adapters for.
    pub fn get_supported_engine_types(&self) -> Vec<EngineType> {
        EngineType::ALL.to_vec()
    }

    /// Default server port for `engine_type`.
    pub const fn get_default_port(&self, engine_type: EngineType) -> u16 {
        engine_type.default_port()
    }

    /// Every problem with `config`; empty when valid.
    pub fn validate_connection_config(&self, config: &ConnectionConfig) -> Vec<String> {
        config.validation_errors()
    }

    /// Keys of the cached adapters, sorted.
    pub fn cached_keys(&self) -> Vec<AdapterKey> {
        let mut keys: Vec<AdapterKey> = self.metrics.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Snapshot of the metrics recorded for `key`.
    pub fn metrics(&self, key: &AdapterKey) -> Option<ConnectionMetrics> {
        self.metrics.lock().get(key).copied()
    }

    /// Runs one statement through the cached adapter for `config`, recording
    /// the outcome in the adapter's metrics.
    ///
    /// # Errors
    /// Returns the error from [`Self::get_adapter`] or from the query itself.
    pub async fn execute_query(
        &self,
        config: &ConnectionConfig,
        text: &str,
        params: &[Value],
    ) -> Result<QueryResult> {
        let adapter = self.get_adapter(config).await?;
        self.execute_on(adapter.as_ref(), text, params).await
    }

    /// Runs one statement on an adapter the caller already obtained from
    /// [`Self::get_adapter`], recording the outcome without another lookup.
    ///
    /// # Errors
    /// Returns the query's error.
    pub async fn execute_on(
        &self,
        adapter: &dyn DatabaseAdapter,
        text: &str,
        params: &[Value],
    ) -> Result<QueryResult> {
        let config = adapter.connection_config();
        let key = AdapterKey::for_config(config);
        let started = Instant::now();
        let result = adapter.execute_query(text, params).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(_) => {
                tracing::debug!(key = %key, elapsed_ms, "Query completed");
                self.record_query(&config.id, config.engine_type);
            }
            Err(e) => {
                tracing::debug!(key = %key, elapsed_ms, "Query failed: {}", e);
                self.record_error(&config.id, config.engine_type);
            }
        }
        result
    }

    /// Returns the slot for `key`, creating an empty one if needed.
    fn slot_cell(&self, key: &AdapterKey) -> SlotCell {
        Arc::clone(
            self.slots
                .lock()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Slot::Empty))),
        )
    }

    fn is_current(&self, key: &AdapterKey, cell: &SlotCell) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
    }

    /// Drops the map entry of a slot left empty by a failed build or connect.
    ///
    /// Must be called with the slot lock held. Waiters on the dropped cell
    /// see it is no longer current and retry with a fresh slot.
    fn release_empty_slot(&self, key: &AdapterKey, cell: &SlotCell) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, cell)) {
            slots.remove(key);
        }
    }

    /// Removes the entry for `key` when `should_evict` accepts its metrics.
    ///
    /// The slot and metrics are removed under the slot lock; the returned
    /// adapter is disconnected by the caller after all locks are released.
    async fn evict(
        &self,
        key: &AdapterKey,
        should_evict: impl Fn(Option<&ConnectionMetrics>) -> bool,
    ) -> Option<Arc<dyn DatabaseAdapter>> {
        let cell = self.slots.lock().get(key).cloned()?;
        let mut slot = cell.lock().await;
        if !self.is_current(key, &cell) || !should_evict(self.metrics.lock().get(key)) {
            return None;
        }

        let adapter = match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Ready(adapter) => Some(adapter),
            Slot::Empty => None,
        };
        self.metrics.lock().remove(key);
        self.slots.lock().remove(key);
        adapter
    }
}

async fn disconnect_quietly(key: &AdapterKey, adapter: Arc<dyn DatabaseAdapter>) {
    if let Err(e) = adapter.disconnect().await {
        tracing::warn!(key = %key, "Failed to disconnect adapter: {}", e);
    }
}

#[cfg(test)]
mod tests;
