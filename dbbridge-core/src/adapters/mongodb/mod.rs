//! MongoDB database adapter.
//!
//! SQL-shaped text is run through the [`translator`](crate::translator) and
//! executed as native collection operations. Table introspection is inferred
//! from a bounded document sample.
//!
//! # Module Structure
//! - `connection`: Client options, connect ping and liveness check
//! - `convert`: BSON to JSON conversion
//! - `schema_inference`: Column layout inferred from sampled documents
//!
//! # Transactions
//! Multi-statement batches use a client session transaction, which requires
//! a replica set or sharded cluster. A standalone server rejects them and the
//! native error is returned as-is.

mod connection;
pub mod convert;
pub mod schema_inference;


use super::helpers::{AdapterState, ConnectionState};
use super::{AdapterFeature, ConnectionConfig, DatabaseAdapter};
use crate::Result;
use crate::dialect::{self, Dialect};
use crate::error::DbBridgeError;
use crate::models::*;
use crate::translator::{self, DocumentOperation, TranslatedQuery};
use async_trait::async_trait;
use connection::{MongoHandle, PingFailure};
use convert::{bson_to_json, document_to_row, row_to_document};
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::{ClientSession, Database, IndexModel};
use schema_inference::{SCHEMA_SAMPLE_SIZE, infer_schema, result_fields};
use serde_json::Value;
use std::time::Instant;
use tokio::sync::RwLock;

const ENGINE: &str = "MongoDB";

/// MongoDB database adapter
pub struct MongoAdapter {
    config: ConnectionConfig,
    state: RwLock<ConnectionState<MongoHandle>>,
}

impl std::fmt::Debug for MongoAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl MongoAdapter {
    /// Creates an unconnected adapter.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::new()),
        }
    }

    async fn handle(&self) -> Result<MongoHandle> {
        self.state.read().await.handle(ENGINE)
    }

    async fn run(&self, query: TranslatedQuery) -> Result<QueryResult> {
        let handle = self.handle().await?;
        run_operation(&handle.database(), query, None).await
    }

    async fn find_documents(
        database: &Database,
        collection: &str,
        filter: Document,
        limit: Option<i64>,
    ) -> Result<Vec<Document>> {
        let collection = database.collection::<Document>(collection);
        let mut find = collection.find(filter);
        if let Some(limit) = limit {
            find = find.limit(limit);
        }
        find.await
            .map_err(DbBridgeError::from_mongo)?
            .try_collect()
            .await
            .map_err(DbBridgeError::from_mongo)
    }
}

#[async_trait]
impl DatabaseAdapter for MongoAdapter {
    fn engine_type(&self) -> EngineType {
        EngineType::Document
    }

    fn connection_config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn dialect(&self) -> &'static dyn Dialect {
        dialect::dialect_for(EngineType::Document)
    }

    async fn state(&self) -> AdapterState {
        self.state.read().await.state()
    }

    fn supports_feature(&self, feature: AdapterFeature) -> bool {
        matches!(
            feature,
            AdapterFeature::Transactions
                | AdapterFeature::SchemaInference
                | AdapterFeature::QueryTranslation
        )
    }

    async fn connect(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if state.ready_to_connect(ENGINE)? {
            return Ok(());
        }

        tracing::info!("Connecting to MongoDB at {}", self.config);
        let handle = connection::open_client(&self.config)
            .await
            .inspect_err(|e| tracing::warn!("MongoDB connect to {} failed: {}", self.config, e))?;

        tracing::debug!(
            "MongoDB client ready for connection {} (database {})",
            self.config.id,
            handle.database
        );
        *state = ConnectionState::Live(handle);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let handle = self.state.write().await.close();
        if let Some(handle) = handle {
            handle.client.shutdown().await;
            tracing::info!("Closed MongoDB client for connection {}", self.config.id);
        }
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        let Ok(handle) = self.handle().await else {
            return false;
        };

        match connection::ping(&handle, self.config.connect_timeout).await {
            Ok(()) => true,
            Err(PingFailure::Driver(e)) => {
                tracing::debug!("MongoDB liveness check failed: {}", e);
                false
            }
            Err(PingFailure::Timeout) => {
                tracing::debug!("MongoDB liveness check timed out");
                false
            }
        }
    }

    async fn execute_query(&self, text: &str, params: &[Value]) -> Result<QueryResult> {
        let query = translator::translate(text, params)?;
        for warning in &query.warnings {
            tracing::warn!("Query on '{}': {}", query.collection, warning);
        }
        self.run(query).await
    }

    async fn execute_transaction(&self, statements: &[Statement]) -> Result<Vec<QueryResult>> {
        let handle = self.handle().await?;
        let database = handle.database();
        let mut session = handle
            .client
            .start_session()
            .await
            .map_err(DbBridgeError::from_mongo)?;
        session
            .start_transaction()
            .await
            .map_err(DbBridgeError::from_mongo)?;

        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            let outcome = match translator::translate(&statement.text, &statement.params) {
                Ok(query) => run_operation(&database, query, Some(&mut session)).await,
                Err(error) => Err(error),
            };

            match outcome {
                Ok(result) => results.push(result),
                Err(error) => {
                    if let Err(abort_error) = session.abort_transaction().await {
                        tracing::error!("MongoDB transaction abort failed: {}", abort_error);
                    }
                    tracing::warn!(
                        "MongoDB transaction aborted at statement {}: {}",
                        index,
                        error
                    );
                    return Err(DbBridgeError::transaction_aborted(index, error));
                }
            }
        }

        session
            .commit_transaction()
            .await
            .map_err(DbBridgeError::from_mongo)?;
        Ok(results)
    }

    async fn get_databases(&self) -> Result<Vec<String>> {
        let handle = self.handle().await?;
        handle
            .client
            .list_database_names()
            .await
            .map_err(DbBridgeError::from_mongo)
    }

    async fn get_tables(&self) -> Result<Vec<TableInfo>> {
        let handle = self.handle().await?;
        let database = handle.database();
        let mut names = database
            .list_collection_names()
            .await
            .map_err(DbBridgeError::from_mongo)?;
        names.sort();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            // Views reject count commands; the estimate is optional
            let row_count = database
                .collection::<Document>(&name)
                .estimated_document_count()
                .await
                .ok();
            tables.push(TableInfo {
                name,
                schema: Some(handle.database.clone()),
                table_type: "collection".to_string(),
                row_count,
            });
        }

        Ok(tables)
    }

    async fn get_table_schema(&self, table: &str) -> Result<TableSchema> {
        let handle = self.handle().await?;
        let sample = Self::find_documents(
            &handle.database(),
            table,
            Document::new(),
            Some(SCHEMA_SAMPLE_SIZE),
        )
        .await?;

        tracing::debug!(
            "Inferring schema of '{}' from {} sampled document(s)",
            table,
            sample.len()
        );
        Ok(infer_schema(table, &sample))
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let handle = self.handle().await?;
        let models: Vec<IndexModel> = handle
            .database()
            .collection::<Document>(table)
            .list_indexes()
            .await
            .map_err(DbBridgeError::from_mongo)?
            .try_collect()
            .await
            .map_err(DbBridgeError::from_mongo)?;

        Ok(models.into_iter().map(index_info).collect())
    }

    async fn insert(&self, table: &str, data: &Row) -> Result<QueryResult> {
        if data.is_empty() {
            return Err(DbBridgeError::configuration(format!(
                "insert into '{}' needs at least one field",
                table
            )));
        }
        self.run(TranslatedQuery {
            collection: table.to_string(),
            operation: DocumentOperation::InsertOne {
                document: data.clone(),
            },
            warnings: Vec::new(),
        })
        .await
    }

    async fn update(&self, table: &str, data: &Row, filter: Option<&Row>) -> Result<QueryResult> {
        if data.is_empty() {
            return Err(DbBridgeError::configuration(format!(
                "update of '{}' needs at least one field to set",
                table
            )));
        }

        let mut update = Row::new();
        update.insert("$set".to_string(), Value::Object(data.clone()));
        self.run(TranslatedQuery {
            collection: table.to_string(),
            operation: DocumentOperation::UpdateMany {
                filter: filter.cloned().unwrap_or_default(),
                update,
            },
            warnings: Vec::new(),
        })
        .await
    }

    async fn delete(&self, table: &str, filter: Option<&Row>) -> Result<QueryResult> {
        self.run(TranslatedQuery {
            collection: table.to_string(),
            operation: DocumentOperation::DeleteMany {
                filter: filter.cloned().unwrap_or_default(),
            },
            warnings: Vec::new(),
        })
        .await
    }
}

/// Executes one translated operation, inside `session` when given.
async fn run_operation(
    database: &Database,
    query: TranslatedQuery,
    session: Option<&mut ClientSession>,
) -> Result<QueryResult> {
    let collection = database.collection::<Document>(&query.collection);
    let started = Instant::now();

    let result = match query.operation {
        DocumentOperation::Find {
            filter,
            skip,
            limit,
        } => {
            let mut find = collection.find(row_to_document(&filter)?);
            if let Some(skip) = skip {
                find = find.skip(skip);
            }
            if let Some(limit) = limit {
                find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
            }

            let documents: Vec<Document> = match session {
                Some(session) => {
                    let mut cursor = find
                        .session(&mut *session)
                        .await
                        .map_err(DbBridgeError::from_mongo)?;
                    let mut documents = Vec::new();
                    while cursor
                        .advance(session)
                        .await
                        .map_err(DbBridgeError::from_mongo)?
                    {
                        documents.push(
                            cursor
                                .deserialize_current()
                                .map_err(DbBridgeError::from_mongo)?,
                        );
                    }
                    documents
                }
                None => find
                    .await
                    .map_err(DbBridgeError::from_mongo)?
                    .try_collect()
                    .await
                    .map_err(DbBridgeError::from_mongo)?,
            };

            let elapsed = started.elapsed();
            let fields = result_fields(&documents);
            let rows = documents.iter().map(document_to_row).collect();
            QueryResult::read(rows, fields, elapsed)
        }
        DocumentOperation::InsertOne { document } => {
            let document = row_to_document(&document)?;
            let action = collection.insert_one(document);
            let inserted = match session {
                Some(session) => action.session(session).await,
                None => action.await,
            }
            .map_err(DbBridgeError::from_mongo)?;
            QueryResult::write(1, Some(bson_to_json(&inserted.inserted_id)), started.elapsed())
        }
        DocumentOperation::UpdateMany { filter, update } => {
            let action =
                collection.update_many(row_to_document(&filter)?, row_to_document(&update)?);
            let updated = match session {
                Some(session) => action.session(session).await,
                None => action.await,
            }
            .map_err(DbBridgeError::from_mongo)?;
            QueryResult::write(updated.modified_count, None, started.elapsed())
        }
        DocumentOperation::DeleteMany { filter } => {
            let action = collection.delete_many(row_to_document(&filter)?);
            let deleted = match session {
                Some(session) => action.session(session).await,
                None => action.await,
            }
            .map_err(DbBridgeError::from_mongo)?;
            QueryResult::write(deleted.deleted_count, None, started.elapsed())
        }
    };

    Ok(result.with_warnings(query.warnings))
}

/// Maps a native index description.
fn index_info(model: IndexModel) -> IndexInfo {
    let options = model.options.unwrap_or_default();
    let name = options.name.unwrap_or_else(|| {
        model
            .keys
            .iter()
            .map(|(key, direction)| match direction {
                Bson::String(kind) => format!("{}_{}", key, kind),
                other => format!("{}_{}", key, bson_to_json(other)),
            })
            .collect::<Vec<_>>()
            .join("_")
    });
    let is_primary = name == "_id_";
    let index_type = model.keys.values().find_map(|direction| match direction {
        Bson::String(kind) => Some(kind.clone()),
        _ => None,
    });

    IndexInfo {
        columns: model.keys.keys().cloned().collect(),
        is_unique: is_primary || options.unique.unwrap_or(false),
        is_primary,
        index_type,
        name,
    }
}
