//! Normalized data structures returned by every adapter.
//!
//! Relational and document engines fill these shapes identically so callers
//! never branch on the native result format.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One row or document, keyed by field name in result order.
pub type Row = Map<String, Value>;

/// The two families of backend engine an adapter can speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineType {
    /// Tabular, transactional SQL engine (MySQL)
    #[serde(alias = "mysql", alias = "sql")]
    Relational,
    /// Schema-less collection engine (MongoDB)
    #[serde(alias = "mongodb", alias = "mongo")]
    Document,
}

impl EngineType {
    /// All engine types, in the order they are advertised to callers.
    pub const ALL: [Self; 2] = [Self::Relational, Self::Document];

    /// Stable lowercase name used in adapter keys and serialized configs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Relational => "relational",
            Self::Document => "document",
        }
    }

    /// Port used when a config does not name one.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Relational => 3306,
            Self::Document => 27017,
        }
    }

    /// Human-readable name of the concrete engine behind this type.
    pub const fn engine_name(self) -> &'static str {
        match self {
            Self::Relational => "MySQL",
            Self::Document => "MongoDB",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = crate::DbBridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relational" | "mysql" | "sql" => Ok(Self::Relational),
            "document" | "mongodb" | "mongo" => Ok(Self::Document),
            other => Err(crate::DbBridgeError::configuration(format!(
                "Unsupported engine type: {}",
                other
            ))),
        }
    }
}

/// Column or field descriptor attached to a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    /// Declared type for relational columns, inferred BSON type for documents
    pub data_type: String,
}

/// Normalized result of executing one statement.
///
/// For reads `row_count == rows.len()` and `affected_rows` is `None`.
/// For writes `rows` is empty and `row_count == affected_rows`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub fields: Vec<FieldInfo>,
    /// Wall-clock time spent in the native call
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    /// Auto-increment id (relational) or inserted `_id` (document)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<Value>,
    /// Approximations applied while executing, e.g. an untranslated WHERE clause
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl QueryResult {
    /// Builds the result of a read statement.
    pub fn read(rows: Vec<Row>, fields: Vec<FieldInfo>, elapsed: Duration) -> Self {
        Self {
            row_count: rows.len() as u64,
            rows,
            fields,
            execution_time_ms: duration_ms(elapsed),
            affected_rows: None,
            insert_id: None,
            warnings: Vec::new(),
        }
    }

    /// Builds the result of a mutation.
    pub fn write(affected_rows: u64, insert_id: Option<Value>, elapsed: Duration) -> Self {
        Self {
            rows: Vec::new(),
            row_count: affected_rows,
            fields: Vec::new(),
            execution_time_ms: duration_ms(elapsed),
            affected_rows: Some(affected_rows),
            insert_id,
            warnings: Vec::new(),
        }
    }

    /// Attaches approximation warnings.
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// True when this result came from a mutation.
    pub const fn is_write(&self) -> bool {
        self.affected_rows.is_some()
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// A statement plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Statement {
    /// Creates a statement without parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Creates a statement with positional parameters.
    pub fn with_params(text: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// A table or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// Owning database/schema when the engine reports one
    pub schema: Option<String>,
    /// "table", "view" or "collection"
    pub table_type: String,
    /// Engine estimate; not an exact count
    pub row_count: Option<u64>,
}

/// Column metadata, declared or inferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    /// Engine extras such as `auto_increment`
    pub extra: Option<String>,
    pub comment: Option<String>,
}

/// Column layout of one table or collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    /// True when the layout was inferred from sampled documents rather than
    /// read from a declared schema
    pub inferred: bool,
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Indexed columns in key order
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: Option<String>,
}

/// Engine-neutral column definition consumed by `Dialect::create_table_syntax`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Generic type name such as `string`, `integer` or `datetime`
    pub data_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    /// Raw default expression, emitted as-is
    #[serde(default)]
    pub default: Option<String>,
}

const fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    /// Creates a nullable column of the given generic type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            auto_increment: false,
            default: None,
        }
    }

    /// Marks the column as primary key (and therefore NOT NULL).
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column as auto-incrementing.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Marks the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets a raw default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Snapshot of a native connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Number of idle connections ready to be used
    pub idle_connections: u32,
    /// Number of connections currently in use
    pub active_connections: u32,
    /// Total number of connections in the pool
    pub total_connections: u32,
    /// Maximum allowed connections (from configuration)
    pub max_connections: u32,
}

/// Aggregate statistics over every adapter cached by the factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatistics {
    pub total_connections: usize,
    /// Cached adapters used within the activity window
    pub active_connections: usize,
    pub connections_by_type: BTreeMap<EngineType, usize>,
    pub total_queries: u64,
    pub total_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_result_counts_rows() {
        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        let result = QueryResult::read(vec![row.clone(), row], Vec::new(), Duration::from_millis(3));

        assert_eq!(result.row_count, 2);
        assert_eq!(result.row_count, result.rows.len() as u64);
        assert!(result.affected_rows.is_none());
        assert!(!result.is_write());
        assert_eq!(result.execution_time_ms, 3);
    }

    #[test]
    fn test_write_result_counts_affected_rows() {
        let result = QueryResult::write(5, Some(json!(42)), Duration::ZERO);

        assert_eq!(result.row_count, 5);
        assert_eq!(result.affected_rows, Some(5));
        assert!(result.rows.is_empty());
        assert_eq!(result.insert_id, Some(json!(42)));
    }

    #[test]
    fn test_write_result_serialization_skips_empty_parts() {
        let result = QueryResult::write(1, None, Duration::ZERO);
        let value = serde_json::to_value(&result).unwrap();

        assert!(value.get("insert_id").is_none());
        assert!(value.get("warnings").is_none());
        assert_eq!(value["affected_rows"], json!(1));
    }

    #[test]
    fn test_engine_type_parsing() {
        assert_eq!("mysql".parse::<EngineType>().unwrap(), EngineType::Relational);
        assert_eq!("Document".parse::<EngineType>().unwrap(), EngineType::Document);
        assert!("oracle".parse::<EngineType>().is_err());

        let engine: EngineType = serde_json::from_value(json!("mongodb")).unwrap();
        assert_eq!(engine, EngineType::Document);
        assert_eq!(serde_json::to_value(engine).unwrap(), json!("document"));
    }

    #[test]
    fn test_engine_default_ports() {
        assert_eq!(EngineType::Relational.default_port(), 3306);
        assert_eq!(EngineType::Document.default_port(), 27017);
    }

    #[test]
    fn test_column_definition_deserialize_defaults() {
        let column: ColumnDefinition =
            serde_json::from_value(json!({"name": "email", "data_type": "string"})).unwrap();

        assert!(column.nullable);
        assert!(!column.primary_key);
        assert!(column.default.is_none());
    }
}
