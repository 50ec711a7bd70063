//! Statement execution and row conversion for MySQL.

use crate::Result;
use crate::dialect::Dialect;
use crate::error::DbBridgeError;
use crate::models::{FieldInfo, QueryResult, Row};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use sqlx::mysql::{MySqlArguments, MySqlColumn, MySqlConnection, MySqlRow};
use sqlx::{Column, MySql, Row as _, Statement as _, TypeInfo, ValueRef};
use std::time::Instant;

type MySqlQuery<'q> = sqlx::query::Query<'q, MySql, MySqlArguments>;

/// Statements that return a result set.
const READ_KEYWORDS: &[&str] = &[
    "SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH", "VALUES", "TABLE",
];

/// True when the statement produces rows rather than an affected count.
pub(super) fn is_read_statement(text: &str) -> bool {
    let keyword = skip_leading_comments(text)
        .trim_start_matches('(')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    READ_KEYWORDS.contains(&keyword.as_str())
}

/// Skips whitespace and `/* */`, `--` and `#` comments before the first token.
fn skip_leading_comments(text: &str) -> &str {
    let mut rest = text.trim_start();
    loop {
        if let Some(block) = rest.strip_prefix("/*") {
            // Unterminated block comments swallow the statement
            rest = block.split_once("*/").map_or("", |(_, after)| after);
        } else if rest.starts_with("--") || rest.starts_with('#') {
            rest = rest.split_once('\n').map_or("", |(_, after)| after);
        } else {
            return rest;
        }
        rest = rest.trim_start();
    }
}

/// Builds a parameterized single-row INSERT.
pub(super) fn insert_statement(
    dialect: &dyn Dialect,
    table: &str,
    data: &Row,
) -> Result<(String, Vec<Value>)> {
    if data.is_empty() {
        return Err(DbBridgeError::configuration(format!(
            "INSERT into '{}' needs at least one column",
            table
        )));
    }

    let columns: Vec<String> = data.keys().map(|k| dialect.quote_identifier(k)).collect();
    let placeholders = vec!["?"; data.len()].join(", ");
    let text = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote_identifier(table),
        columns.join(", "),
        placeholders
    );
    Ok((text, data.values().cloned().collect()))
}

/// Builds a parameterized UPDATE; `None` or an empty filter updates every row.
pub(super) fn update_statement(
    dialect: &dyn Dialect,
    table: &str,
    data: &Row,
    filter: Option<&Row>,
) -> Result<(String, Vec<Value>)> {
    if data.is_empty() {
        return Err(DbBridgeError::configuration(format!(
            "UPDATE of '{}' needs at least one column to set",
            table
        )));
    }

    let assignments: Vec<String> = data
        .keys()
        .map(|k| format!("{} = ?", dialect.quote_identifier(k)))
        .collect();
    let mut params: Vec<Value> = data.values().cloned().collect();
    let mut text = format!(
        "UPDATE {} SET {}",
        dialect.quote_identifier(table),
        assignments.join(", ")
    );
    text.push_str(&where_clause(dialect, filter, &mut params));
    Ok((text, params))
}

/// Builds a parameterized DELETE; `None` or an empty filter deletes every row.
pub(super) fn delete_statement(
    dialect: &dyn Dialect,
    table: &str,
    filter: Option<&Row>,
) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let mut text = format!("DELETE FROM {}", dialect.quote_identifier(table));
    text.push_str(&where_clause(dialect, filter, &mut params));
    (text, params)
}

/// Equality conjunction over the filter; JSON null matches `IS NULL`.
fn where_clause(dialect: &dyn Dialect, filter: Option<&Row>, params: &mut Vec<Value>) -> String {
    let Some(filter) = filter.filter(|f| !f.is_empty()) else {
        return String::new();
    };

    let conditions: Vec<String> = filter
        .iter()
        .map(|(column, value)| {
            let column = dialect.quote_identifier(column);
            if value.is_null() {
                format!("{} IS NULL", column)
            } else {
                params.push(value.clone());
                format!("{} = ?", column)
            }
        })
        .collect();
    format!(" WHERE {}", conditions.join(" AND "))
}

/// Binds one JSON parameter to the next `?` placeholder.
pub(super) fn bind_value<'q>(query: MySqlQuery<'q>, value: &Value) -> MySqlQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(u) = n.as_u64() {
                query.bind(u)
            } else {
                query.bind(n.as_f64())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
    }
}

/// Runs one statement on an acquired connection (pooled or inside an open
/// transaction). Execution time excludes waiting for the connection.
pub(super) async fn run_statement(
    conn: &mut MySqlConnection,
    text: &str,
    params: &[Value],
) -> Result<QueryResult> {
    let query = params
        .iter()
        .fold(sqlx::query(text), |query, value| bind_value(query, value));
    let started = Instant::now();

    if is_read_statement(text) {
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(DbBridgeError::from_sqlx)?;
        let elapsed = started.elapsed();
        let fields = match rows.first() {
            Some(row) => fields_of(row.columns()),
            None => described_fields(conn, text).await,
        };
        let rows = rows.iter().map(row_to_json).collect();
        Ok(QueryResult::read(rows, fields, elapsed))
    } else {
        let done = query
            .execute(&mut *conn)
            .await
            .map_err(DbBridgeError::from_sqlx)?;
        let insert_id = match done.last_insert_id() {
            0 => None,
            id => Some(Value::from(id)),
        };
        Ok(QueryResult::write(
            done.rows_affected(),
            insert_id,
            started.elapsed(),
        ))
    }
}

/// Column layout of an empty result set, read from the prepared statement.
async fn described_fields(conn: &mut MySqlConnection, text: &str) -> Vec<FieldInfo> {
    match sqlx::Executor::prepare(&mut *conn, text).await {
        Ok(statement) => fields_of(statement.columns()),
        Err(e) => {
            tracing::debug!("Could not describe empty MySQL result set: {}", e);
            Vec::new()
        }
    }
}

fn fields_of(columns: &[MySqlColumn]) -> Vec<FieldInfo> {
    columns
        .iter()
        .map(|column| FieldInfo {
            name: column.name().to_string(),
            data_type: column.type_info().name().to_string(),
        })
        .collect()
}

/// Converts a MySQL row into a JSON object keyed by column name.
pub(super) fn row_to_json(row: &MySqlRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let value = column_value(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

/// Decodes one column by its reported type name.
///
/// DECIMAL keeps its exact text, binary columns become base64 and temporal
/// values are rendered as ISO-8601 strings.
fn column_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let decoded = match type_name {
        "BOOLEAN" => row.try_get::<bool, _>(index).ok().map(Value::Bool),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            row.try_get::<i64, _>(index).ok().map(Value::from)
        }
        t if t.ends_with(" UNSIGNED") => row.try_get::<u64, _>(index).ok().map(Value::from),
        "YEAR" | "BIT" => row.try_get_unchecked::<u64, _>(index).ok().map(Value::from),
        "FLOAT" => row
            .try_get::<f32, _>(index)
            .ok()
            .map(|f| float_value(f64::from(f))),
        "DOUBLE" => row.try_get::<f64, _>(index).ok().map(float_value),
        "DECIMAL" => row
            .try_get_unchecked::<String, _>(index)
            .ok()
            .map(Value::String),
        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(index)
            .ok()
            .map(|d| Value::String(d.to_string())),
        "TIME" => row
            .try_get::<chrono::NaiveTime, _>(index)
            .ok()
            .map(|t| Value::String(t.to_string())),
        "DATETIME" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .ok()
            .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        "TIMESTAMP" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .ok()
            .map(|dt| Value::String(dt.to_rfc3339())),
        "JSON" => row.try_get::<Value, _>(index).ok(),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .ok()
                .map(|bytes| Value::String(BASE64.encode(bytes)))
        }
        _ => row.try_get::<String, _>(index).ok().map(Value::String),
    };

    decoded.unwrap_or_else(|| fallback_value(row, index, type_name))
}

/// Last resort for values the typed decode rejected.
fn fallback_value(row: &MySqlRow, index: usize, type_name: &str) -> Value {
    match row.try_get_unchecked::<Vec<u8>, _>(index) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::String(text),
            Err(e) => Value::String(BASE64.encode(e.into_bytes())),
        },
        Err(e) => {
            tracing::debug!(
                "Could not decode MySQL column {} of type {}: {}",
                index,
                type_name,
                e
            );
            Value::Null
        }
    }
}

fn float_value(f: f64) -> Value {
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}
