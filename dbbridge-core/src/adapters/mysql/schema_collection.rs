//! MySQL catalog introspection.
//!
//! Everything is read from INFORMATION_SCHEMA for the connection's current
//! database (`DATABASE()`).

use crate::Result;
use crate::error::DbBridgeError;
use crate::models::{ColumnInfo, IndexInfo, TableInfo, TableSchema};
use sqlx::{MySqlPool, Row};

/// Lists databases visible to the connected user, excluding system schemas.
pub(super) async fn list_databases(pool: &MySqlPool) -> Result<Vec<String>> {
    // Cast to CHAR to avoid VARBINARY type issues in MySQL 8.0+
    let query = r#"
        SELECT CAST(SCHEMA_NAME AS CHAR) AS SCHEMA_NAME
        FROM INFORMATION_SCHEMA.SCHEMATA
        WHERE SCHEMA_NAME NOT IN ('information_schema', 'performance_schema', 'mysql', 'sys')
        ORDER BY SCHEMA_NAME
    "#;

    sqlx::query_scalar::<_, String>(query)
        .fetch_all(pool)
        .await
        .map_err(DbBridgeError::from_sqlx)
}

/// Lists base tables and views of the current database.
pub(super) async fn list_tables(pool: &MySqlPool) -> Result<Vec<TableInfo>> {
    let query = r#"
        SELECT
            CAST(TABLE_NAME AS CHAR) AS TABLE_NAME,
            CAST(TABLE_SCHEMA AS CHAR) AS TABLE_SCHEMA,
            CAST(TABLE_TYPE AS CHAR) AS TABLE_TYPE,
            CAST(TABLE_ROWS AS SIGNED) AS TABLE_ROWS
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE()
        ORDER BY TABLE_NAME
    "#;

    let rows = sqlx::query(query)
        .fetch_all(pool)
        .await
        .map_err(DbBridgeError::from_sqlx)?;

    let mut tables = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("TABLE_NAME")
            .map_err(|e| DbBridgeError::statement_failed("MySQL", e))?;
        let table_type: String = row.try_get("TABLE_TYPE").unwrap_or_default();
        let row_count = row.try_get::<Option<i64>, _>("TABLE_ROWS").ok().flatten();

        tables.push(TableInfo {
            name,
            schema: row.try_get("TABLE_SCHEMA").ok(),
            table_type: if table_type.eq_ignore_ascii_case("VIEW") {
                "view".to_string()
            } else {
                "table".to_string()
            },
            row_count: row_count.and_then(|n| u64::try_from(n).ok()),
        });
    }

    tracing::debug!("Found {} MySQL tables", tables.len());
    Ok(tables)
}

/// Describes the declared columns of one table in ordinal order.
///
/// # Errors
/// A table that does not exist is a statement error.
pub(super) async fn table_schema(pool: &MySqlPool, table: &str) -> Result<TableSchema> {
    let query = r#"
        SELECT
            CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
            CAST(COLUMN_TYPE AS CHAR) AS COLUMN_TYPE,
            CAST(IS_NULLABLE AS CHAR) AS IS_NULLABLE,
            CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
            CAST(COLUMN_KEY AS CHAR) AS COLUMN_KEY,
            CAST(EXTRA AS CHAR) AS EXTRA,
            CAST(COLUMN_COMMENT AS CHAR) AS COLUMN_COMMENT
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    let rows = sqlx::query(query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(DbBridgeError::from_sqlx)?;

    if rows.is_empty() {
        return Err(DbBridgeError::statement_failed(
            "MySQL",
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("table '{}' does not exist in the current database", table),
            ),
        ));
    }

    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row
            .try_get("COLUMN_NAME")
            .map_err(|e| DbBridgeError::statement_failed("MySQL", e))?;
        let is_nullable: String = row.try_get("IS_NULLABLE").unwrap_or_default();
        let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
        let extra = row.try_get::<Option<String>, _>("EXTRA").ok().flatten();
        let comment = row
            .try_get::<Option<String>, _>("COLUMN_COMMENT")
            .ok()
            .flatten();

        columns.push(ColumnInfo {
            name,
            data_type: row.try_get("COLUMN_TYPE").unwrap_or_default(),
            nullable: is_nullable.eq_ignore_ascii_case("YES"),
            default_value: row
                .try_get::<Option<String>, _>("COLUMN_DEFAULT")
                .ok()
                .flatten(),
            is_primary_key: column_key == "PRI",
            extra: extra.filter(|e| !e.is_empty()),
            comment: comment.filter(|c| !c.is_empty()),
        });
    }

    Ok(TableSchema {
        table: table.to_string(),
        columns,
        inferred: false,
    })
}

/// Lists the indexes of one table with their columns in key order.
pub(super) async fn table_indexes(pool: &MySqlPool, table: &str) -> Result<Vec<IndexInfo>> {
    let query = r#"
        SELECT
            CAST(INDEX_NAME AS CHAR) AS INDEX_NAME,
            CAST(COLUMN_NAME AS CHAR) AS COLUMN_NAME,
            CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE,
            CAST(INDEX_TYPE AS CHAR) AS INDEX_TYPE
        FROM INFORMATION_SCHEMA.STATISTICS
        WHERE TABLE_SCHEMA = DATABASE()
        AND TABLE_NAME = ?
        ORDER BY INDEX_NAME, SEQ_IN_INDEX
    "#;

    let rows = sqlx::query(query)
        .bind(table)
        .fetch_all(pool)
        .await
        .map_err(DbBridgeError::from_sqlx)?;

    let mut indexes: Vec<IndexInfo> = Vec::new();
    for row in &rows {
        let name: String = row.try_get("INDEX_NAME").unwrap_or_default();
        let column = row.try_get::<Option<String>, _>("COLUMN_NAME").ok().flatten();
        let non_unique: i64 = row.try_get("NON_UNIQUE").unwrap_or(1);

        // Rows arrive grouped by index name
        if let Some(index) = indexes.last_mut().filter(|index| index.name == name) {
            index.columns.extend(column);
            continue;
        }

        indexes.push(IndexInfo {
            is_primary: name == "PRIMARY",
            is_unique: non_unique == 0,
            index_type: row.try_get("INDEX_TYPE").ok(),
            columns: column.into_iter().collect(),
            name,
        });
    }

    Ok(indexes)
}
