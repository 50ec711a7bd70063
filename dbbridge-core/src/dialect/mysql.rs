//! MySQL syntax generation.

use super::{Dialect, normalize_generic};
use crate::models::ColumnDefinition;

/// Dialect for the relational (MySQL) engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn map_data_type(&self, generic: &str) -> String {
        let native = match normalize_generic(generic).as_str() {
            "string" | "varchar" => "VARCHAR(255)",
            "text" => "TEXT",
            "integer" | "int" => "INT",
            "bigint" | "long" => "BIGINT",
            "float" => "FLOAT",
            "double" => "DOUBLE",
            "decimal" | "numeric" => "DECIMAL(10,2)",
            "boolean" | "bool" => "BOOLEAN",
            "date" => "DATE",
            "datetime" => "DATETIME",
            "timestamp" => "TIMESTAMP",
            "time" => "TIME",
            "json" | "object" => "JSON",
            "uuid" => "CHAR(36)",
            "binary" | "blob" | "bytes" => "BLOB",
            _ => return generic.trim().to_uppercase(),
        };
        native.to_string()
    }

    fn limit_clause(&self, limit: u64, offset: Option<u64>) -> String {
        match offset {
            Some(offset) => format!("LIMIT {} OFFSET {}", limit, offset),
            None => format!("LIMIT {}", limit),
        }
    }

    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|part| format!("`{}`", part.replace('`', "``")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn concat(&self, parts: &[&str]) -> String {
        format!("CONCAT({})", parts.join(", "))
    }

    fn substring(&self, expr: &str, start: u64, length: Option<u64>) -> String {
        match length {
            Some(length) => format!("SUBSTRING({}, {}, {})", expr, start, length),
            None => format!("SUBSTRING({}, {})", expr, start),
        }
    }

    fn current_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    fn auto_increment(&self) -> String {
        "AUTO_INCREMENT".to_string()
    }

    fn create_table_syntax(&self, table: &str, columns: &[ColumnDefinition]) -> String {
        let mut lines: Vec<String> = columns
            .iter()
            .map(|column| {
                let mut line = format!(
                    "  {} {}",
                    self.quote_identifier(&column.name),
                    self.map_data_type(&column.data_type)
                );
                if !column.nullable {
                    line.push_str(" NOT NULL");
                }
                if column.auto_increment {
                    line.push(' ');
                    line.push_str(&self.auto_increment());
                }
                if let Some(default) = &column.default {
                    line.push_str(" DEFAULT ");
                    line.push_str(default);
                }
                line
            })
            .collect();

        let primary_keys: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| self.quote_identifier(&c.name))
            .collect();
        if !primary_keys.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", primary_keys.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            self.quote_identifier(table),
            lines.join(",\n")
        )
    }
}
