//! MongoDB aggregation-pipeline fragments.
//!
//! Fragments are JSON text so they can be shown to callers or parsed into
//! BSON documents. Expression arguments are field names and are rendered as
//! `$field` paths.

use super::{Dialect, normalize_generic};
use crate::models::ColumnDefinition;
use serde_json::{Map, Value, json};

/// Dialect for the document (MongoDB) engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDialect;

impl DocumentDialect {
    fn field_path(name: &str) -> Value {
        Value::String(format!("${}", name.trim_start_matches('$')))
    }
}

impl Dialect for DocumentDialect {
    fn name(&self) -> &'static str {
        "MongoDB"
    }

    /// Maps to `$jsonSchema` BSON type aliases.
    fn map_data_type(&self, generic: &str) -> String {
        let native = match normalize_generic(generic).as_str() {
            "string" | "varchar" | "text" | "uuid" | "time" => "string",
            "integer" | "int" => "int",
            "bigint" | "long" => "long",
            "float" | "double" => "double",
            "decimal" | "numeric" => "decimal",
            "boolean" | "bool" => "bool",
            "date" | "datetime" | "timestamp" => "date",
            "json" | "object" => "object",
            "array" => "array",
            "binary" | "blob" | "bytes" => "binData",
            "objectid" => "objectId",
            other => return other.to_string(),
        };
        native.to_string()
    }

    fn limit_clause(&self, limit: u64, offset: Option<u64>) -> String {
        let stages = match offset {
            Some(offset) => json!([{ "$skip": offset }, { "$limit": limit }]),
            None => json!([{ "$limit": limit }]),
        };
        stages.to_string()
    }

    fn quote_identifier(&self, name: &str) -> String {
        Value::String(name.to_string()).to_string()
    }

    fn concat(&self, parts: &[&str]) -> String {
        let parts: Vec<Value> = parts.iter().map(|p| Self::field_path(p)).collect();
        json!({ "$concat": parts }).to_string()
    }

    fn substring(&self, expr: &str, start: u64, length: Option<u64>) -> String {
        let field = Self::field_path(expr);
        let count = match length {
            Some(length) => json!(length),
            None => json!({ "$strLenCP": field }),
        };
        json!({ "$substrCP": [field, start.saturating_sub(1), count] }).to_string()
    }

    fn current_timestamp(&self) -> String {
        Value::String("$$NOW".to_string()).to_string()
    }

    /// Documents get a generated `ObjectId` key instead of a counter.
    fn auto_increment(&self) -> String {
        "ObjectId".to_string()
    }

    fn create_table_syntax(&self, table: &str, columns: &[ColumnDefinition]) -> String {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for column in columns {
            let bson_type = if column.auto_increment {
                "objectId".to_string()
            } else {
                self.map_data_type(&column.data_type)
            };
            let schema = if column.nullable {
                json!({ "bsonType": [bson_type, "null"] })
            } else {
                required.push(Value::String(column.name.clone()));
                json!({ "bsonType": bson_type })
            };
            properties.insert(column.name.clone(), schema);
        }

        let mut json_schema = Map::new();
        json_schema.insert("bsonType".to_string(), json!("object"));
        if !required.is_empty() {
            json_schema.insert("required".to_string(), Value::Array(required));
        }
        json_schema.insert("properties".to_string(), Value::Object(properties));

        json!({
            "create": table,
            "validator": { "$jsonSchema": json_schema },
        })
        .to_string()
    }
}
