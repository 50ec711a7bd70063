//! Conversion between BSON documents and the JSON rows returned to callers.

use crate::Result;
use crate::error::DbBridgeError;
use crate::models::Row;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use mongodb::bson::{Bson, Document};
use serde_json::{Value, json};

/// Converts a BSON value to plain JSON.
///
/// ObjectIds become their hex string, dates RFC 3339 strings and binary
/// data base64. Types without a natural JSON form fall back to relaxed
/// extended JSON.
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::from(*i),
        Bson::Int64(i) => Value::from(*i),
        Bson::Double(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
        Bson::String(s) | Bson::Symbol(s) | Bson::JavaScriptCode(s) => Value::String(s.clone()),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => Value::String(
            dt.try_to_rfc3339_string()
                .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        ),
        Bson::Decimal128(d) => Value::String(d.to_string()),
        Bson::Binary(binary) => Value::String(BASE64.encode(&binary.bytes)),
        Bson::Timestamp(ts) => json!({"t": ts.time, "i": ts.increment}),
        Bson::RegularExpression(regex) => {
            Value::String(format!("/{}/{}", regex.pattern, regex.options))
        }
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_row(doc)),
        other => other.clone().into_relaxed_extjson(),
    }
}

/// Converts a document to a row, keeping field order.
pub fn document_to_row(doc: &Document) -> Row {
    doc.iter()
        .map(|(key, value)| (key.clone(), bson_to_json(value)))
        .collect()
}

/// Converts a JSON object to a BSON document.
///
/// Input is read as MongoDB extended JSON, so `{"$oid": "..."}` and
/// `{"$date": "..."}` produce native values; integers that fit in 32 bits
/// become `int`, larger ones `long`.
///
/// # Errors
/// Malformed extended JSON is a configuration error.
pub fn row_to_document(row: &Row) -> Result<Document> {
    Document::try_from(row.clone())
        .map_err(|e| DbBridgeError::configuration(format!("Invalid document: {}", e)))
}

/// MongoDB `$type` alias of a BSON value.
pub fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Document(_) => "object",
        Bson::Array(_) => "array",
        Bson::Binary(_) => "binData",
        Bson::Undefined => "undefined",
        Bson::ObjectId(_) => "objectId",
        Bson::Boolean(_) => "bool",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::DbPointer(_) => "dbPointer",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::Symbol(_) => "symbol",
        Bson::JavaScriptCodeWithScope(_) => "javascriptWithScope",
        Bson::Int32(_) => "int",
        Bson::Timestamp(_) => "timestamp",
        Bson::Int64(_) => "long",
        Bson::Decimal128(_) => "decimal",
        Bson::MinKey => "minKey",
        Bson::MaxKey => "maxKey",
    }
}
