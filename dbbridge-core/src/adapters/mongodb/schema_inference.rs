//! Schema inference from sampled documents.
//!
//! Collections have no declared schema, so the column layout is derived from
//! a bounded sample. The result is approximate:
//! - the representative type of a field is the first non-null type observed
//! - a field is nullable when any sampled document holds `null` or omits it
//! - fields seen with more than one type carry a `Mixed types observed` comment

use super::convert::bson_type_name;
use crate::models::{ColumnInfo, FieldInfo, TableSchema};
use mongodb::bson::{Bson, Document};

/// Number of documents sampled by `get_table_schema`.
pub const SCHEMA_SAMPLE_SIZE: i64 = 100;

#[derive(Debug)]
struct FieldObservation {
    name: String,
    /// Distinct non-null types in first-seen order
    types: Vec<&'static str>,
    saw_null: bool,
    present_in: usize,
}

/// Collects per-field observations in first-seen field order.
fn observe(documents: &[Document]) -> Vec<FieldObservation> {
    let mut fields: Vec<FieldObservation> = Vec::new();

    for document in documents {
        for (key, value) in document {
            let position = match fields.iter().position(|f| f.name == *key) {
                Some(position) => position,
                None => {
                    fields.push(FieldObservation {
                        name: key.clone(),
                        types: Vec::new(),
                        saw_null: false,
                        present_in: 0,
                    });
                    fields.len() - 1
                }
            };
            let field = &mut fields[position];
            field.present_in += 1;

            if matches!(value, Bson::Null | Bson::Undefined) {
                field.saw_null = true;
            } else {
                let type_name = bson_type_name(value);
                if !field.types.contains(&type_name) {
                    field.types.push(type_name);
                }
            }
        }
    }

    fields
}

/// Infers the column layout of `collection` from sampled documents.
pub fn infer_schema(collection: &str, documents: &[Document]) -> TableSchema {
    let columns = observe(documents)
        .into_iter()
        .map(|field| {
            let comment = (field.types.len() > 1)
                .then(|| format!("Mixed types observed: {}", field.types.join(", ")));
            ColumnInfo {
                is_primary_key: field.name == "_id",
                nullable: field.saw_null || field.present_in < documents.len(),
                data_type: field.types.first().copied().unwrap_or("null").to_string(),
                default_value: None,
                extra: None,
                comment,
                name: field.name,
            }
        })
        .collect();

    TableSchema {
        table: collection.to_string(),
        columns,
        inferred: true,
    }
}

/// Field descriptors for a result set: the union of keys in first-seen
/// order with their first observed type.
pub fn result_fields(documents: &[Document]) -> Vec<FieldInfo> {
    observe(documents)
        .into_iter()
        .map(|field| FieldInfo {
            data_type: field.types.first().copied().unwrap_or("null").to_string(),
            name: field.name,
        })
        .collect()
}
