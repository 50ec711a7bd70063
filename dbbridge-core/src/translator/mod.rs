//! Restricted SQL-to-document translation.
//!
//! Maps a small SQL-shaped surface onto native document operations:
//!
//! | Input                                | Operation                    |
//! |--------------------------------------|------------------------------|
//! | `SELECT ... FROM t [WHERE ...]`      | `find` with an empty filter  |
//! | `INSERT INTO t (..) VALUES (..)`     | `insertOne`                  |
//! | `UPDATE t SET a = ? [WHERE ...]`     | `updateMany` with `$set`     |
//! | `DELETE FROM t [WHERE ...]`          | `deleteMany`                 |
//!
//! WHERE clauses are never parsed. A SELECT with a WHERE clause returns the
//! whole collection and says so in [`TranslatedQuery::warnings`]. UPDATE and
//! DELETE with a WHERE clause take their filter from a trailing object
//! parameter and are rejected without one. Every other statement shape is an
//! [`UnsupportedQuery`](crate::DbBridgeError::UnsupportedQuery) error.

mod parse;


use crate::error::DbBridgeError;
use crate::Result;
use parse::{Patterns, mask_literals, parse_value, split_top_level, unquote_identifier};
use serde::Serialize;
use serde_json::{Map, Value};

/// Warning attached to every SELECT whose WHERE clause was dropped.
pub const UNFILTERED_WARNING: &str =
    "WHERE clause is not translated for document collections; results are unfiltered";

/// Native document operation produced by [`translate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum DocumentOperation {
    Find {
        filter: Map<String, Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    },
    InsertOne {
        document: Map<String, Value>,
    },
    UpdateMany {
        filter: Map<String, Value>,
        /// Update document, always of the form `{"$set": {...}}`
        update: Map<String, Value>,
    },
    DeleteMany {
        filter: Map<String, Value>,
    },
}

impl DocumentOperation {
    /// True for operations that modify the collection.
    pub const fn is_write(&self) -> bool {
        !matches!(self, Self::Find { .. })
    }
}

/// Result of translating one statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedQuery {
    /// Target collection
    pub collection: String,
    pub operation: DocumentOperation,
    /// Approximations callers must be told about
    pub warnings: Vec<String>,
}

/// Translates SQL-shaped text plus positional parameters.
///
/// # Errors
/// - `UnsupportedQuery` for statement shapes that have no document equivalent
/// - `Configuration` when placeholders and parameters do not line up
pub fn translate(sql: &str, params: &[Value]) -> Result<TranslatedQuery> {
    let text = sql.trim().trim_end_matches(';').trim();
    let keyword = text
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "SELECT" => translate_select(text),
        "INSERT" => translate_insert(text, params),
        "UPDATE" => translate_update(text, params),
        "DELETE" => translate_delete(text, params),
        "" => Err(DbBridgeError::unsupported_query("empty statement")),
        other => Err(DbBridgeError::unsupported_query(format!(
            "{} statements cannot be translated to a document operation",
            other
        ))),
    }
}

fn translate_select(text: &str) -> Result<TranslatedQuery> {
    let patterns = Patterns::instance();
    let masked = mask_literals(text);

    if let Some(found) = patterns.unsupported_select.find(&masked) {
        return Err(DbBridgeError::unsupported_query(format!(
            "{} is not supported for document collections",
            found.as_str().to_ascii_uppercase()
        )));
    }

    let captures = patterns
        .select
        .captures(&masked)
        .ok_or_else(|| DbBridgeError::unsupported_query("unrecognized SELECT statement"))?;
    let columns = captures
        .name("columns")
        .and_then(|m| text.get(m.range()))
        .map_or("*", str::trim);
    let collection = unquote_identifier(original(text, &captures, "table"));
    let rest = captures.name("rest").map_or(0..0, |m| m.range());

    let tail = patterns
        .select_tail
        .captures(&masked[rest.clone()])
        .ok_or_else(|| {
            DbBridgeError::unsupported_query(format!(
                "unsupported SELECT clause: {}",
                text.get(rest).unwrap_or_default().trim()
            ))
        })?;

    let mut warnings = Vec::new();
    if columns != "*" {
        warnings.push(format!(
            "column list '{}' is not applied; full documents are returned",
            columns
        ));
    }
    if tail.name("where").is_some() {
        warnings.push(UNFILTERED_WARNING.to_string());
    }
    if tail.name("order").is_some() {
        warnings.push("ORDER BY is not translated; document order is unspecified".to_string());
    }

    let limit = parse_count(tail.name("limit").map(|m| m.as_str()))?;
    let skip = parse_count(tail.name("offset").map(|m| m.as_str()))?;

    Ok(TranslatedQuery {
        collection,
        operation: DocumentOperation::Find {
            filter: Map::new(),
            skip,
            limit,
        },
        warnings,
    })
}

fn translate_insert(text: &str, params: &[Value]) -> Result<TranslatedQuery> {
    let masked = mask_literals(text);
    let captures = Patterns::instance()
        .insert
        .captures(&masked)
        .ok_or_else(|| DbBridgeError::unsupported_query("unrecognized INSERT statement"))?;
    let collection = unquote_identifier(original(text, &captures, "table"));
    let values = split_top_level(original(text, &captures, "values"));

    // `VALUES (1), (2)` splits into "1)" and "(2"
    if values.iter().any(|v| v.starts_with('(')) {
        return Err(DbBridgeError::unsupported_query(
            "multi-row INSERT is not supported for document collections",
        ));
    }

    let Some(columns) = captures.name("columns").and_then(|m| text.get(m.range())) else {
        // INSERT INTO t VALUES (?) with one object parameter
        return match (values.as_slice(), params) {
            ([placeholder], [Value::Object(document)]) if placeholder == "?" => {
                Ok(TranslatedQuery {
                    collection,
                    operation: DocumentOperation::InsertOne {
                        document: document.clone(),
                    },
                    warnings: Vec::new(),
                })
            }
            _ => Err(DbBridgeError::unsupported_query(
                "INSERT without a column list needs exactly one object parameter",
            )),
        };
    };

    let columns = split_top_level(columns);
    if columns.len() != values.len() {
        return Err(DbBridgeError::configuration(format!(
            "INSERT names {} columns but supplies {} values",
            columns.len(),
            values.len()
        )));
    }

    let mut binder = ParamBinder::new(params);
    let mut document = Map::new();
    for (column, value) in columns.iter().zip(&values) {
        document.insert(unquote_identifier(column), binder.resolve(value)?);
    }
    binder.finish()?;

    Ok(TranslatedQuery {
        collection,
        operation: DocumentOperation::InsertOne { document },
        warnings: Vec::new(),
    })
}

fn translate_update(text: &str, params: &[Value]) -> Result<TranslatedQuery> {
    let masked = mask_literals(text);
    let captures = Patterns::instance()
        .update
        .captures(&masked)
        .ok_or_else(|| DbBridgeError::unsupported_query("unrecognized UPDATE statement"))?;
    let collection = unquote_identifier(original(text, &captures, "table"));

    let mut binder = ParamBinder::new(params);
    let mut set = Map::new();
    for assignment in split_top_level(original(text, &captures, "set")) {
        let (column, value) = assignment.split_once('=').ok_or_else(|| {
            DbBridgeError::unsupported_query(format!(
                "unsupported SET assignment: {}",
                assignment
            ))
        })?;
        set.insert(unquote_identifier(column), binder.resolve(value.trim())?);
    }

    let filter = binder.filter(captures.name("where").is_some())?;

    let mut update = Map::new();
    update.insert("$set".to_string(), Value::Object(set));

    Ok(TranslatedQuery {
        collection,
        operation: DocumentOperation::UpdateMany { filter, update },
        warnings: Vec::new(),
    })
}

fn translate_delete(text: &str, params: &[Value]) -> Result<TranslatedQuery> {
    let masked = mask_literals(text);
    let captures = Patterns::instance()
        .delete
        .captures(&masked)
        .ok_or_else(|| DbBridgeError::unsupported_query("unrecognized DELETE statement"))?;
    let collection = unquote_identifier(original(text, &captures, "table"));

    let filter = ParamBinder::new(params).filter(captures.name("where").is_some())?;

    Ok(TranslatedQuery {
        collection,
        operation: DocumentOperation::DeleteMany { filter },
        warnings: Vec::new(),
    })
}

/// Slices a capture taken on the masked text out of the original.
fn original<'t>(text: &'t str, captures: &regex::Captures<'_>, name: &str) -> &'t str {
    captures
        .name(name)
        .and_then(|m| text.get(m.range()))
        .unwrap_or_default()
}

fn parse_count(raw: Option<&str>) -> Result<Option<u64>> {
    raw.map(|n| {
        n.parse::<u64>()
            .map_err(|_| DbBridgeError::unsupported_query(format!("invalid row count: {}", n)))
    })
    .transpose()
}

/// Hands out positional parameters as placeholders are encountered.
struct ParamBinder<'a> {
    params: &'a [Value],
    next: usize,
}

impl<'a> ParamBinder<'a> {
    const fn new(params: &'a [Value]) -> Self {
        Self { params, next: 0 }
    }

    /// Resolves a value expression: `?` binds the next parameter, anything
    /// else must be a literal.
    fn resolve(&mut self, expression: &str) -> Result<Value> {
        if expression == "?" {
            let value = self.params.get(self.next).cloned().ok_or_else(|| {
                DbBridgeError::configuration(format!(
                    "statement has more placeholders than the {} parameters supplied",
                    self.params.len()
                ))
            })?;
            self.next += 1;
            return Ok(value);
        }
        parse_value(expression)
    }

    fn remaining(&self) -> &'a [Value] {
        self.params.get(self.next..).unwrap_or_default()
    }

    /// Fails when parameters were supplied that no placeholder consumed.
    fn finish(&self) -> Result<()> {
        let unused = self.remaining().len();
        if unused == 0 {
            Ok(())
        } else {
            Err(DbBridgeError::configuration(format!(
                "{} parameter(s) supplied but not referenced by any placeholder",
                unused
            )))
        }
    }

    /// Resolves the filter of an UPDATE or DELETE.
    ///
    /// Without a WHERE clause the filter matches every document. With one,
    /// the filter must be supplied as a single trailing object parameter.
    fn filter(&self, has_where: bool) -> Result<Map<String, Value>> {
        if !has_where {
            self.finish()?;
            return Ok(Map::new());
        }

        match self.remaining() {
            [Value::Object(filter)] => Ok(filter.clone()),
            [] => Err(DbBridgeError::unsupported_query(
                "WHERE clauses are not translated; pass the filter document as a trailing object parameter",
            )),
            [_] => Err(DbBridgeError::unsupported_query(
                "the trailing parameter must be a filter object",
            )),
            extra => Err(DbBridgeError::configuration(format!(
                "expected one trailing filter object, got {} parameters",
                extra.len()
            ))),
        }
    }
}
