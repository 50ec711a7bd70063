//! Engine-specific syntax generation.
//!
//! A dialect is a set of pure functions: it never touches the network and
//! never validates caller input beyond composing syntax. Identifiers built
//! from untrusted input must go through [`Dialect::quote_identifier`].
//!
//! # Module Structure
//! - `mysql`: SQL fragments for the relational engine
//! - `document`: aggregation-pipeline fragments for the document engine

mod document;
mod mysql;


use crate::models::{ColumnDefinition, EngineType};

pub use document::DocumentDialect;
pub use mysql::MySqlDialect;

/// Syntax generation for one engine.
///
/// This trait is object-safe; adapters hand out `&dyn Dialect`.
pub trait Dialect: Send + Sync {
    /// Name of the dialect, e.g. "MySQL".
    fn name(&self) -> &'static str;

    /// Maps a generic type name (`string`, `integer`, `datetime`, ...) to the
    /// engine's native type. Unknown names are passed through.
    fn map_data_type(&self, generic: &str) -> String;

    /// Renders a pagination fragment.
    fn limit_clause(&self, limit: u64, offset: Option<u64>) -> String;

    /// Quotes an identifier so it can be spliced into statement text.
    fn quote_identifier(&self, name: &str) -> String;

    /// Renders string concatenation of the given expressions.
    fn concat(&self, parts: &[&str]) -> String;

    /// Renders a substring expression; `start` is 1-based.
    fn substring(&self, expr: &str, start: u64, length: Option<u64>) -> String;

    /// Expression evaluating to the current timestamp.
    fn current_timestamp(&self) -> String;

    /// Column modifier (or equivalent) for auto-generated keys.
    fn auto_increment(&self) -> String;

    /// Renders a create-table (or create-collection) definition.
    fn create_table_syntax(&self, table: &str, columns: &[ColumnDefinition]) -> String;
}

static MYSQL: MySqlDialect = MySqlDialect;
static DOCUMENT: DocumentDialect = DocumentDialect;

/// Returns the dialect used by adapters of the given engine type.
pub fn dialect_for(engine_type: EngineType) -> &'static dyn Dialect {
    match engine_type {
        EngineType::Relational => &MYSQL,
        EngineType::Document => &DOCUMENT,
    }
}

/// Normalizes a generic type name for table lookups.
fn normalize_generic(generic: &str) -> String {
    generic.trim().to_ascii_lowercase()
}
