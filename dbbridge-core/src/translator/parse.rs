//! Lexical helpers for the translator.

use crate::error::DbBridgeError;
use crate::Result;
use regex::Regex;
use serde_json::{Number, Value};
use std::sync::OnceLock;

/// Table identifier: backtick-quoted, double-quoted or bare (dots allowed).
const IDENT: &str = r#"`[^`]+`|"[^"]+"|[A-Za-z_][A-Za-z0-9_$.\-]*"#;

/// Pre-compiled statement patterns.
///
/// Uses `OnceLock` for thread-safe lazy initialization.
pub(super) struct Patterns {
    pub(super) select: Regex,
    pub(super) select_tail: Regex,
    pub(super) unsupported_select: Regex,
    pub(super) insert: Regex,
    pub(super) update: Regex,
    pub(super) delete: Regex,
}

impl Patterns {
    /// Gets the singleton instance of pre-compiled patterns.
    pub(super) fn instance() -> &'static Self {
        static PATTERNS: OnceLock<Patterns> = OnceLock::new();
        PATTERNS.get_or_init(Self::compile)
    }

    fn compile() -> Self {
        let select = format!(
            r"(?is)^SELECT\s+(?P<columns>.+?)\s+FROM\s+(?P<table>{IDENT})(?P<rest>.*)$"
        );
        let insert = format!(
            r"(?is)^INSERT\s+INTO\s+(?P<table>{IDENT})\s*(?:\((?P<columns>[^)]*)\))?\s*VALUES\s*\((?P<values>.*)\)$"
        );
        let update = format!(
            r"(?is)^UPDATE\s+(?P<table>{IDENT})\s+SET\s+(?P<set>.+?)(?:\s+WHERE\s+(?P<where>.+))?$"
        );
        let delete = format!(r"(?is)^DELETE\s+FROM\s+(?P<table>{IDENT})(?:\s+WHERE\s+(?P<where>.+))?$");

        Self {
            select: Regex::new(&select).expect("Invalid SELECT pattern"),
            select_tail: Regex::new(
                r"(?is)^\s*(?:WHERE\s+(?P<where>.+?))?\s*(?:ORDER\s+BY\s+(?P<order>.+?))?\s*(?:LIMIT\s+(?P<limit>\d+)(?:\s+OFFSET\s+(?P<offset>\d+))?)?\s*$",
            )
            .expect("Invalid SELECT tail pattern"),
            unsupported_select: Regex::new(
                r"(?i)\b(?:JOIN|UNION|GROUP\s+BY|HAVING|INTERSECT|EXCEPT)\b|\(\s*SELECT\b",
            )
            .expect("Invalid unsupported-clause pattern"),
            insert: Regex::new(&insert).expect("Invalid INSERT pattern"),
            update: Regex::new(&update).expect("Invalid UPDATE pattern"),
            delete: Regex::new(&delete).expect("Invalid DELETE pattern"),
        }
    }
}

/// Blanks the contents of quoted spans so keyword patterns never match
/// inside literals or quoted identifiers.
///
/// Byte offsets are preserved: a capture range on the masked text slices
/// the same span out of the original.
pub(super) fn mask_literals(text: &str) -> String {
    let mut quote: Option<u8> = None;
    let masked: Vec<u8> = text
        .bytes()
        .map(|byte| match quote {
            Some(q) if byte == q => {
                quote = None;
                byte
            }
            Some(_) => b'_',
            None => {
                if matches!(byte, b'\'' | b'"' | b'`') {
                    quote = Some(byte);
                }
                byte
            }
        })
        .collect();

    // Quotes are ASCII, so whole characters are either kept or replaced
    String::from_utf8(masked).unwrap_or_else(|_| text.to_string())
}

/// Strips identifier quoting.
pub(super) fn unquote_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    for (open, close) in [('`', '`'), ('"', '"'), ('[', ']')] {
        if let Some(inner) = trimmed
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            return inner.to_string();
        }
    }
    trimmed.to_string()
}

/// Splits a comma-separated list, ignoring commas inside quotes and brackets.
pub(super) fn split_top_level(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }

    let mut items = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;

    for ch in input.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                }
                current.push(ch);
            }
            None => match ch {
                '\'' | '"' | '`' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                '(' | '[' | '{' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    items.push(current.trim().to_string());
                    current.clear();
                }
                _ => current.push(ch),
            },
        }
    }
    items.push(current.trim().to_string());
    items
}

/// Parses a SQL literal into a JSON value.
pub(super) fn parse_value(expression: &str) -> Result<Value> {
    let expression = expression.trim();

    if let Some(inner) = expression
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return Ok(Value::String(inner.replace("''", "'")));
    }
    if let Some(inner) = expression
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Ok(Value::String(inner.to_string()));
    }

    match expression.to_ascii_uppercase().as_str() {
        "NULL" => return Ok(Value::Null),
        "TRUE" => return Ok(Value::Bool(true)),
        "FALSE" => return Ok(Value::Bool(false)),
        _ => {}
    }

    if let Ok(integer) = expression.parse::<i64>() {
        return Ok(Value::Number(integer.into()));
    }
    if let Some(number) = expression
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
    {
        return Ok(Value::Number(number));
    }

    Err(DbBridgeError::unsupported_query(format!(
        "unsupported value expression: {}",
        expression
    )))
}
