//! Identifier and literal sanitizer.
//!
//! Table and column names are interpolated into SQL text, so they must be
//! plain identifiers. Column types come from a fixed allow-list.

use serde_json::{Map, Value};

use crate::errors::{AppError, AppResult};
use crate::models::table::ColumnDefinition;

/// Validates identifiers, column types and literals.
pub struct Sanitizer;

/// Allowed scalar column types. Multi-word types come before their prefixes.
const ALLOWED_TYPES: [&str; 26] = [
    "DOUBLE PRECISION",
    "CHARACTER VARYING",
    "TIMESTAMPTZ",
    "TIMESTAMP",
    "BIGSERIAL",
    "SERIAL",
    "SMALLINT",
    "INTEGER",
    "BIGINT",
    "INT",
    "REAL",
    "NUMERIC",
    "DECIMAL",
    "BOOLEAN",
    "BOOL",
    "TEXT",
    "VARCHAR",
    "CHARACTER",
    "CHAR",
    "DATE",
    "TIME",
    "UUID",
    "JSONB",
    "JSON",
    "BYTEA",
    "FLOAT",
];

/// Types accepting a `(n)` or `(p, s)` modifier.
const SIZED_TYPES: [&str; 8] = [
    "CHARACTER VARYING",
    "VARCHAR",
    "CHARACTER",
    "CHAR",
    "NUMERIC",
    "DECIMAL",
    "TIMESTAMP",
    "TIME",
];

/// Column constraints that may follow a type.
const ALLOWED_CONSTRAINTS: [&str; 3] = ["PRIMARY KEY", "NOT NULL", "UNIQUE"];

/// Longest identifier PostgreSQL keeps without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

impl Sanitizer {
    /// Validates a table or column name against `^[A-Za-z_][A-Za-z0-9_]*$`.
    ///
    /// # Errors
    /// Returns `AppError::InvalidIdentifier` for anything else, including
    /// names longer than PostgreSQL's identifier limit.
    pub fn validate_identifier(name: &str) -> AppResult<&str> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::InvalidIdentifier(format!("{:?}", name)));
        }
        Ok(name)
    }

    /// Validates every name in a column list. An empty list is rejected.
    pub fn validate_column_list(columns: &[String]) -> AppResult<Vec<String>> {
        if columns.is_empty() {
            return Err(AppError::InvalidColumnSpec(
                "column list must not be empty".into(),
            ));
        }
        columns
            .iter()
            .map(|c| Self::validate_identifier(c).map(str::to_string))
            .collect()
    }

    /// Validates a `{column: type}` mapping for table creation.
    ///
    /// Column order follows the mapping order. Type names are normalised to
    /// upper case with single spaces.
    ///
    /// # Errors
    /// `InvalidIdentifier` for a bad column name, `InvalidColumnSpec` for an
    /// empty mapping, a non-string type, or a type outside the allow-list.
    pub fn validate_column_spec(mapping: &Map<String, Value>) -> AppResult<Vec<ColumnDefinition>> {
        if mapping.is_empty() {
            return Err(AppError::InvalidColumnSpec(
                "at least one column is required".into(),
            ));
        }

        mapping
            .iter()
            .map(|(name, type_value)| {
                Self::validate_identifier(name)?;
                let type_name = type_value.as_str().ok_or_else(|| {
                    AppError::InvalidColumnSpec(format!("type of column {} must be a string", name))
                })?;
                let data_type = Self::validate_column_type(type_name)?;
                Ok(ColumnDefinition {
                    name: name.clone(),
                    data_type,
                })
            })
            .collect()
    }

    /// Checks a single column type (with optional size modifier and
    /// constraints) and returns its normalised form.
    pub fn validate_column_type(type_name: &str) -> AppResult<String> {
        let normalized = type_name
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_uppercase();
        let invalid = || AppError::InvalidColumnSpec(format!("unsupported column type {:?}", type_name));

        let base = ALLOWED_TYPES
            .iter()
            .find(|t| {
                normalized.starts_with(*t)
                    && matches!(normalized[t.len()..].chars().next(), None | Some(' ') | Some('('))
            })
            .ok_or_else(invalid)?;

        let mut rest = normalized[base.len()..].trim_start();
        if let Some(after_paren) = rest.strip_prefix('(') {
            if !SIZED_TYPES.contains(base) {
                return Err(invalid());
            }
            let (inner, tail) = after_paren.split_once(')').ok_or_else(invalid)?;
            let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
            let numeric = parts
                .iter()
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()));
            if parts.len() > 2 || !numeric {
                return Err(invalid());
            }
            rest = tail.trim_start();
        }

        while !rest.is_empty() {
            let constraint = ALLOWED_CONSTRAINTS
                .iter()
                .find(|c| {
                    rest.starts_with(*c) && matches!(rest[c.len()..].chars().next(), None | Some(' '))
                })
                .ok_or_else(invalid)?;
            rest = rest[constraint.len()..].trim_start();
        }

        Ok(normalized)
    }

    /// Renders a JSON scalar as an escaped SQL literal.
    ///
    /// Only needed where a value cannot travel as a bound parameter; the
    /// query builder uses it for SQL `NULL`.
    pub fn render_literal(value: &Value) -> AppResult<String> {
        match value {
            Value::Null => Ok("NULL".to_string()),
            Value::Bool(true) => Ok("TRUE".to_string()),
            Value::Bool(false) => Ok("FALSE".to_string()),
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => quote_text(s),
            Value::Array(_) | Value::Object(_) => quote_text(&value.to_string()),
        }
    }
}

fn quote_text(text: &str) -> AppResult<String> {
    if text.contains('\0') {
        return Err(AppError::InvalidPredicate(
            "literal contains a NUL byte".into(),
        ));
    }
    Ok(format!("'{}'", text.replace('\'', "''")))
}
