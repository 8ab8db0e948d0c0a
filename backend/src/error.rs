//! Error types for the conversion engine.
//!
//! Errors are grouped per concern:
//!
//! - [`TypeError`] - a raw cell could not be read as its declared column type
//! - [`EvalError`] - a `formula` / `conditional` expression was rejected or failed
//! - [`TransformError`] - field-scoped failure while producing one destination value
//! - [`StoreError`] - spec repository errors
//! - [`CsvError`] - CSV reading / writing at the I/O boundary
//! - [`PipelineError`] - top-level conversion errors
//!
//! Field-scoped errors never abort a row. They are collected into
//! [`FieldError`] values carrying a stable [`ErrorKind`] code.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ColumnType;

// =============================================================================
// Type Coercion Errors
// =============================================================================

/// A raw value could not be coerced to its declared column type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot read '{value}' as {expected}: {reason}")]
pub struct TypeError {
    pub expected: ColumnType,
    pub value: String,
    pub reason: String,
}

impl TypeError {
    pub fn new(expected: ColumnType, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expected,
            value: value.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Expression Errors
// =============================================================================

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    /// Token outside the expression grammar (including calls outside the allow-list).
    #[error("Unsupported token '{token}' at position {position}")]
    UnsupportedToken { token: String, position: usize },

    /// Reference to a field the record does not have.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Division by zero")]
    DivisionByZero,

    /// Operand of the wrong type for an operator.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Well-formed tokens in an invalid order.
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Expression is nested deeper than {0} levels")]
    TooComplex(usize),

    #[error("Arithmetic overflow")]
    Overflow,
}

// =============================================================================
// Transform Errors
// =============================================================================

/// Field-scoped failure while producing one destination value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Referenced source field is absent from the record.
    #[error("Missing source field: {0}")]
    MissingField(String),

    #[error("Date '{value}' could not be converted: {message}")]
    DateParse { value: String, message: String },

    #[error("No lookup entry for '{0}' and no _default")]
    LookupMiss(String),

    #[error("No condition matched and no _default")]
    NoConditionMatched,

    #[error("Expression error: {0}")]
    Eval(#[from] EvalError),

    /// Destination column is required but the produced value is empty.
    #[error("Required value is empty")]
    Required,

    #[error("Value is {length} characters long, maximum is {max}")]
    TooLong { length: usize, max: usize },
}

impl TransformError {
    /// Stable code for reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::Type(_) => ErrorKind::TypeError,
            TransformError::MissingField(_) => ErrorKind::MissingField,
            TransformError::DateParse { .. } => ErrorKind::DateParseError,
            TransformError::LookupMiss(_) => ErrorKind::LookupMiss,
            TransformError::NoConditionMatched => ErrorKind::NoConditionMatched,
            TransformError::Eval(e) => match e {
                EvalError::UnsupportedToken { .. } => ErrorKind::UnsupportedToken,
                EvalError::UnknownField(_) => ErrorKind::UnknownField,
                EvalError::DivisionByZero => ErrorKind::DivisionByZero,
                EvalError::TypeMismatch(_) => ErrorKind::TypeMismatch,
                EvalError::Syntax(_) => ErrorKind::SyntaxError,
                EvalError::TooComplex(_) => ErrorKind::TooComplex,
                EvalError::Overflow => ErrorKind::Overflow,
            },
            TransformError::Required => ErrorKind::Required,
            TransformError::TooLong { .. } => ErrorKind::TooLong,
        }
    }
}

/// Stable error codes shown to users next to each field error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TypeError,
    MissingField,
    DateParseError,
    LookupMiss,
    NoConditionMatched,
    UnsupportedToken,
    UnknownField,
    DivisionByZero,
    TypeMismatch,
    SyntaxError,
    TooComplex,
    Overflow,
    Required,
    TooLong,
}

/// One field-level problem inside a failed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Destination column the error belongs to.
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
    /// Raw source value, when the transform reads a single source field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_value: Option<String>,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: &TransformError) -> Self {
        Self {
            field: field.into(),
            kind: error.kind(),
            message: error.to_string(),
            source_value: None,
        }
    }

    pub fn with_source_value(mut self, value: Option<&str>) -> Self {
        self.source_value = value.map(str::to_string);
        self
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the spec repository.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors at the CSV reading / writing boundary.
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid CSV at line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("CSV file is empty")]
    EmptyFile,

    #[error("No headers found in CSV")]
    NoHeaders,

    #[error("Failed to write CSV: {0}")]
    Write(String),
}

impl From<csv::Error> for CsvError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        CsvError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level conversion errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Conversion fails closed: nothing is produced when any row has errors.
    #[error("{count} row(s) have errors, conversion blocked")]
    HasErrors {
        count: usize,
        report: Box<crate::transform::pipeline::Report>,
    },

    #[error("Row {index} is out of range ({len} rows)")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Invalid mapping: {}", .0.join("; "))]
    InvalidMapping(Vec<String>),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for coercion.
pub type CoerceResult<T> = Result<T, TypeError>;

/// Result type for expressions.
pub type EvalResult<T> = Result<T, EvalError>;

/// Result type for field transforms.
pub type TransformResult<T> = Result<T, TransformError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let type_err = TypeError::new(ColumnType::Integer, "abc", "not a whole number");
        let transform_err: TransformError = type_err.into();
        assert_eq!(transform_err.kind(), ErrorKind::TypeError);
        assert!(transform_err.to_string().contains("abc"));

        let eval_err = EvalError::DivisionByZero;
        let transform_err: TransformError = eval_err.into();
        assert_eq!(transform_err.kind(), ErrorKind::DivisionByZero);

        let store_err = StoreError::NotFound { kind: "Mapping", id: "x".into() };
        let pipeline_err: PipelineError = store_err.into();
        assert!(pipeline_err.to_string().contains("Mapping not found: x"));
    }

    #[test]
    fn test_field_error_format() {
        let err = FieldError::new("date", &TransformError::LookupMiss("HOLD".into()))
            .with_source_value(Some("HOLD"));
        assert_eq!(err.kind, ErrorKind::LookupMiss);
        assert!(err.message.contains("HOLD"));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "lookup_miss");
        assert_eq!(json["sourceValue"], "HOLD");
    }

    #[test]
    fn test_invalid_mapping_message() {
        let err = PipelineError::InvalidMapping(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid mapping: a; b");
    }
}
