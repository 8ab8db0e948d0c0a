//! Restricted expression language used by `formula`, `conditional` and
//! the `condition` of `prefix` / `suffix` transforms.
//!
//! Expressions come from user-authored mappings, so the grammar is closed:
//! field references, literals, arithmetic, comparisons, `and`/`or`/`not`,
//! `in` lists and the functions `abs`, `round`, `min`, `max`. Attribute
//! access, other calls and any character outside the grammar are rejected
//! with [`EvalError::UnsupportedToken`].
//!
//! ```
//! use converter::expr::{Expr, Value};
//! use std::collections::HashMap;
//!
//! let expr = Expr::parse("Quantity * Price").unwrap();
//! let mut fields = HashMap::new();
//! fields.insert("Quantity".to_string(), Value::from(10i64));
//! fields.insert("Price".to_string(), Value::Text("150.00".into()));
//! assert_eq!(expr.eval(&fields).unwrap().to_string(), "1500");
//! ```

pub mod eval;
pub mod lexer;
pub mod parser;

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::coerce::{self, TypedValue};
use crate::error::{EvalError, EvalResult};
use crate::models::{ColumnType, SourceRecord, SourceSpec};

pub use eval::truthy;
pub use parser::{Node, MAX_DEPTH};

// =============================================================================
// Values
// =============================================================================

/// Runtime value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Empty cell.
    Null,
    Number(Decimal),
    Text(String),
    Bool(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "empty",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Bool(_) => "boolean",
        }
    }

    /// Convert a coerced cell into an expression value.
    pub fn from_typed(value: TypedValue, column_type: ColumnType) -> EvalResult<Self> {
        Ok(match value {
            TypedValue::Empty => Value::Null,
            TypedValue::Text(s) => Value::Text(s),
            TypedValue::Integer(i) => Value::Number(Decimal::from(i)),
            TypedValue::Float(f) => Value::Number(Decimal::from_str(&f.to_string()).map_err(|_| EvalError::Overflow)?),
            TypedValue::Money(d) => Value::Number(d),
            TypedValue::Boolean(b) => Value::Bool(b),
            temporal @ (TypedValue::Date(_) | TypedValue::DateTime(_)) => {
                Value::Text(coerce::format(&temporal, column_type))
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", n.normalize()),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(Decimal::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

// =============================================================================
// Bindings
// =============================================================================

/// Resolves field references to values.
pub trait Bindings {
    fn resolve(&self, name: &str) -> EvalResult<Value>;
}

impl Bindings for HashMap<String, Value> {
    fn resolve(&self, name: &str) -> EvalResult<Value> {
        self.get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownField(name.to_string()))
    }
}

/// Binds a raw source record, typing each cell by its source column on access.
///
/// Columns the source spec does not declare bind as text.
pub struct RecordBindings<'a> {
    record: &'a SourceRecord,
    spec: Option<&'a SourceSpec>,
}

impl<'a> RecordBindings<'a> {
    pub fn new(record: &'a SourceRecord, spec: Option<&'a SourceSpec>) -> Self {
        Self { record, spec }
    }
}

impl Bindings for RecordBindings<'_> {
    fn resolve(&self, name: &str) -> EvalResult<Value> {
        let raw = self
            .record
            .get(name)
            .ok_or_else(|| EvalError::UnknownField(name.to_string()))?;

        let column = self.spec.and_then(|spec| spec.column(name));
        let Some(column) = column else {
            return Ok(Value::Text(raw.clone()));
        };

        let typed = coerce::parse_with_format(raw, column.column_type, column.date_format.as_deref())
            .map_err(|e| EvalError::TypeMismatch(format!("field '{}': {}", name, e)))?;
        Value::from_typed(typed, column.column_type)
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// A parsed expression, reusable across records.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    pub fn parse(source: &str) -> EvalResult<Self> {
        Ok(Self {
            source: source.to_string(),
            root: parser::parse(source)?,
        })
    }

    pub fn eval<B: Bindings + ?Sized>(&self, bindings: &B) -> EvalResult<Value> {
        eval::eval(&self.root, bindings)
    }

    /// Evaluate as a condition: must yield a boolean (empty is false).
    pub fn test<B: Bindings + ?Sized>(&self, bindings: &B) -> EvalResult<bool> {
        truthy(&self.eval(bindings)?)
    }

    /// Field names referenced, in order of first appearance.
    pub fn fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        self.root.collect_fields(&mut fields);
        fields
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parse and evaluate `expression` in one step.
pub fn evaluate<B: Bindings + ?Sized>(expression: &str, bindings: &B) -> EvalResult<Value> {
    Expr::parse(expression)?.eval(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, FileSpec};

    fn fields(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn eval_str(expression: &str, bindings: &HashMap<String, Value>) -> EvalResult<String> {
        evaluate(expression, bindings).map(|v| v.to_string())
    }

    #[test]
    fn test_exact_arithmetic() {
        let b = fields(&[("a", Value::Text("0.1".into())), ("b", Value::Text("0.2".into()))]);
        assert_eq!(eval_str("a + 0.2", &b).unwrap(), "0.3");
        assert_eq!(eval_str("(1 + 2) * 3 - 4 / 2", &b).unwrap(), "7");
        assert_eq!(eval_str("-a * 10", &b).unwrap(), "-1");
        assert_eq!(eval_str("10 / 4", &b).unwrap(), "2.5");
    }

    #[test]
    fn test_text_concatenation() {
        let b = fields(&[("Symbol", "AAPL".into())]);
        assert_eq!(eval_str("Symbol + '-USD'", &b).unwrap(), "AAPL-USD");
        assert!(matches!(evaluate("Symbol * 2", &b), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_empty_values() {
        let b = fields(&[("Fee", Value::Null), ("Note", Value::Text(String::new()))]);
        assert_eq!(eval_str("Fee + 5", &b).unwrap(), "5");
        assert_eq!(eval_str("Fee == ''", &b).unwrap(), "true");
        assert_eq!(eval_str("Note == ''", &b).unwrap(), "true");
        assert_eq!(eval_str("not Fee", &b).unwrap(), "true");
    }

    #[test]
    fn test_comparisons_and_logic() {
        let b = fields(&[("Type", "BUY".into()), ("Quantity", Value::Text("10".into()))]);
        assert_eq!(eval_str("Type == 'BUY' and Quantity > 5", &b).unwrap(), "true");
        assert_eq!(eval_str("Type != \"BUY\" or Quantity <= 9", &b).unwrap(), "false");
        assert_eq!(eval_str("Quantity == 10.0", &b).unwrap(), "true");
        assert_eq!(eval_str("Type in ['BUY', 'SELL']", &b).unwrap(), "true");
        assert_eq!(eval_str("Type not in ('BUY',)", &b).unwrap(), "false");
        assert_eq!(eval_str("true and not false", &b).unwrap(), "true");
    }

    #[test]
    fn test_logic_short_circuits() {
        let b = fields(&[("x", Value::from(0i64))]);
        assert_eq!(eval_str("x != 0 and 1 / x > 1", &b).unwrap(), "false");
        assert_eq!(eval_str("x == 0 or Missing == 1", &b).unwrap(), "true");
    }

    #[test]
    fn test_functions() {
        let b = fields(&[("p", Value::Text("-2.345".into()))]);
        assert_eq!(eval_str("abs(p)", &b).unwrap(), "2.345");
        assert_eq!(eval_str("round(p, 2)", &b).unwrap(), "-2.35");
        assert_eq!(eval_str("round(2.5)", &b).unwrap(), "3");
        assert_eq!(eval_str("min(3, p, 1)", &b).unwrap(), "-2.345");
        assert_eq!(eval_str("max(3, p, 1)", &b).unwrap(), "3");
        assert!(matches!(evaluate("round(p, 1.5)", &b), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_errors() {
        let b = fields(&[("x", Value::from(1i64)), ("flag", Value::Text("yes".into()))]);
        assert_eq!(evaluate("x / 0", &b), Err(EvalError::DivisionByZero));
        assert_eq!(evaluate("y + 1", &b), Err(EvalError::UnknownField("y".into())));
        assert!(matches!(evaluate("flag and true", &b), Err(EvalError::TypeMismatch(_))));
        assert!(matches!(evaluate("x < 'abc'", &b), Err(EvalError::TypeMismatch(_))));
        assert_eq!(
            evaluate("79228162514264337593543950335 * 2", &b),
            Err(EvalError::Overflow)
        );
    }

    #[test]
    fn test_rejects_code_execution() {
        let b = fields(&[]);
        for source in [
            "__import__('os')",
            "open('/etc/passwd')",
            "x.__class__",
            "exec('1')",
            "a; b",
            "lambda: 1",
        ] {
            let err = evaluate(source, &b).unwrap_err();
            assert!(
                matches!(err, EvalError::UnsupportedToken { .. }),
                "{} gave {:?}",
                source,
                err
            );
        }
    }

    #[test]
    fn test_record_bindings_use_source_types() {
        let spec = FileSpec::new("src", "Source")
            .with_column(ColumnSpec::new("Price", ColumnType::Money))
            .with_column(ColumnSpec::new("Quantity", ColumnType::Float))
            .with_column(ColumnSpec::new("Date", ColumnType::Datetime));

        let record: SourceRecord = [
            ("Price", "$1,500.10"),
            ("Quantity", "0.5"),
            ("Date", "2024-01-15 10:30:00"),
            ("Note", "x"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let bindings = RecordBindings::new(&record, Some(&spec));
        assert_eq!(evaluate("Price * Quantity", &bindings).unwrap().to_string(), "750.05");
        assert_eq!(evaluate("Date", &bindings).unwrap().to_string(), "2024-01-15T10:30:00");
        assert_eq!(evaluate("Note", &bindings).unwrap(), Value::Text("x".into()));

        let untyped = RecordBindings::new(&record, None);
        assert!(matches!(evaluate("Price * 2", &untyped), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_parse_once_eval_many() {
        let expr = Expr::parse("`Unit price` * Qty").unwrap();
        assert_eq!(expr.fields(), vec!["Unit price", "Qty"]);
        assert_eq!(expr.source(), "`Unit price` * Qty");

        for (price, qty, expected) in [(2i64, 3i64, "6"), (5, 5, "25")] {
            let b = fields(&[("Unit price", Value::from(price)), ("Qty", Value::from(qty))]);
            assert_eq!(expr.eval(&b).unwrap().to_string(), expected);
        }
    }
}
