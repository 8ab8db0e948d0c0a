//! Field transforms.
//!
//! A [`TransformSpec`] produces the value of one destination column from a
//! source record. Every kind except `date_format` is then coerced through
//! the destination column type, and the column's `required` / `max_length`
//! constraints are checked.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::coerce;
use crate::error::{TransformError, TransformResult};
use crate::expr::{Expr, RecordBindings};
use crate::models::{literal, literal_opt, ColumnSpec, SourceRecord, SourceSpec};

/// Lookup table key holding the fallback value.
pub const LOOKUP_DEFAULT_KEY: &str = "_default";

/// Fractional seconds directly after a `HH:MM:SS` time.
static FRACTIONAL_SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2}:\d{2}:\d{2})\.\d+$").expect("valid fraction regex"));

/// All transform kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformSpec {
    /// Copy a source field.
    Direct { source: String },

    /// Emit a fixed literal.
    Constant {
        #[serde(deserialize_with = "literal")]
        value: String,
    },

    /// Reparse a source date with `input_format` and render it with `output_format`.
    DateFormat {
        source: String,
        #[serde(default = "default_input_format")]
        input_format: String,
        #[serde(default = "default_output_format")]
        output_format: String,
    },

    /// Map the source value through a table; `_default` is the fallback.
    Lookup {
        source: String,
        #[serde(default)]
        table: BTreeMap<String, Option<String>>,
    },

    /// Append a literal to the source value.
    Suffix {
        source: String,
        #[serde(deserialize_with = "literal")]
        value: String,
        /// Only applied when this expression is true.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },

    /// Prepend a literal to the source value.
    Prefix {
        source: String,
        #[serde(deserialize_with = "literal")]
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },

    /// Evaluate an arithmetic expression over source fields.
    Formula { expression: String },

    /// First branch whose `if` holds gives the value.
    Conditional {
        #[serde(default)]
        conditions: Vec<ConditionalBranch>,
        #[serde(
            rename = "_default",
            alias = "else",
            default,
            deserialize_with = "literal_opt",
            skip_serializing_if = "Option::is_none"
        )]
        default: Option<String>,
    },
}

/// One branch of a `conditional` transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionalBranch {
    When {
        #[serde(rename = "if")]
        condition: String,
        #[serde(deserialize_with = "literal")]
        then: String,
    },
    /// Unconditional branch, `{"else": value}`.
    Otherwise {
        #[serde(rename = "else", deserialize_with = "literal")]
        otherwise: String,
    },
}

fn default_input_format() -> String {
    "%Y-%m-%dT%H:%M:%S".to_string()
}

fn default_output_format() -> String {
    coerce::ISO_DATE.to_string()
}

impl TransformSpec {
    pub fn direct(source: impl Into<String>) -> Self {
        TransformSpec::Direct { source: source.into() }
    }

    pub fn constant(value: impl Into<String>) -> Self {
        TransformSpec::Constant { value: value.into() }
    }

    pub fn date_format(source: impl Into<String>, input_format: &str, output_format: &str) -> Self {
        TransformSpec::DateFormat {
            source: source.into(),
            input_format: input_format.to_string(),
            output_format: output_format.to_string(),
        }
    }

    pub fn lookup<K, V>(source: impl Into<String>, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        TransformSpec::Lookup {
            source: source.into(),
            table: entries
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        }
    }

    pub fn suffix(source: impl Into<String>, value: impl Into<String>) -> Self {
        TransformSpec::Suffix {
            source: source.into(),
            value: value.into(),
            condition: None,
        }
    }

    pub fn prefix(source: impl Into<String>, value: impl Into<String>) -> Self {
        TransformSpec::Prefix {
            source: source.into(),
            value: value.into(),
            condition: None,
        }
    }

    /// Guard a suffix or prefix with an expression. Other kinds are unchanged.
    pub fn when(mut self, expression: impl Into<String>) -> Self {
        if let TransformSpec::Suffix { condition, .. } | TransformSpec::Prefix { condition, .. } = &mut self {
            *condition = Some(expression.into());
        }
        self
    }

    pub fn formula(expression: impl Into<String>) -> Self {
        TransformSpec::Formula {
            expression: expression.into(),
        }
    }

    pub fn conditional(branches: Vec<(&str, &str)>, default: Option<&str>) -> Self {
        TransformSpec::Conditional {
            conditions: branches
                .into_iter()
                .map(|(condition, then)| ConditionalBranch::When {
                    condition: condition.to_string(),
                    then: then.to_string(),
                })
                .collect(),
            default: default.map(str::to_string),
        }
    }

    /// Snake-case name of the kind, as used in JSON.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformSpec::Direct { .. } => "direct",
            TransformSpec::Constant { .. } => "constant",
            TransformSpec::DateFormat { .. } => "date_format",
            TransformSpec::Lookup { .. } => "lookup",
            TransformSpec::Suffix { .. } => "suffix",
            TransformSpec::Prefix { .. } => "prefix",
            TransformSpec::Formula { .. } => "formula",
            TransformSpec::Conditional { .. } => "conditional",
        }
    }

    /// The single source field this transform reads, if any.
    pub fn source_field(&self) -> Option<&str> {
        match self {
            TransformSpec::Direct { source }
            | TransformSpec::DateFormat { source, .. }
            | TransformSpec::Lookup { source, .. }
            | TransformSpec::Suffix { source, .. }
            | TransformSpec::Prefix { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Expressions embedded in this transform.
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            TransformSpec::Formula { expression } => vec![expression.as_str()],
            TransformSpec::Suffix { condition: Some(c), .. } | TransformSpec::Prefix { condition: Some(c), .. } => {
                vec![c.as_str()]
            }
            TransformSpec::Conditional { conditions, .. } => conditions
                .iter()
                .filter_map(|branch| match branch {
                    ConditionalBranch::When { condition, .. } => Some(condition.as_str()),
                    ConditionalBranch::Otherwise { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Produce the destination value for `column`.
    ///
    /// `source_spec` types the fields seen by expressions.
    pub fn apply(
        &self,
        record: &SourceRecord,
        source_spec: Option<&SourceSpec>,
        column: &ColumnSpec,
    ) -> TransformResult<String> {
        let raw = self.produce(record, source_spec)?;

        let value = match self {
            TransformSpec::DateFormat { .. } => raw,
            _ => coerce::coerce(&raw, column)?,
        };

        check_constraints(value, column)
    }

    /// Raw output before destination coercion.
    fn produce(&self, record: &SourceRecord, source_spec: Option<&SourceSpec>) -> TransformResult<String> {
        let bindings = || RecordBindings::new(record, source_spec);

        match self {
            TransformSpec::Direct { source } => source_value(record, source).map(str::to_string),

            TransformSpec::Constant { value } => Ok(value.clone()),

            TransformSpec::DateFormat {
                source,
                input_format,
                output_format,
            } => {
                let value = source_value(record, source)?;
                if value.trim().is_empty() {
                    return Ok(String::new());
                }
                reformat_date(value, input_format, output_format)
            }

            TransformSpec::Lookup { source, table } => {
                let value = source_value(record, source)?;
                apply_lookup(value, table)
            }

            TransformSpec::Suffix {
                source,
                value: suffix,
                condition,
            } => {
                let value = source_value(record, source)?;
                if value.is_empty() || !condition_holds(condition.as_deref(), &bindings())? {
                    return Ok(value.to_string());
                }
                Ok(format!("{}{}", value, suffix))
            }

            TransformSpec::Prefix {
                source,
                value: prefix,
                condition,
            } => {
                let value = source_value(record, source)?;
                if value.is_empty() || !condition_holds(condition.as_deref(), &bindings())? {
                    return Ok(value.to_string());
                }
                Ok(format!("{}{}", prefix, value))
            }

            TransformSpec::Formula { expression } => {
                let result = Expr::parse(expression)?.eval(&bindings())?;
                Ok(result.to_string())
            }

            TransformSpec::Conditional { conditions, default } => {
                let bindings = bindings();
                for branch in conditions {
                    match branch {
                        ConditionalBranch::When { condition, then } => {
                            if Expr::parse(condition)?.test(&bindings)? {
                                return Ok(then.clone());
                            }
                        }
                        ConditionalBranch::Otherwise { otherwise } => return Ok(otherwise.clone()),
                    }
                }
                default.clone().ok_or(TransformError::NoConditionMatched)
            }
        }
    }
}

fn source_value<'r>(record: &'r SourceRecord, field: &str) -> TransformResult<&'r str> {
    record
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| TransformError::MissingField(field.to_string()))
}

fn condition_holds(condition: Option<&str>, bindings: &RecordBindings<'_>) -> TransformResult<bool> {
    match condition {
        None => Ok(true),
        Some(expression) => Ok(Expr::parse(expression)?.test(bindings)?),
    }
}

fn apply_lookup(value: &str, table: &BTreeMap<String, Option<String>>) -> TransformResult<String> {
    if value != LOOKUP_DEFAULT_KEY {
        if let Some(mapped) = table.get(value) {
            return Ok(mapped.clone().unwrap_or_default());
        }
    }
    match table.get(LOOKUP_DEFAULT_KEY) {
        Some(Some(default)) => Ok(default.clone()),
        _ => Err(TransformError::LookupMiss(value.to_string())),
    }
}

/// Reparse `value` with `input_format` and render it with `output_format`.
///
/// A trailing `Z` and fractional seconds are dropped first unless the input
/// format reads them.
pub fn reformat_date(value: &str, input_format: &str, output_format: &str) -> TransformResult<String> {
    let mut cleaned = value.trim().to_string();

    if cleaned.contains('T') && !input_format.contains('Z') && !input_format.contains("%z") {
        if let Some(stripped) = cleaned.strip_suffix('Z') {
            cleaned = stripped.to_string();
        }
    }
    if !input_format.contains("%f") && !input_format.contains("%.f") {
        cleaned = FRACTIONAL_SECONDS.replace(&cleaned, "$1").into_owned();
    }

    let date_error = |message: String| TransformError::DateParse {
        value: value.to_string(),
        message,
    };

    let parsed = coerce::parse_datetime_with(&cleaned, input_format).map_err(date_error)?;
    coerce::render_datetime(&parsed, output_format).map_err(date_error)
}

/// Enforce `required` and `max_length` on a produced value.
pub fn check_constraints(value: String, column: &ColumnSpec) -> TransformResult<String> {
    if column.required && value.trim().is_empty() {
        return Err(TransformError::Required);
    }
    if let Some(max) = column.max_length {
        let length = value.chars().count();
        if length > max {
            return Err(TransformError::TooLong { length, max });
        }
    }
    Ok(value)
}

/// Reference table of transform kinds, printed by the CLI.
pub fn transforms_description() -> String {
    r#"Available field transforms:

| Type | Description | Parameters |
|------|-------------|------------|
| direct | Copy a source field, coerced to the column type | source |
| constant | Fixed literal | value |
| date_format | Reparse and reformat a date | source, input_format (default "%Y-%m-%dT%H:%M:%S"), output_format (default "%Y-%m-%d") |
| lookup | Map the source value through a table | source, table: {from: to, "_default": fallback} |
| suffix | Append a literal to a non-empty source value | source, value, condition (optional expression) |
| prefix | Prepend a literal to a non-empty source value | source, value, condition (optional expression) |
| formula | Arithmetic over source fields | expression |
| conditional | First matching branch wins | conditions: [{"if": expr, "then": value}], _default |

Expressions support field names (`backticks` for names with spaces), numbers,
'strings', + - * /, == != < > <= >=, and / or / not, in [..] / not in [..],
and the functions abs, round, min, max.

Example field mappings in JSON:
[
  {"destination_column": "date", "transform": {"type": "date_format", "source": "Date"}},
  {"destination_column": "type", "transform": {"type": "lookup", "source": "Type", "table": {"BUY": "BUY", "SELL": "SELL", "_default": "ITEM"}}},
  {"destination_column": "total", "transform": {"type": "formula", "expression": "Quantity * `Price per share`"}}
]"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, EvalError};
    use crate::models::ColumnType;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn text() -> ColumnSpec {
        ColumnSpec::new("out", ColumnType::String)
    }

    #[test]
    fn test_direct_matches_coerce() {
        let row = record(&[("Price", " 1,500.5 ")]);
        let money = ColumnSpec::new("price", ColumnType::Money);
        let applied = TransformSpec::direct("Price").apply(&row, None, &money).unwrap();
        assert_eq!(applied, coerce::coerce(" 1,500.5 ", &money).unwrap());
        assert_eq!(applied, "1500.50");
    }

    #[test]
    fn test_direct_missing_field() {
        let err = TransformSpec::direct("Nope").apply(&record(&[]), None, &text()).unwrap_err();
        assert_eq!(err, TransformError::MissingField("Nope".into()));
    }

    #[test]
    fn test_direct_type_error() {
        let row = record(&[("Qty", "ten")]);
        let err = TransformSpec::direct("Qty")
            .apply(&row, None, &ColumnSpec::new("qty", ColumnType::Integer))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
    }

    #[test]
    fn test_constant_is_coerced() {
        let row = record(&[]);
        let boolean = ColumnSpec::new("flag", ColumnType::Boolean);
        assert_eq!(TransformSpec::constant("YES").apply(&row, None, &boolean).unwrap(), "true");
        assert!(TransformSpec::constant("maybe").apply(&row, None, &boolean).is_err());
    }

    #[test]
    fn test_date_format() {
        let row = record(&[("Date", "2024-01-15T10:30:00.123456Z")]);
        let spec = TransformSpec::date_format("Date", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y");
        assert_eq!(spec.apply(&row, None, &text()).unwrap(), "15/01/2024");

        let dotted = record(&[("Date", "15.01.2024")]);
        let spec = TransformSpec::date_format("Date", "%d.%m.%Y", "%Y-%m-%d");
        assert_eq!(spec.apply(&dotted, None, &text()).unwrap(), "2024-01-15");
    }

    #[test]
    fn test_date_format_errors() {
        let row = record(&[("Date", "15/01/2024")]);
        let err = TransformSpec::date_format("Date", "%Y-%m-%d", "%Y")
            .apply(&row, None, &text())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DateParseError);

        let err = TransformSpec::date_format("Date", "%d/%m/%Y", "%Q")
            .apply(&row, None, &text())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DateParseError);
    }

    #[test]
    fn test_date_format_empty_source() {
        let row = record(&[("Date", "")]);
        let spec = TransformSpec::date_format("Date", "%Y-%m-%d", "%Y");
        assert_eq!(spec.apply(&row, None, &text()).unwrap(), "");
        assert_eq!(
            spec.apply(&row, None, &text().required()).unwrap_err(),
            TransformError::Required
        );
    }

    #[test]
    fn test_lookup() {
        let spec: TransformSpec = serde_json::from_value(json!({
            "type": "lookup",
            "source": "Type",
            "table": {"BUY": "B", "SELL": "S", "NOOP": null}
        }))
        .unwrap();

        assert_eq!(spec.apply(&record(&[("Type", "BUY")]), None, &text()).unwrap(), "B");
        assert_eq!(spec.apply(&record(&[("Type", "NOOP")]), None, &text()).unwrap(), "");
        assert_eq!(
            spec.apply(&record(&[("Type", "buy")]), None, &text()).unwrap_err(),
            TransformError::LookupMiss("buy".into())
        );
    }

    #[test]
    fn test_lookup_default() {
        let spec = TransformSpec::lookup("Type", [("BUY", "B"), ("_default", "OTHER")]);
        assert_eq!(spec.apply(&record(&[("Type", "HOLD")]), None, &text()).unwrap(), "OTHER");

        let null_default: TransformSpec = serde_json::from_value(json!({
            "type": "lookup",
            "source": "Type",
            "table": {"BUY": "B", "_default": null}
        }))
        .unwrap();
        assert_eq!(
            null_default.apply(&record(&[("Type", "HOLD")]), None, &text()).unwrap_err().kind(),
            ErrorKind::LookupMiss
        );
    }

    #[test]
    fn test_suffix_prefix() {
        let row = record(&[("Symbol", "BTC"), ("Type", "BUY"), ("Empty", "")]);
        assert_eq!(TransformSpec::suffix("Symbol", "-USD").apply(&row, None, &text()).unwrap(), "BTC-USD");
        assert_eq!(TransformSpec::prefix("Symbol", "X:").apply(&row, None, &text()).unwrap(), "X:BTC");
        assert_eq!(TransformSpec::suffix("Empty", "-USD").apply(&row, None, &text()).unwrap(), "");
        assert_eq!(
            TransformSpec::suffix("Missing", "-USD").apply(&row, None, &text()).unwrap_err(),
            TransformError::MissingField("Missing".into())
        );
    }

    #[test]
    fn test_suffix_condition() {
        let spec: TransformSpec = serde_json::from_value(json!({
            "type": "suffix",
            "source": "Symbol",
            "value": "-USD",
            "condition": "Currency == 'USD'"
        }))
        .unwrap();

        let usd = record(&[("Symbol", "BTC"), ("Currency", "USD")]);
        let eur = record(&[("Symbol", "BTC"), ("Currency", "EUR")]);
        assert_eq!(spec.apply(&usd, None, &text()).unwrap(), "BTC-USD");
        assert_eq!(spec.apply(&eur, None, &text()).unwrap(), "BTC");
    }

    #[test]
    fn test_formula() {
        let row = record(&[("Quantity", "10"), ("Price", "150.00")]);
        let money = ColumnSpec::new("total", ColumnType::Money);
        assert_eq!(TransformSpec::formula("Quantity * Price").apply(&row, None, &money).unwrap(), "1500.00");

        let err = TransformSpec::formula("Quantity / 0").apply(&row, None, &money).unwrap_err();
        assert_eq!(err, TransformError::Eval(EvalError::DivisionByZero));

        let err = TransformSpec::formula("Missing * 2").apply(&row, None, &money).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownField);

        let err = TransformSpec::formula("__import__('os')").apply(&row, None, &money).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedToken);
    }

    #[test]
    fn test_conditional() {
        let spec = TransformSpec::conditional(
            vec![("Type == 'BUY'", "B"), ("Type in ['SELL', 'SHORT']", "S")],
            None,
        );
        assert_eq!(spec.apply(&record(&[("Type", "SHORT")]), None, &text()).unwrap(), "S");
        assert_eq!(
            spec.apply(&record(&[("Type", "HOLD")]), None, &text()).unwrap_err(),
            TransformError::NoConditionMatched
        );

        let with_default = TransformSpec::conditional(vec![("Type == 'BUY'", "B")], Some("X"));
        assert_eq!(with_default.apply(&record(&[("Type", "HOLD")]), None, &text()).unwrap(), "X");
    }

    #[test]
    fn test_conditional_json_forms() {
        let spec: TransformSpec = serde_json::from_value(json!({
            "type": "conditional",
            "conditions": [
                {"if": "Amount > 0", "then": "IN"},
                {"else": "OUT"}
            ]
        }))
        .unwrap();
        assert_eq!(spec.apply(&record(&[("Amount", "-5")]), None, &text()).unwrap(), "OUT");

        let spec: TransformSpec = serde_json::from_value(json!({
            "type": "conditional",
            "conditions": [{"if": "Amount > 0", "then": 1}],
            "else": 0
        }))
        .unwrap();
        assert_eq!(spec.apply(&record(&[("Amount", "-5")]), None, &text()).unwrap(), "0");
    }

    #[test]
    fn test_constraints() {
        let row = record(&[("Name", "abcdef")]);
        let short = text().with_max_length(3);
        assert_eq!(
            TransformSpec::direct("Name").apply(&row, None, &short).unwrap_err(),
            TransformError::TooLong { length: 6, max: 3 }
        );
        let required = text().required();
        assert_eq!(
            TransformSpec::constant("  ").apply(&row, None, &required).unwrap_err(),
            TransformError::Required
        );
    }

    #[test]
    fn test_expressions_listed() {
        let spec = TransformSpec::conditional(vec![("a == 1", "x"), ("b == 2", "y")], None);
        assert_eq!(spec.expressions(), vec!["a == 1", "b == 2"]);
        assert_eq!(TransformSpec::direct("a").expressions(), Vec::<&str>::new());
        assert_eq!(TransformSpec::direct("a").source_field(), Some("a"));
        assert_eq!(TransformSpec::formula("a").kind(), "formula");
    }

    proptest! {
        #[test]
        fn prop_lookup_returns_table_entries(
            table in prop::collection::btree_map("[A-Z]{1,8}", "[a-z]{0,8}", 1..8),
            miss in "[0-9]{1,4}",
        ) {
            let spec = TransformSpec::lookup("Type", table.clone());
            for (key, expected) in &table {
                let row = record(&[("Type", key.as_str())]);
                prop_assert_eq!(&spec.apply(&row, None, &text()).unwrap(), expected);
            }

            let row = record(&[("Type", miss.as_str())]);
            prop_assert_eq!(spec.apply(&row, None, &text()).unwrap_err(), TransformError::LookupMiss(miss.clone()));

            let mut with_default = table.clone();
            with_default.insert("_default".to_string(), "fallback".to_string());
            let spec = TransformSpec::lookup("Type", with_default);
            prop_assert_eq!(spec.apply(&row, None, &text()).unwrap(), "fallback");
        }

        #[test]
        fn prop_date_format_idempotent(days in 0i64..100_000, format_idx in 0usize..3) {
            let format = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y"][format_idx];
            let date = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap() + chrono::Duration::days(days);
            let input = date.format(format).to_string();

            let once = reformat_date(&input, format, format).unwrap();
            let twice = reformat_date(&once, format, format).unwrap();
            prop_assert_eq!(&once, &input);
            prop_assert_eq!(once, twice);
        }
    }
}
