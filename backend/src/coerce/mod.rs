//! Type coercion between raw CSV cells and typed values.
//!
//! [`parse`] reads a raw string as a [`ColumnType`], [`format`] renders a
//! [`TypedValue`] back to its canonical string. [`coerce`] does both for a
//! destination column, honouring its `date_format`.
//!
//! Empty or whitespace-only cells of non-string columns parse to
//! [`TypedValue::Empty`]; whether an empty value is acceptable is decided by
//! the column's `required` flag, not here.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::{CoerceResult, TypeError};
use crate::models::{ColumnSpec, ColumnType};

/// Decimal places of canonical money output.
pub const MONEY_SCALE: u32 = 2;

/// Canonical date format.
pub const ISO_DATE: &str = "%Y-%m-%d";

/// Canonical datetime format.
pub const ISO_DATETIME: &str = "%Y-%m-%dT%H:%M:%S";

const ISO_DATETIME_PARSE: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// At most one 3-letter currency code and one currency symbol on each side of an amount.
static MONEY_EDGES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[A-Z]{3}\s*)?(?:\p{Sc}\s*)?(?P<body>.*?)(?:\s*\p{Sc})?(?:\s*[A-Z]{3})?$")
        .expect("valid money regex")
});

static MONEY_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(\.\d*)?|\.\d+)$").expect("valid amount regex"));

/// A parsed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    /// Blank cell of a non-string column.
    Empty,
    Text(String),
    Integer(i64),
    Float(f64),
    Money(Decimal),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
}

impl TypedValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, TypedValue::Empty)
    }
}

/// Parse a raw cell as `column_type`, using ISO-8601 for dates.
pub fn parse(raw: &str, column_type: ColumnType) -> CoerceResult<TypedValue> {
    parse_with_format(raw, column_type, None)
}

/// Parse a raw cell as `column_type`, reading dates with `date_format` when given.
pub fn parse_with_format(
    raw: &str,
    column_type: ColumnType,
    date_format: Option<&str>,
) -> CoerceResult<TypedValue> {
    if column_type == ColumnType::String {
        return Ok(TypedValue::Text(raw.to_string()));
    }

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(TypedValue::Empty);
    }

    let fail = |reason: String| TypeError::new(column_type, raw, reason);

    match column_type {
        ColumnType::String => Ok(TypedValue::Text(raw.to_string())),
        ColumnType::Integer => i64::from_str(trimmed)
            .map(TypedValue::Integer)
            .map_err(|_| fail("not a whole number".into())),
        ColumnType::Float => match f64::from_str(trimmed) {
            Ok(f) if f.is_finite() => Ok(TypedValue::Float(f)),
            _ => Err(fail("not a number".into())),
        },
        ColumnType::Money => parse_money(trimmed).map(TypedValue::Money).map_err(fail),
        ColumnType::Boolean => parse_boolean(trimmed)
            .map(TypedValue::Boolean)
            .ok_or_else(|| fail("expected one of true, false, 1, 0, yes, no".into())),
        ColumnType::Date => match date_format {
            Some(fmt) => parse_datetime_with(trimmed, fmt).map(|dt| TypedValue::Date(dt.date())),
            None => parse_iso_date(trimmed)
                .map(TypedValue::Date)
                .ok_or_else(|| "not an ISO-8601 date".to_string()),
        }
        .map_err(fail),
        ColumnType::Datetime => match date_format {
            Some(fmt) => parse_datetime_with(trimmed, fmt).map(TypedValue::DateTime),
            None => parse_iso_datetime(trimmed)
                .map(TypedValue::DateTime)
                .ok_or_else(|| "not an ISO-8601 datetime".to_string()),
        }
        .map_err(fail),
    }
}

/// Render a value in the canonical form of `column_type`.
pub fn format(value: &TypedValue, column_type: ColumnType) -> String {
    match value {
        TypedValue::Empty => String::new(),
        TypedValue::Text(s) => s.clone(),
        TypedValue::Integer(i) => i.to_string(),
        TypedValue::Float(f) => f.to_string(),
        TypedValue::Money(d) => format_money(*d),
        TypedValue::Date(d) => match column_type {
            ColumnType::Datetime => d.and_time(NaiveTime::MIN).format(ISO_DATETIME).to_string(),
            _ => d.format(ISO_DATE).to_string(),
        },
        TypedValue::DateTime(dt) => match column_type {
            ColumnType::Date => dt.date().format(ISO_DATE).to_string(),
            _ => dt.format(ISO_DATETIME).to_string(),
        },
        TypedValue::Boolean(b) => b.to_string(),
    }
}

/// Render a value, using `date_format` for dates when given.
pub fn format_with(
    value: &TypedValue,
    column_type: ColumnType,
    date_format: Option<&str>,
) -> CoerceResult<String> {
    let datetime = match (value, date_format) {
        (TypedValue::Date(d), Some(_)) => d.and_time(NaiveTime::MIN),
        (TypedValue::DateTime(dt), Some(_)) => *dt,
        _ => return Ok(format(value, column_type)),
    };
    let fmt = date_format.unwrap_or(ISO_DATETIME);
    render_datetime(&datetime, fmt).map_err(|reason| TypeError::new(column_type, format(value, column_type), reason))
}

/// Parse then format `raw` according to a destination column.
pub fn coerce(raw: &str, column: &ColumnSpec) -> CoerceResult<String> {
    let date_format = column.date_format.as_deref();
    let value = parse_with_format(raw, column.column_type, date_format)?;
    format_with(&value, column.column_type, date_format)
}

/// Canonical money string: exactly [`MONEY_SCALE`] decimals.
pub fn format_money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    if rounded.is_zero() {
        rounded.set_sign_positive(true);
    }
    rounded.to_string()
}

fn parse_money(trimmed: &str) -> Result<Decimal, String> {
    let mut s = trimmed;
    let mut negative = false;

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        if negative {
            return Err("conflicting negative notations".into());
        }
        negative = true;
        s = rest;
    }

    let body = MONEY_EDGES
        .captures(s)
        .and_then(|c| c.name("body"))
        .map(|m| m.as_str().trim())
        .unwrap_or("");

    let body = match body.strip_prefix('-') {
        Some(rest) if negative => return Err(format!("conflicting negative notations in '{}'", rest)),
        Some(rest) => {
            negative = true;
            rest.trim()
        }
        None => body,
    };

    let digits = body.replace(',', "");
    if !MONEY_AMOUNT.is_match(&digits) {
        return Err("not a monetary amount".into());
    }

    let digits = format!("0{}", digits.trim_end_matches('.'));
    let amount = Decimal::from_str(&digits).map_err(|e| e.to_string())?;
    Ok(if negative { -amount } else { amount })
}

fn parse_boolean(trimmed: &str) -> Option<bool> {
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, ISO_DATE)
        .ok()
        .or_else(|| parse_iso_datetime(s).map(|dt| dt.date()))
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    ISO_DATETIME_PARSE
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_local()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, ISO_DATE)
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Check a strftime format string, returning its items.
pub fn compile_format(fmt: &str) -> Result<Vec<Item<'_>>, String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format '{}'", fmt));
    }
    Ok(items)
}

/// Parse `s` with an explicit strftime format. Date-only formats yield midnight.
pub fn parse_datetime_with(s: &str, fmt: &str) -> Result<NaiveDateTime, String> {
    compile_format(fmt)?;
    NaiveDateTime::parse_from_str(s, fmt)
        .or_else(|_| NaiveDate::parse_from_str(s, fmt).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|e| format!("'{}' does not match format '{}': {}", s, fmt, e))
}

/// Render a datetime with an explicit strftime format.
pub fn render_datetime(dt: &NaiveDateTime, fmt: &str) -> Result<String, String> {
    let items = compile_format(fmt)?;
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter()))
        .map_err(|_| format!("format '{}' cannot render a date without timezone", fmt))?;
    Ok(out)
}
