//! Domain models shared by every stage of a conversion.
//!
//! - [`ColumnType`] - declared type of a column
//! - [`ColumnSpec`] - one column of a source or destination schema
//! - [`FileSpec`] - a named schema ([`SourceSpec`] / [`DestinationSpec`])
//! - [`SourceRecord`] - one raw input row
//! - [`DestinationRecord`] - one converted output row, in column order

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// Records
// =============================================================================

/// One row of input: source column name to raw cell value.
pub type SourceRecord = HashMap<String, String>;

/// One converted row: destination column name to formatted value.
///
/// Column order follows the destination spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationRecord(IndexMap<String, String>);

impl DestinationRecord {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DestinationRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// =============================================================================
// Column Type
// =============================================================================

/// Declared type of a column. Determines parse and format rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Float,
    Date,
    Datetime,
    Money,
    Boolean,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
            ColumnType::Datetime => "datetime",
            ColumnType::Money => "money",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Column Spec
// =============================================================================

/// Specification for a single column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,

    #[serde(rename = "type", default)]
    pub column_type: ColumnType,

    /// Original column name in the source file, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,

    /// Maximum length in characters of the formatted value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// An empty output value is a field error.
    #[serde(default)]
    pub required: bool,

    /// Value emitted when no field mapping targets this column.
    #[serde(default, deserialize_with = "literal_opt", skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// strftime format replacing ISO-8601 for date/datetime columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            source_name: None,
            max_length: None,
            required: false,
            default: None,
            date_format: None,
        }
    }

    /// Mark as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }
}

// =============================================================================
// File Spec
// =============================================================================

/// Specification for a file format (source or destination).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Directory (relative to the in/out root) holding files of this format.
    #[serde(default)]
    pub default_directory: String,

    #[serde(default)]
    pub columns: Vec<ColumnSpec>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    #[serde(default = "default_encoding")]
    pub encoding: String,

    #[serde(default = "default_has_header")]
    pub has_header: bool,
}

/// A schema describing input files.
pub type SourceSpec = FileSpec;

/// A schema describing output files.
pub type DestinationSpec = FileSpec;

fn default_delimiter() -> char {
    ','
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

fn default_has_header() -> bool {
    true
}

impl FileSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            default_directory: String::new(),
            columns: Vec::new(),
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            has_header: default_has_header(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<String>) -> Self {
        self.default_directory = directory.into();
        self
    }

    /// Add a column to the spec
    pub fn with_column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Column names declared more than once.
    pub fn duplicate_columns(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut duplicates: Vec<String> = self
            .columns
            .iter()
            .filter(|c| !seen.insert(c.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        duplicates.dedup();
        duplicates
    }
}

// =============================================================================
// Literal helpers
// =============================================================================

/// Read a configured literal (string, number or boolean) as text.
pub(crate) fn literal<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    literal_text(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a string, number or boolean literal, found {}", value))
    })
}

/// Like [`literal`], with `null` read as absent.
pub(crate) fn literal_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    literal_text(&value).map(Some).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a string, number or boolean literal, found {}", value))
    })
}

fn literal_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_spec_from_json() {
        let column: ColumnSpec = serde_json::from_value(json!({
            "name": "fee",
            "type": "money",
            "default": 0,
            "required": true
        }))
        .unwrap();

        assert_eq!(column.column_type, ColumnType::Money);
        assert_eq!(column.default.as_deref(), Some("0"));
        assert!(column.required);
        assert!(column.max_length.is_none());
    }

    #[test]
    fn test_null_default_is_absent() {
        let column: ColumnSpec = serde_json::from_value(json!({
            "name": "symbol",
            "default": null
        }))
        .unwrap();
        assert_eq!(column.column_type, ColumnType::String);
        assert!(column.default.is_none());
    }

    #[test]
    fn test_file_spec_defaults() {
        let spec: FileSpec = serde_json::from_value(json!({
            "id": "ghostfolio",
            "name": "Ghostfolio",
            "columns": [{ "name": "date", "type": "date" }]
        }))
        .unwrap();

        assert_eq!(spec.delimiter, ',');
        assert_eq!(spec.encoding, "utf-8");
        assert!(spec.has_header);
        assert_eq!(spec.column("date").unwrap().column_type, ColumnType::Date);
        assert!(spec.column("missing").is_none());
    }

    #[test]
    fn test_duplicate_columns() {
        let spec = FileSpec::new("s", "S")
            .with_column(ColumnSpec::new("a", ColumnType::String))
            .with_column(ColumnSpec::new("b", ColumnType::String))
            .with_column(ColumnSpec::new("a", ColumnType::Integer));
        assert_eq!(spec.duplicate_columns(), vec!["a".to_string()]);
    }

    #[test]
    fn test_destination_record_keeps_order() {
        let mut record = DestinationRecord::new();
        record.insert("date", "2024-01-15");
        record.insert("type", "BUY");
        record.insert("amount", "10.00");

        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["date", "type", "amount"]);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"date":"2024-01-15","type":"BUY","amount":"10.00"}"#);
    }
}
