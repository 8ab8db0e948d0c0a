//! Mapping definition
//!
//! A [`MappingSpec`] connects one source spec to one destination spec
//! through ordered field mappings and filter rules.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::filter::FilterRule;
use super::operations::TransformSpec;
use crate::expr::Expr;
use crate::models::{DestinationSpec, SourceSpec};

/// Transform producing one destination column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(alias = "destination_field")]
    pub destination_column: String,
    pub transform: TransformSpec,
}

impl FieldMapping {
    pub fn new(destination_column: impl Into<String>, transform: TransformSpec) -> Self {
        Self {
            destination_column: destination_column.into(),
            transform,
        }
    }
}

/// A complete source-to-destination mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingSpec {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    pub source_id: String,
    pub destination_id: String,

    /// Evaluated in declaration order.
    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,

    /// Exclusion rules, checked before any transform.
    #[serde(default)]
    pub filter_rules: Vec<FilterRule>,
}

impl MappingSpec {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, destination_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            source_id: source_id.into(),
            destination_id: destination_id.into(),
            field_mappings: Vec::new(),
            filter_rules: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a field mapping
    pub fn with_field(mut self, destination_column: impl Into<String>, transform: TransformSpec) -> Self {
        self.field_mappings.push(FieldMapping::new(destination_column, transform));
        self
    }

    /// Add a filter rule
    pub fn with_filter(mut self, rule: FilterRule) -> Self {
        self.filter_rules.push(rule);
        self
    }

    /// Parse a mapping from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Mapping for a destination column, if any.
    pub fn field(&self, destination_column: &str) -> Option<&FieldMapping> {
        self.field_mappings
            .iter()
            .find(|m| m.destination_column == destination_column)
    }

    /// Source fields read by transforms and expressions, deduplicated, in order.
    pub fn source_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !fields.iter().any(|f| f == name) {
                fields.push(name.to_string());
            }
        };

        for mapping in &self.field_mappings {
            if let Some(source) = mapping.transform.source_field() {
                push(source);
            }
            for expression in mapping.transform.expressions() {
                if let Ok(expr) = Expr::parse(expression) {
                    for name in expr.fields() {
                        push(&name);
                    }
                }
            }
        }
        fields
    }

    /// Structural check against the specs this mapping connects.
    ///
    /// Reports duplicate or unknown destination columns, source fields the
    /// source spec does not declare, and expressions that do not parse.
    /// Source fields are only checked when the source spec declares columns.
    pub fn check(&self, source: &SourceSpec, destination: &DestinationSpec) -> Result<(), Vec<String>> {
        let mut problems = Vec::new();

        if self.source_id != source.id {
            problems.push(format!(
                "Mapping '{}' expects source '{}', got '{}'",
                self.id, self.source_id, source.id
            ));
        }
        if self.destination_id != destination.id {
            problems.push(format!(
                "Mapping '{}' expects destination '{}', got '{}'",
                self.id, self.destination_id, destination.id
            ));
        }

        for column in destination.duplicate_columns() {
            problems.push(format!("Destination column '{}' is declared more than once", column));
        }

        let mut seen = HashSet::new();
        for mapping in &self.field_mappings {
            let column = &mapping.destination_column;
            if !seen.insert(column.as_str()) {
                problems.push(format!("Destination column '{}' is mapped more than once", column));
            }
            if destination.column(column).is_none() {
                problems.push(format!(
                    "Destination column '{}' does not exist in '{}'",
                    column, destination.id
                ));
            }

            for expression in mapping.transform.expressions() {
                if let Err(e) = Expr::parse(expression) {
                    problems.push(format!("Column '{}': expression '{}' is invalid: {}", column, expression, e));
                }
            }
        }

        if !source.columns.is_empty() {
            for field in self.source_fields() {
                if source.column(&field).is_none() {
                    problems.push(format!("Source field '{}' does not exist in '{}'", field, source.id));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems)
        }
    }
}
