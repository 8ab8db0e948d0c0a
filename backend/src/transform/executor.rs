//! Mapping executor
//!
//! Runs one mapping over one source record: filters first, then every
//! field mapping in declaration order, then defaults for destination
//! columns nothing maps. Field errors are all collected, in that order; a
//! row with any of them produces a [`RowError`] instead of a record.
//! Converted records list destination-spec columns first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::filter::{self, FilterWarning};
use super::mapping::MappingSpec;
use super::operations::check_constraints;
use crate::coerce;
use crate::error::{FieldError, PipelineError, PipelineResult, TransformResult};
use crate::models::{ColumnSpec, ColumnType, DestinationRecord, DestinationSpec, SourceRecord, SourceSpec};

/// Field errors of one failed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    /// 0-based position in the input.
    pub row_index: usize,
    /// 1-based line in the CSV file, counting the header line.
    pub line_number: usize,
    pub field_errors: Vec<FieldError>,
}

impl RowError {
    pub fn new(row_index: usize, field_errors: Vec<FieldError>) -> Self {
        Self {
            row_index,
            line_number: line_number(row_index),
            field_errors,
        }
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        let details: Vec<String> = self
            .field_errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        format!("Line {}: {}", self.line_number, details.join("; "))
    }
}

/// CSV line of a row, counting the header line.
pub fn line_number(row_index: usize) -> usize {
    row_index + 2
}

/// What happened to one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// Excluded by a filter rule.
    Skipped,
    Converted(DestinationRecord),
    Failed(RowError),
}

/// Row outcome plus non-fatal filter warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct RowExecution {
    pub outcome: RowOutcome,
    pub warnings: Vec<FilterWarning>,
}

/// Applies a mapping to records.
#[derive(Debug, Clone, Copy)]
pub struct Mapper<'a> {
    mapping: &'a MappingSpec,
    source: &'a SourceSpec,
    destination: &'a DestinationSpec,
}

impl<'a> Mapper<'a> {
    pub fn new(mapping: &'a MappingSpec, source: &'a SourceSpec, destination: &'a DestinationSpec) -> Self {
        Self {
            mapping,
            source,
            destination,
        }
    }

    /// Like [`Mapper::new`], rejecting mappings that fail [`MappingSpec::check`].
    pub fn checked(
        mapping: &'a MappingSpec,
        source: &'a SourceSpec,
        destination: &'a DestinationSpec,
    ) -> PipelineResult<Self> {
        mapping
            .check(source, destination)
            .map_err(PipelineError::InvalidMapping)?;
        Ok(Self::new(mapping, source, destination))
    }

    pub fn mapping(&self) -> &'a MappingSpec {
        self.mapping
    }

    pub fn source(&self) -> &'a SourceSpec {
        self.source
    }

    pub fn destination(&self) -> &'a DestinationSpec {
        self.destination
    }

    /// Process one record.
    pub fn execute(&self, row_index: usize, record: &SourceRecord) -> RowExecution {
        let filtered = filter::evaluate(&self.mapping.filter_rules, record);
        if filtered.skip {
            return RowExecution {
                outcome: RowOutcome::Skipped,
                warnings: filtered.warnings,
            };
        }

        let mut values: HashMap<&str, String> = HashMap::new();
        let mut errors = Vec::new();

        for field in &self.mapping.field_mappings {
            let name = field.destination_column.as_str();
            if values.contains_key(name) {
                continue;
            }
            let extra;
            let column = match self.destination.column(name) {
                Some(column) => column,
                // Mapped columns the destination spec does not declare are kept as text.
                None => {
                    extra = ColumnSpec::new(name, ColumnType::String);
                    &extra
                }
            };
            match field.transform.apply(record, Some(self.source), column) {
                Ok(value) => {
                    values.insert(name, value);
                }
                Err(e) => {
                    let source_value = field
                        .transform
                        .source_field()
                        .and_then(|f| record.get(f))
                        .map(String::as_str);
                    errors.push(FieldError::new(name, &e).with_source_value(source_value));
                    values.insert(name, String::new());
                }
            }
        }

        for column in &self.destination.columns {
            if values.contains_key(column.name.as_str()) {
                continue;
            }
            match unmapped_value(column) {
                Ok(value) => {
                    values.insert(column.name.as_str(), value);
                }
                Err(e) => errors.push(FieldError::new(&column.name, &e)),
            }
        }

        let mut output = DestinationRecord::new();
        let extras = self
            .mapping
            .field_mappings
            .iter()
            .map(|f| f.destination_column.as_str())
            .filter(|name| self.destination.column(name).is_none());
        for name in self.destination.columns.iter().map(|c| c.name.as_str()).chain(extras) {
            if let Some(value) = values.remove(name) {
                output.insert(name, value);
            }
        }

        let outcome = if errors.is_empty() {
            RowOutcome::Converted(output)
        } else {
            RowOutcome::Failed(RowError::new(row_index, errors))
        };

        RowExecution {
            outcome,
            warnings: filtered.warnings,
        }
    }
}

/// Value of a destination column no field mapping targets.
fn unmapped_value(column: &ColumnSpec) -> TransformResult<String> {
    let value = match &column.default {
        Some(default) => coerce::coerce(default, column)?,
        None => String::new(),
    };
    check_constraints(value, column)
}

/// Process one record without building a [`Mapper`] first.
pub fn execute(
    mapping: &MappingSpec,
    source: &SourceSpec,
    destination: &DestinationSpec,
    row_index: usize,
    record: &SourceRecord,
) -> RowExecution {
    Mapper::new(mapping, source, destination).execute(row_index, record)
}
