//! High-level pipeline API.
//!
//! Drives a [`Mapper`] over every record of a file and aggregates the
//! outcomes into a [`Report`]:
//!
//! - [`validate`] always returns the report, errors included;
//! - [`convert`] fails closed: any row error blocks the whole output;
//! - [`update_row`] merges an inline edit into one row before revalidation.
//!
//! # Example
//!
//! ```rust
//! use converter::models::{ColumnSpec, ColumnType, FileSpec, SourceRecord};
//! use converter::transform::{pipeline, Mapper, MappingSpec, TransformSpec};
//!
//! let source = FileSpec::new("broker", "Broker");
//! let destination = FileSpec::new("ledger", "Ledger")
//!     .with_column(ColumnSpec::new("total", ColumnType::Money));
//! let mapping = MappingSpec::new("m", "broker", "ledger")
//!     .with_field("total", TransformSpec::formula("Quantity * Price"));
//!
//! let row: SourceRecord = [("Quantity", "2"), ("Price", "9.99")]
//!     .iter()
//!     .map(|(k, v)| (k.to_string(), v.to_string()))
//!     .collect();
//!
//! let mapper = Mapper::new(&mapping, &source, &destination);
//! let output = pipeline::convert(&mapper, &[row]).unwrap();
//! assert_eq!(output[0].get("total"), Some("19.98"));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::executor::{line_number, Mapper, RowError, RowOutcome};
use super::filter::FilterWarning;
use super::logs::{LogEntry, RunLog};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DestinationRecord, SourceRecord};

/// What a run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Preview: report everything, never block.
    Validate,
    /// Produce output only when no row has errors.
    Convert,
}

/// Options for a conversion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Refuse to produce output when any row has errors.
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
}

fn default_fail_on_error() -> bool {
    true
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fail_on_error: default_fail_on_error(),
        }
    }
}

impl PipelineOptions {
    /// Keep converted rows even when other rows failed.
    pub fn allow_errors(mut self) -> Self {
        self.fail_on_error = false;
        self
    }
}

/// Filter warning tagged with its row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowWarning {
    pub row_index: usize,
    pub line_number: usize,
    #[serde(flatten)]
    pub warning: FilterWarning,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub mode: Mode,

    /// Records seen, skipped ones included.
    pub processed: usize,

    /// Records excluded by filter rules.
    pub skipped: usize,

    /// Records converted without errors.
    pub valid: usize,

    /// Converted records, in input order.
    pub converted: Vec<DestinationRecord>,

    /// Failed records, in input order.
    pub errors: Vec<RowError>,

    pub warnings: Vec<RowWarning>,

    pub log: RunLog,

    /// Output was withheld because of row errors.
    #[serde(default)]
    pub blocked: bool,
}

impl Report {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            processed: 0,
            skipped: 0,
            valid: 0,
            converted: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            log: RunLog::new(),
            blocked: false,
        }
    }

    /// Number of failed rows.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of field errors across all failed rows.
    pub fn field_error_count(&self) -> usize {
        self.errors.iter().map(|e| e.field_errors.len()).sum()
    }

    /// Check if the run completed without errors
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        let status = match self.mode {
            Mode::Validate => "Validation",
            Mode::Convert => "Conversion",
        };
        format!(
            "{} complete: {} valid, {} skipped, {} errors",
            status,
            self.valid,
            self.skipped,
            self.error_count()
        )
    }
}

/// Run `mapper` over `records`.
///
/// In [`Mode::Convert`] with `fail_on_error`, any row error clears
/// `converted` and sets `blocked`.
pub fn run(mapper: &Mapper<'_>, records: &[SourceRecord], mode: Mode, options: PipelineOptions) -> Report {
    let mapping = mapper.mapping();
    let mut report = Report::new(mode);

    let verb = match mode {
        Mode::Validate => "Validating",
        Mode::Convert => "Converting",
    };
    let name = if mapping.name.is_empty() { &mapping.id } else { &mapping.name };
    report.log.info(format!("{} {} rows", verb, records.len()));
    report.log.info(format!("Using mapping: {}", name));
    report.log.info(format!(
        "Field mappings: {}, Filter rules: {}",
        mapping.field_mappings.len(),
        mapping.filter_rules.len()
    ));

    for (row_index, record) in records.iter().enumerate() {
        let line = line_number(row_index);
        let execution = mapper.execute(row_index, record);
        report.processed += 1;

        for warning in execution.warnings {
            report.log.row(LogEntry::warning(format!("Line {}: {}", line, warning.message)));
            report.warnings.push(RowWarning {
                row_index,
                line_number: line,
                warning,
            });
        }

        match execution.outcome {
            RowOutcome::Skipped => {
                report.skipped += 1;
                report.log.row(LogEntry::info(format!("Line {}: Skipped (filtered out)", line)));
            }
            RowOutcome::Converted(output) => {
                report.valid += 1;
                let status = match mode {
                    Mode::Validate => "Valid",
                    Mode::Convert => "Converted successfully",
                };
                report.log.row(LogEntry::success(format!("Line {}: {}", line, status)));
                report.converted.push(output);
            }
            RowOutcome::Failed(error) => {
                report.log.row(LogEntry::error(format!(
                    "Line {}: Has {} error(s)",
                    line,
                    error.field_errors.len()
                )));
                for field_error in &error.field_errors {
                    report.log.row(LogEntry::error(format!(
                        "Line {}: {} (field: {}, value: {})",
                        line,
                        field_error.message,
                        field_error.field,
                        field_error.source_value.as_deref().unwrap_or("")
                    )));
                }
                report.errors.push(error);
            }
        }
    }

    if mode == Mode::Convert && !report.is_ok() && options.fail_on_error {
        report.blocked = true;
        report.converted.clear();
        report.log.error(format!(
            "OUTPUT SKIPPED: {} errors found. Fix errors before converting.",
            report.error_count()
        ));
    }

    let summary = report.summary();
    if report.is_ok() {
        report.log.success(summary);
    } else {
        report.log.warning(summary);
    }

    report
}

/// Validate every record; never fails.
pub fn validate(mapper: &Mapper<'_>, records: &[SourceRecord]) -> Report {
    run(mapper, records, Mode::Validate, PipelineOptions::default())
}

/// Convert every record, failing closed on any row error.
pub fn convert(mapper: &Mapper<'_>, records: &[SourceRecord]) -> PipelineResult<Vec<DestinationRecord>> {
    convert_with(mapper, records, PipelineOptions::default()).map(|report| report.converted)
}

/// Convert with explicit options, returning the full report.
pub fn convert_with(
    mapper: &Mapper<'_>,
    records: &[SourceRecord],
    options: PipelineOptions,
) -> PipelineResult<Report> {
    let report = run(mapper, records, Mode::Convert, options);
    if report.blocked {
        return Err(PipelineError::HasErrors {
            count: report.error_count(),
            report: Box::new(report),
        });
    }
    Ok(report)
}

/// Merge `patch` into row `index`, returning the new rows.
///
/// Only columns the row already has are updated; unknown keys are ignored.
pub fn update_row(
    rows: &[SourceRecord],
    index: usize,
    patch: &HashMap<String, String>,
) -> PipelineResult<Vec<SourceRecord>> {
    if index >= rows.len() {
        return Err(PipelineError::RowOutOfRange {
            index,
            len: rows.len(),
        });
    }

    let mut updated = rows.to_vec();
    let row = &mut updated[index];
    for (column, value) in patch {
        if let Some(cell) = row.get_mut(column) {
            *cell = value.clone();
        }
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{ColumnSpec, ColumnType, DestinationSpec, FileSpec, SourceSpec};
    use crate::transform::filter::{FilterOperator, FilterRule};
    use crate::transform::logs::LogLevel;
    use crate::transform::mapping::MappingSpec;
    use crate::transform::operations::TransformSpec;

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn fixture() -> (MappingSpec, SourceSpec, DestinationSpec) {
        let source = FileSpec::new("broker", "Broker")
            .with_column(ColumnSpec::new("Type", ColumnType::String))
            .with_column(ColumnSpec::new("Quantity", ColumnType::Integer))
            .with_column(ColumnSpec::new("Price", ColumnType::Money));
        let destination = FileSpec::new("ledger", "Ledger")
            .with_column(ColumnSpec::new("type", ColumnType::String))
            .with_column(ColumnSpec::new("total", ColumnType::Money));
        let mapping = MappingSpec::new("broker_to_ledger", "broker", "ledger")
            .with_name("Broker to ledger")
            .with_field("type", TransformSpec::lookup("Type", [("BUY", "BUY"), ("SELL", "SELL")]))
            .with_field("total", TransformSpec::formula("Quantity * Price"))
            .with_filter(FilterRule::new("Type", FilterOperator::In, &["DEPOSIT", "WITHDRAWAL"]));
        (mapping, source, destination)
    }

    fn rows() -> Vec<SourceRecord> {
        vec![
            record(&[("Type", "BUY"), ("Quantity", "2"), ("Price", "10")]),
            record(&[("Type", "DEPOSIT"), ("Quantity", ""), ("Price", "100")]),
            record(&[("Type", "HOLD"), ("Quantity", "x"), ("Price", "1")]),
            record(&[("Type", "SELL"), ("Quantity", "1"), ("Price", "5.5")]),
        ]
    }

    #[test]
    fn test_validate_report() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);
        let report = validate(&mapper, &rows());

        assert_eq!(report.mode, Mode::Validate);
        assert_eq!(report.processed, 4);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.valid, 2);
        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.converted[1].get("total"), Some("5.50"));
        assert!(!report.blocked);

        assert_eq!(report.error_count(), 1);
        assert_eq!(report.errors[0].row_index, 2);
        assert_eq!(report.errors[0].line_number, 4);
        assert_eq!(report.field_error_count(), 2);
        assert_eq!(report.errors[0].field_errors[0].kind, ErrorKind::LookupMiss);
        assert_eq!(report.errors[0].field_errors[1].kind, ErrorKind::TypeMismatch);

        assert_eq!(report.summary(), "Validation complete: 2 valid, 1 skipped, 1 errors");
        let messages: Vec<&str> = report.log.entries().iter().map(|e| e.message.as_str()).collect();
        assert!(messages.contains(&"Line 3: Skipped (filtered out)"));
        assert!(messages.contains(&"Using mapping: Broker to ledger"));
        assert_eq!(report.log.entries().last().map(|e| e.level), Some(LogLevel::Warning));
    }

    #[test]
    fn test_convert_fails_closed() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);

        match convert(&mapper, &rows()) {
            Err(PipelineError::HasErrors { count, report }) => {
                assert_eq!(count, 1);
                assert!(report.blocked);
                assert!(report.converted.is_empty());
                assert_eq!(report.errors.len(), 1);
            }
            other => panic!("conversion should be blocked, got {:?}", other),
        }
    }

    #[test]
    fn test_convert_allow_errors() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);

        let report = convert_with(&mapper, &rows(), PipelineOptions::default().allow_errors()).unwrap();
        assert!(!report.blocked);
        assert_eq!(report.converted.len(), 2);
        assert_eq!(report.error_count(), 1);
    }

    #[test]
    fn test_convert_clean_file() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);
        let mut records = rows();
        records.remove(2);

        let output = convert(&mapper, &records).unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].get("type"), Some("BUY"));
        assert_eq!(output[0].get("total"), Some("20.00"));
    }

    #[test]
    fn test_update_row_then_revalidate() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);
        let original = rows();

        let patch: HashMap<String, String> = [("Type", "BUY"), ("Quantity", "3"), ("Unknown", "ignored")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let fixed = update_row(&original, 2, &patch).unwrap();

        assert_eq!(original[2].get("Type").map(String::as_str), Some("HOLD"));
        assert_eq!(fixed[2].get("Quantity").map(String::as_str), Some("3"));
        assert!(!fixed[2].contains_key("Unknown"));
        assert!(validate(&mapper, &fixed).is_ok());
    }

    #[test]
    fn test_update_row_out_of_range() {
        let err = update_row(&rows(), 9, &HashMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::RowOutOfRange { index: 9, len: 4 }));
    }

    #[test]
    fn test_filter_warnings_are_reported() {
        let (mut mapping, source, destination) = fixture();
        mapping.filter_rules.push(FilterRule::new("Status", FilterOperator::Equals, &["CANCELLED"]));
        let mapper = Mapper::new(&mapping, &source, &destination);

        let report = validate(&mapper, &rows()[..1]);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].line_number, 2);
        assert_eq!(report.warnings[0].warning.field, "Status");
        assert!(report.is_ok());
    }

    #[test]
    fn test_report_serialization() {
        let (mapping, source, destination) = fixture();
        let mapper = Mapper::new(&mapping, &source, &destination);
        let report = validate(&mapper, &rows());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "validate");
        assert_eq!(json["errors"][0]["lineNumber"], 4);
        assert_eq!(json["errors"][0]["fieldErrors"][0]["kind"], "lookup_miss");
        assert_eq!(json["converted"][0]["type"], "BUY");
        assert!(json["log"].is_array());
    }
}
