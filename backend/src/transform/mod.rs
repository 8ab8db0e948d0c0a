//! Transformation module.
//!
//! This module handles source record to destination record conversion:
//! - Operations: the transform kinds producing one destination value
//! - Filter: row exclusion rules
//! - Mapping: the mapping definition tying both together
//! - Executor: one mapping applied to one record
//! - Pipeline: a mapping applied to a whole file, with its report

pub mod executor;
pub mod filter;
pub mod logs;
pub mod mapping;
pub mod operations;
pub mod pipeline;

pub use executor::{execute, line_number, Mapper, RowError, RowExecution, RowOutcome};
pub use filter::{operators_description, should_skip, FilterOperator, FilterOutcome, FilterRule, FilterWarning};
pub use logs::{LogEntry, LogLevel, RunLog};
pub use mapping::{FieldMapping, MappingSpec};
pub use operations::{transforms_description, ConditionalBranch, TransformSpec, LOOKUP_DEFAULT_KEY};
pub use pipeline::{convert, convert_with, update_row, validate, Mode, PipelineOptions, Report, RowWarning};
