//! # Converter - declarative CSV mapping engine
//!
//! Converter turns rows of one CSV schema into rows of another through a
//! mapping: ordered field transforms plus row filters. Mappings are plain
//! JSON configuration; expressions inside them are evaluated by a closed
//! grammar, never by a general-purpose interpreter.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│  Transform  │────▶│  CSV File   │
//! │  (ISO/UTF8) │     │  (auto-enc) │     │ (filters +  │     │ (dest spec) │
//! └─────────────┘     └─────────────┘     │  mappings)  │     └─────────────┘
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use converter::store::{MemorySpecStore, SpecRepository};
//! use converter::{parser, pipeline};
//!
//! let store = MemorySpecStore::with_defaults();
//! let resolved = store.resolve("revolut_crypto_to_ghostfolio").unwrap();
//!
//! let csv = "Symbol,Type,Quantity,Price,Value,Fees,Date\n\
//!            ETH,Buy,0.5,$2000.00,$1000.00,$1.50,\"Feb 1, 2024, 9:15:00 AM\"\n\
//!            ETH,Transfer,0.5,,,,\"Feb 2, 2024, 9:15:00 AM\"";
//! let rows = parser::parse_str(csv, ',').unwrap();
//!
//! let report = pipeline::validate(&resolved.mapper(), &rows.records);
//! assert_eq!(report.valid, 1);
//! assert_eq!(report.skipped, 1);
//! assert_eq!(report.converted[0].get("symbol"), Some("ETH-USD"));
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Column and file specs, records
//! - [`coerce`] - Typed parsing and canonical formatting of cell values
//! - [`expr`] - Restricted expression language
//! - [`transform`] - Transforms, filters, mapping executor and pipeline
//! - [`store`] - Spec repository (JSON files or memory) and built-in specs
//! - [`parser`] - CSV reading/writing with auto-detection
//! - [`config`] - Runtime directories
//! - [`logging`] - Subscriber setup for the binary

// Core modules
pub mod error;
pub mod models;

// Engine
pub mod coerce;
pub mod expr;
pub mod transform;

// Specs
pub mod store;

// I/O boundary
pub mod parser;

// Runtime
pub mod config;
pub mod logging;

pub use transform::pipeline;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, ErrorKind, EvalError, FieldError, PipelineError, StoreError, TransformError, TypeError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ColumnSpec, ColumnType, DestinationRecord, DestinationSpec, FileSpec, SourceRecord, SourceSpec,
};

// =============================================================================
// Re-exports - Expressions
// =============================================================================

pub use expr::{evaluate, Bindings, Expr, RecordBindings, Value};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    FieldMapping, FilterOperator, FilterRule, Mapper, MappingSpec, Mode, PipelineOptions, Report,
    RowError, RowOutcome, TransformSpec,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{JsonSpecStore, MemorySpecStore, ResolvedMapping, SpecRepository};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{parse_bytes_auto, parse_file_auto, ParseResult};
