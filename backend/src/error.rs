//! Error types for the customs statistics pipeline.
//!
//! The hierarchy mirrors the pipeline stages:
//!
//! - [`InputFormatError`] - HS code CSV could not be used (fatal, before any request)
//! - [`ConfigError`] - missing or invalid configuration (fatal, before any request)
//! - [`NoDataError`] - every identifier came back without rows (fatal, after the loop)
//! - [`MetadataError`] - one classification table is unusable (its lookup stays empty)
//! - [`MergeError`] - metadata join failed (degrades to the pre-merge records)
//! - [`ShapeError`] - reshaping failed (degrades to the unshaped table)
//! - [`ExportError`] - CSV serialization failed (no download artifact)
//! - [`PipelineError`] - top-level wrapper for the fatal kinds
//! - [`ServerError`] - HTTP surface errors
//!
//! Per-identifier API failures are not errors at all: they are
//! [`crate::estat::Outcome`] variants and never leave the fetch loop as `Err`.

use thiserror::Error;

// =============================================================================
// Input Errors
// =============================================================================

/// Errors while reading the uploaded HS code list.
#[derive(Debug, Error)]
pub enum InputFormatError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Neither cp932 nor UTF-8 could decode the payload.
    #[error("Input is neither valid cp932 (Shift_JIS) nor UTF-8")]
    Undecodable,

    /// Malformed CSV.
    #[error("Invalid CSV format: {0}")]
    Csv(#[from] csv::Error),

    /// The identifier column is not in the header row.
    #[error("Column '{column}' not found in CSV (columns: {})", .found.join(", "))]
    MissingColumn { column: String, found: Vec<String> },

    /// No usable identifier left after trimming and deduplication.
    #[error("No valid identifiers found in column '{column}'")]
    NoIdentifiers { column: String },

    /// Requested year outside the range the API serves.
    #[error("Year {year} is out of range ({min}..={max})")]
    InvalidYear { year: i32, min: i32, max: i32 },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No application id in the environment or on the request.
    #[error("Missing e-Stat application id (set APP_ID or pass it explicitly)")]
    MissingAppId,

    /// The endpoint URL does not parse.
    #[error("Invalid request URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },
}

// =============================================================================
// Pipeline Stage Errors
// =============================================================================

/// Raised after the fetch loop when not a single row was accumulated.
#[derive(Debug, Error)]
#[error("No data could be retrieved for any of the {identifiers} identifiers")]
pub struct NoDataError {
    pub identifiers: usize,
}

/// A classification table in `CLASS_INF` that cannot be used.
/// Non-fatal: the matching lookup is unavailable and its columns stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Metadata for '{0}' not found")]
    NotFound(String),

    #[error("Metadata for '{id}' is unusable: {reason}")]
    Invalid { id: String, reason: String },
}

/// Metadata join failures. Non-fatal: the pipeline falls back to the pre-merge records.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The input file had no label column to join onto the HS codes.
    #[error("The input file has no item label column to join")]
    MissingLabelColumn,
}

/// Reshape failures. Non-fatal: the pipeline surfaces the unshaped table.
#[derive(Debug, Error)]
pub enum ShapeError {
    /// Category metadata is present but no record carries a period code,
    /// so no year-month can be derived for any row.
    #[error("No period code column in the retrieved data; cannot derive year-month")]
    MissingPeriodCode,
}

/// CSV export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Both the primary and the fallback encoding failed.
    #[error("CSV export failed (cp932: {primary}; utf-8-sig: {fallback})")]
    Failed { primary: String, fallback: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Fatal pipeline errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run`].
/// Everything else the pipeline encounters ends up as a
/// [`crate::models::Warning`] on the report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input file error.
    #[error("Input error: {0}")]
    Input(#[from] InputFormatError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Nothing was retrieved.
    #[error("{0}")]
    NoData(#[from] NoDataError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Export error.
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for input reading.
pub type InputResult<T> = Result<T, InputFormatError>;

/// Result type for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for export.
pub type ExportResult<T> = Result<T, ExportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
