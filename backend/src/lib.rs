//! # Customs Stats - e-Stat customs trade statistics by HS code
//!
//! Reads a list of HS codes, fetches the customs trade statistics of one
//! year for each code from the e-Stat `getStatsData` API, joins the
//! classification metadata and reshapes everything into one table ready
//! for Excel (cp932 CSV).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  HS code    │────▶│   Parser    │────▶│ e-Stat API  │────▶│  Transform  │────▶│  CSV export │
//! │  CSV (SJIS) │     │  (auto-enc) │     │ (1 GET/code)│     │ (join+shape)│     │ (cp932/BOM) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use customs_stats::{run, Config, RunRequest};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().unwrap().with_app_id("my-app-id");
//!     let input = std::fs::read("codes.csv").unwrap();
//!     let report = run(&config, &RunRequest::new(2023, input)).await.unwrap();
//!     println!("{}", report.message());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment configuration
//! - [`models`] - Domain models (CodeList, FlatRecord, Table)
//! - [`parser`] - HS code CSV reading with auto-detection
//! - [`estat`] - e-Stat API client and response envelope
//! - [`transform`] - Aggregation, metadata joins, reshaping, pipeline
//! - [`export`] - CSV encoding
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// API client
pub mod estat;

// Transformation
pub mod transform;

// Export
pub mod export;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ExportError,
    InputFormatError,
    MergeError,
    MetadataError,
    NoDataError,
    PipelineError,
    ServerError,
    ShapeError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{validate_year, Config};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Cell,
    CodeList,
    FlatRecord,
    RunSummary,
    ShapedRecord,
    Table,
    Warning,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    detect_delimiter,
    read_code_file,
    read_code_list,
    InputEncoding,
    ParseResult,
    ReaderOptions,
};

// =============================================================================
// Re-exports - e-Stat client
// =============================================================================

pub use estat::{classify, EStatClient, Outcome};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{run, run_with_client, RunReport, RunRequest};

// =============================================================================
// Re-exports - Export
// =============================================================================

pub use export::{
    download_file_name,
    export_csv,
    CsvExport,
    ExportOptions,
    OutputEncoding,
    ReplacementPolicy,
};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, FetchResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
