//! High-level pipeline API: HS code CSV to downloadable statistics table.
//!
//! This module combines all steps: reading the code list, fetching one
//! response per code, aggregating, joining metadata, reshaping and export.
//!
//! # Example
//!
//! ```rust,ignore
//! use customs_stats::{run, Config, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let input = std::fs::read("codes.csv")?;
//!     let report = run(&config, &RunRequest::new(2023, input)).await?;
//!
//!     println!("{}", report.message());
//!     Ok(())
//! }
//! ```

use crate::api::logs::{
    log_error, log_info, log_info_indent, log_progress, log_success, log_warning,
    log_warning_indent,
};
use crate::config::{validate_year, Config};
use crate::error::PipelineResult;
use crate::estat::{EStatClient, Outcome};
use crate::export::{export_csv, CsvExport, ExportOptions};
use crate::models::{CodeList, RunSummary, Stage, Table, Warning};
use crate::parser::{read_code_list, ParseResult, ReaderOptions};
use crate::transform::aggregator::Aggregator;
use crate::transform::resolver::{Resolved, Resolver};
use crate::transform::shaper::shape;

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Overrides the configured application id.
    pub app_id: Option<String>,
    /// Target year.
    pub year: i32,
    /// Raw bytes of the HS code CSV.
    pub input: Vec<u8>,
    pub reader: ReaderOptions,
    pub export: ExportOptions,
}

impl RunRequest {
    pub fn new(year: i32, input: impl Into<Vec<u8>>) -> Self {
        Self {
            app_id: None,
            year,
            input: input.into(),
            reader: ReaderOptions::default(),
            export: ExportOptions::default(),
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_export_options(mut self, export: ExportOptions) -> Self {
        self.export = export;
        self
    }
}

/// Result of a complete run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Shaped table, or the unshaped one when reshaping failed.
    pub table: Table,
    pub summary: RunSummary,
    /// Every non-fatal condition, in the order it happened.
    pub warnings: Vec<Warning>,
    /// Encoded CSV; `None` when export failed.
    pub export: Option<CsvExport>,
    /// Whether `table` went through the shaper.
    pub shaped: bool,
    pub year: i32,
}

impl RunReport {
    /// One-line result message.
    pub fn message(&self) -> String {
        self.summary.describe(self.table.len())
    }
}

/// Run the whole pipeline.
///
/// Input, year and configuration problems fail before any HTTP request.
/// Per-code failures only show up in the summary and warnings; the run
/// fails after the loop only when no code returned data.
pub async fn run(config: &Config, request: &RunRequest) -> PipelineResult<RunReport> {
    let year = validate_year(request.year)?;

    log_info("📖 Reading HS code list...");
    let parsed = read_code_list(&request.input, &request.reader)?;
    log_parsed(&parsed);

    let config = match &request.app_id {
        Some(app_id) => config.clone().with_app_id(app_id.as_str()),
        None => config.clone(),
    };
    let client = EStatClient::new(&config, year)?;

    run_with_client(&client, year, &parsed.codes, &request.export).await
}

/// Run the fetch loop and every later stage with an existing client.
pub async fn run_with_client(
    client: &EStatClient,
    year: i32,
    codes: &CodeList,
    export: &ExportOptions,
) -> PipelineResult<RunReport> {
    // Step 1: fetch, one code at a time
    log_info(format!("🌐 Fetching {} HS code(s) for {}...", codes.len(), year));
    let total = codes.len();
    let mut aggregator = Aggregator::new();

    for (i, code) in codes.codes().enumerate() {
        log_progress(i + 1, total, format!("HSコード: {} ({}/{})", code, i + 1, total));
        let outcome = client.fetch(code).await;
        log_outcome(&outcome);
        aggregator.record(outcome);
    }

    let aggregate = aggregator.finish().map_err(|e| {
        log_error(e.to_string());
        e
    })?;
    log_success(format!("{} rows retrieved", aggregate.records.len()));

    let mut warnings = aggregate.warnings;

    // Step 2: metadata joins
    log_info("🔗 Joining metadata...");
    let resolved = match Resolver::new(aggregate.retained.as_ref(), codes) {
        Ok(resolver) => resolver.join(aggregate.records),
        Err(e) => {
            warn(&mut warnings, Warning::stage(Stage::Merge, format!("{}; continuing without metadata", e)));
            Resolved::unmerged(aggregate.records)
        }
    };
    for warning in &resolved.warnings {
        log_warning_indent(&warning.message, 1);
    }
    warnings.extend(resolved.warnings.iter().cloned());

    // Step 3: reshape
    log_info("📐 Shaping table...");
    let (table, shaped) = match shape(&resolved) {
        Ok(shaped) => {
            log_success(format!(
                "{} rows kept ({} dropped)",
                shaped.len(),
                resolved.records.len() - shaped.len()
            ));
            (shaped.to_table(), true)
        }
        Err(e) => {
            warn(&mut warnings, Warning::stage(Stage::Shape, format!("{}; returning the unshaped table", e)));
            (resolved.to_table(), false)
        }
    };

    // Step 4: export
    let export = match export_csv(&table, export) {
        Ok(csv) => {
            if csv.replaced > 0 {
                warnings.push(Warning::stage(
                    Stage::Export,
                    format!("{} character(s) replaced by '?' in the cp932 file", csv.replaced),
                ));
            }
            Some(csv)
        }
        Err(e) => {
            warn(&mut warnings, Warning::stage(Stage::Export, e.to_string()));
            None
        }
    };

    let report = RunReport { table, summary: aggregate.summary, warnings, export, shaped, year };
    log_success(report.message());
    Ok(report)
}

fn warn(warnings: &mut Vec<Warning>, warning: Warning) {
    log_warning(&warning.message);
    warnings.push(warning);
}

fn log_parsed(parsed: &ParseResult) {
    log_success(format!("Detected encoding: {}", parsed.encoding.name()));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!(
        "Read {} rows, {} unique HS code(s)",
        parsed.row_count,
        parsed.codes.len()
    ));
}

fn log_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Success { rows, .. } => log_info_indent(format!("✓ {} rows", rows.len()), 1),
        other => log_warning_indent(other.describe(), 1),
    }
}

/// Format delimiter for display
fn format_delimiter(d: u8) -> &'static str {
    match d {
        b';' => ";",
        b',' => ",",
        b'\t' => "TAB",
        b'|' => "|",
        _ => "?",
    }
}
