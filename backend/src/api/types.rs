//! REST API types for frontend integration.
//!
//! Rows are sent as arrays of JSON scalars in `columns` order; dates are
//! ISO strings.

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::export::{download_file_name, OutputEncoding};
use crate::models::{Cell, RunSummary, Warning};
use crate::transform::pipeline::RunReport;

/// Response sent to the frontend after a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchResponse {
    /// Unique run identifier
    pub run_id: String,

    /// Status: "ready", "warning", "error"
    pub status: String,

    /// Result message (`取得件数: ...`)
    pub message: String,

    /// Column headers
    pub columns: Vec<String>,

    /// Table rows
    pub rows: Vec<Vec<Cell>>,

    /// Whether `rows` went through reshaping
    pub shaped: bool,

    pub summary: RunSummary,

    pub warnings: Vec<WarningItem>,

    /// `None` when export failed
    pub download: Option<DownloadInfo>,
}

/// A warning, flattened for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningItem {
    #[serde(flatten)]
    pub warning: Warning,
    pub text: String,
}

impl From<Warning> for WarningItem {
    fn from(warning: Warning) -> Self {
        Self { text: warning.to_string(), warning }
    }
}

/// Download artifact metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadInfo {
    pub file_name: String,
    pub mime_type: String,
    pub encoding: OutputEncoding,
    pub size: usize,
    pub replaced_characters: usize,
}

impl From<RunReport> for FetchResponse {
    fn from(report: RunReport) -> Self {
        let message = report.message();
        let download = report.export.as_ref().map(|csv| DownloadInfo {
            file_name: download_file_name(report.year, Local::now().naive_local()),
            mime_type: csv.mime_type.to_string(),
            encoding: csv.encoding,
            size: csv.bytes.len(),
            replaced_characters: csv.replaced,
        });

        let status = if report.warnings.is_empty() && report.shaped { "ready" } else { "warning" };

        FetchResponse {
            run_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            message,
            columns: report.table.columns,
            rows: report.table.rows,
            shaped: report.shaped,
            summary: report.summary,
            warnings: report.warnings.into_iter().map(WarningItem::from).collect(),
            download,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "runId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "columns": [],
        "rows": [],
        "warnings": [],
        "download": null
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{export_csv, ExportOptions};
    use crate::models::{Stage, Table};
    use chrono::NaiveDate;

    fn report(warnings: Vec<Warning>) -> RunReport {
        let mut table = Table::new(["HSコード", "年月", "値（金額、数量）"]);
        table.push_row(vec![
            Cell::Text("010121010".into()),
            Cell::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
            Cell::Number(12345.0),
        ]);
        let export = export_csv(&table, &ExportOptions::default()).ok();
        RunReport {
            table,
            summary: RunSummary { processed: 1, errored: 1, ..RunSummary::default() },
            warnings,
            export,
            shaped: true,
            year: 2023,
        }
    }

    #[test]
    fn test_response_serialization() {
        let response = FetchResponse::from(report(Vec::new()));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "ready");
        assert_eq!(json["columns"][1], "年月");
        assert_eq!(json["rows"][0][0], "010121010");
        assert_eq!(json["rows"][0][1], "2023-01-01");
        assert_eq!(json["rows"][0][2], 12345.0);
        assert_eq!(json["summary"]["processed"], 1);
        assert_eq!(json["download"]["encoding"], "cp932");
        assert_eq!(json["download"]["mimeType"], "text/csv");
        assert!(json["download"]["fileName"]
            .as_str()
            .unwrap()
            .starts_with("通関統計API_2023_"));
        assert_eq!(json["message"], "取得件数: 1件 (処理成功: 1, スキップ: 0, エラー: 1)");
    }

    #[test]
    fn test_warnings_set_status() {
        let response = FetchResponse::from(report(vec![
            Warning::identifier("resume", "API error"),
            Warning::stage(Stage::Merge, "no metadata"),
        ]));
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["status"], "warning");
        assert_eq!(json["warnings"][0]["scope"]["value"], "resume");
        assert_eq!(json["warnings"][0]["text"], "[HS resume] API error");
        assert_eq!(json["warnings"][1]["message"], "no metadata");
    }

    #[test]
    fn test_error_response() {
        let json = error_response("boom");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "boom");
        assert!(json["download"].is_null());
    }
}
