//! HTTP Server for the customs statistics API.
//!
//! Provides REST endpoints to run the fetch pipeline on an uploaded HS code
//! list and to download the result.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/fetch`      | Run the pipeline, JSON table         |
//! | POST   | `/api/fetch/csv`  | Run the pipeline, CSV attachment     |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use chrono::Local;
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::LOG_BROADCASTER;
use super::types::{error_response, FetchResponse};
use crate::config::Config;
use crate::error::{PipelineError, ServerError};
use crate::export::{download_file_name, ReplacementPolicy};
use crate::models::{Stage, WarningScope};
use crate::transform::pipeline::{run, RunReport, RunRequest};

type ApiError = (StatusCode, Json<Value>);

/// Build the router around a configuration.
pub fn router(config: Config) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::CONTENT_DISPOSITION]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/fetch", post(fetch_json))
        .route("/api/fetch/csv", post(fetch_csv))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(Arc::new(config))
}

/// Start the HTTP server
pub async fn start_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    if config.app_id.is_none() {
        println!("⚠️  APP_ID is not set; every request must provide appId");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    println!("🚀 Customs statistics server running on http://localhost:{}", port);
    println!("   POST /api/fetch     - Run with an HS code CSV (JSON result)");
    println!("   POST /api/fetch/csv - Run with an HS code CSV (CSV download)");
    println!("   GET  /api/logs      - SSE log stream");
    println!("   GET  /health        - Health check");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(config)).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "customs-stats",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "fetch": "POST /api/fetch",
            "csv": "POST /api/fetch/csv",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(error_response(&message.to_string())))
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        let status = match &err {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Input(_)) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Config(_)) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::NoData(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Export(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        eprintln!("❌ {}", err);
        api_error(status, err)
    }
}

/// Read the multipart form: `file` (required), `year` (required), `appId`,
/// `strict` (optional).
async fn read_form(mut multipart: Multipart) -> Result<RunRequest, ServerError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut year: Option<i32> = None;
    let mut app_id: Option<String> = None;
    let mut strict = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "year" | "appId" | "strict" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                let text = text.trim();
                match name.as_str() {
                    "year" => {
                        year = Some(text.parse().map_err(|_| {
                            ServerError::BadRequest(format!("Invalid year: '{}'", text))
                        })?)
                    }
                    "appId" if !text.is_empty() => app_id = Some(text.to_string()),
                    "strict" => strict = matches!(text, "1" | "true" | "on"),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let year = year.ok_or_else(|| ServerError::BadRequest("No year provided".into()))?;

    let mut request = RunRequest::new(year, bytes);
    request.app_id = app_id;
    if strict {
        request.export.policy = ReplacementPolicy::Strict;
    }
    Ok(request)
}

async fn execute(config: &Config, multipart: Multipart) -> Result<RunReport, ServerError> {
    let request = read_form(multipart).await?;

    println!("\n{}", "=".repeat(70));
    println!("📄 NEW RUN: year {} ({} bytes)", request.year, request.input.len());
    println!("{}\n", "=".repeat(70));

    Ok(run(config, &request).await?)
}

/// Run endpoint returning the table as JSON
async fn fetch_json(
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<Json<FetchResponse>, ApiError> {
    let report = execute(&config, multipart).await?;
    Ok(Json(FetchResponse::from(report)))
}

/// Run endpoint returning the CSV file
async fn fetch_csv(
    State(config): State<Arc<Config>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let report = execute(&config, multipart).await?;
    let file_name = download_file_name(report.year, Local::now().naive_local());

    let Some(csv) = report.export else {
        let reason = report
            .warnings
            .iter()
            .rev()
            .find(|w| w.scope == WarningScope::Stage(Stage::Export))
            .map(|w| w.message.clone())
            .unwrap_or_else(|| "CSV export failed".to_string());
        return Err(api_error(StatusCode::UNPROCESSABLE_ENTITY, reason));
    };

    let disposition = content_disposition(&file_name);
    let headers = [
        (header::CONTENT_TYPE, HeaderValue::from_static(csv.mime_type)),
        (
            header::CONTENT_DISPOSITION,
            HeaderValue::from_str(&disposition)
                .map_err(|e| ServerError::Internal(e.to_string()))?,
        ),
    ];
    Ok((headers, csv.bytes).into_response())
}

/// `attachment` header with an ASCII fallback and the RFC 5987 UTF-8 name.
fn content_disposition(file_name: &str) -> String {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estat::testing::{spawn_stub, stub_router, SUCCESS_CODE};

    const BOUNDARY: &str = "customs-stats-boundary";

    fn multipart_body(fields: &[(&str, &str)], file: Option<&str>) -> Vec<u8> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            ));
        }
        if let Some(file) = file {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"codes.csv\"\r\nContent-Type: text/csv\r\n\r\n{}\r\n",
                BOUNDARY, file
            ));
        }
        body.push_str(&format!("--{}--\r\n", BOUNDARY));
        body.into_bytes()
    }

    async fn post(path: &str, body: Vec<u8>) -> reqwest::Response {
        let stub = spawn_stub(stub_router()).await;
        let config = Config::default().with_request_url(stub).with_app_id("test-app");
        let base = spawn_stub(router(config)).await;

        reqwest::Client::new()
            .post(format!("{}{}", base, path.trim_start_matches('/')))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(body)
            .send()
            .await
            .unwrap()
    }

    fn codes_csv() -> String {
        format!("HSコード,品目\n{},馬\nresume,不明\n", SUCCESS_CODE)
    }

    #[test]
    fn test_content_disposition() {
        let value = content_disposition("通関統計API_2023_20240101000000.csv");
        assert!(value.starts_with("attachment; filename=\""));
        assert!(value.contains("API_2023_20240101000000.csv"));
        assert!(value.contains("filename*=UTF-8''%E9%80%9A"));
        // Unreserved characters pass through the UTF-8 name unescaped.
        assert!(value.ends_with("%E8%A8%88API_2023_20240101000000.csv"));
        assert!(HeaderValue::from_str(&value).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_json() {
        let body = multipart_body(&[("year", "2023")], Some(&codes_csv()));
        let response = post("/api/fetch", body).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["status"], "warning");
        assert_eq!(json["summary"]["processed"], 1);
        assert_eq!(json["summary"]["errored"], 1);
        assert_eq!(json["rows"].as_array().unwrap().len(), 1);
        assert_eq!(json["download"]["encoding"], "cp932");
    }

    #[tokio::test]
    async fn test_fetch_csv_attachment() {
        let body = multipart_body(&[("year", "2023"), ("strict", "true")], Some(&codes_csv()));
        let response = post("/api/fetch/csv", body).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let headers = response.headers().clone();
        assert_eq!(headers[header::CONTENT_TYPE.as_str()], "text/csv");
        assert!(headers[header::CONTENT_DISPOSITION.as_str()]
            .to_str()
            .unwrap()
            .contains("attachment"));

        let bytes = response.bytes().await.unwrap();
        let (text, _, had_errors) = encoding_rs::SHIFT_JIS.decode(&bytes);
        assert!(!had_errors);
        assert!(text.starts_with("HSコード,品目,年,月,年月,区分"));
        assert!(text.contains("2023-01-01"));
    }

    #[tokio::test]
    async fn test_missing_year_is_bad_request() {
        let body = multipart_body(&[], Some(&codes_csv()));
        let response = post("/api/fetch", body).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Invalid request: No year provided");
    }

    #[tokio::test]
    async fn test_no_data_is_unprocessable() {
        let body = multipart_body(&[("year", "2023")], Some("HSコード,品目\nresume,x\n"));
        let response = post("/api/fetch", body).await;
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
