//! e-Stat `getStatsData` client.
//!
//! One GET per HS code, sequentially, exactly one attempt each. Every call
//! ends in an [`Outcome`]; nothing here returns `Err` or panics, so the
//! fetch loop never has to catch anything.
//!
//! ```rust,ignore
//! use customs_stats::{Config, EStatClient};
//!
//! let config = Config::from_env()?.with_app_id("my-app-id");
//! let client = EStatClient::new(&config, 2023)?;
//! let outcome = client.fetch("010121010").await;
//! ```

pub mod envelope;

#[cfg(test)]
pub(crate) mod testing;

use serde_json::Value;

use crate::config::Config;
use crate::error::ConfigResult;
use envelope::{StatsEnvelope, ValueRow, ENVELOPE_KEY};

/// Query parameter carrying the HS code.
pub const CODE_PARAM: &str = "cdCat01";

/// Message used when a failed call carries no `ERROR_MSG`.
pub const UNKNOWN_ERROR: &str = "不明なエラー";

// =============================================================================
// Outcome
// =============================================================================

/// Result of fetching one identifier.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// STATUS 0 with value rows. `envelope` keeps the metadata; its rows were moved into `rows`.
    Success {
        code: String,
        rows: Vec<ValueRow>,
        envelope: Box<StatsEnvelope>,
    },
    /// STATUS 0 but no value rows.
    EmptyResult { code: String, message: Option<String> },
    /// JSON without the envelope key or without `RESULT.STATUS`.
    MalformedResponse { code: String, reason: String },
    /// STATUS other than 0.
    ApiError { code: String, status: i64, message: String },
    /// Connection failure, timeout or HTTP error status.
    TransportError { code: String, detail: String },
    /// Body is not JSON.
    ParseError { code: String, detail: String },
}

impl Outcome {
    pub fn code(&self) -> &str {
        match self {
            Outcome::Success { code, .. }
            | Outcome::EmptyResult { code, .. }
            | Outcome::MalformedResponse { code, .. }
            | Outcome::ApiError { code, .. }
            | Outcome::TransportError { code, .. }
            | Outcome::ParseError { code, .. } => code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// Human-readable description of a non-success outcome.
    pub fn describe(&self) -> String {
        match self {
            Outcome::Success { rows, .. } => format!("{} rows", rows.len()),
            Outcome::EmptyResult { message: Some(message), .. } => message.clone(),
            Outcome::EmptyResult { message: None, .. } => "No data (VALUE) found".to_string(),
            Outcome::MalformedResponse { reason, .. } => format!("Malformed response: {}", reason),
            Outcome::ApiError { status, message, .. } => {
                format!("API error (STATUS: {}, MSG: {})", status, message)
            }
            Outcome::TransportError { detail, .. } => format!("Transport error: {}", detail),
            Outcome::ParseError { detail, .. } => format!("Response is not JSON: {}", detail),
        }
    }
}

/// Classify a response body.
///
/// Presence checks happen once here; the rest of the pipeline only sees
/// decoded [`StatsEnvelope`]s.
pub fn classify(code: &str, body: &str) -> Outcome {
    let mut json: Value = match serde_json::from_str(body) {
        Ok(json) => json,
        Err(e) => {
            return Outcome::ParseError { code: code.to_string(), detail: e.to_string() };
        }
    };

    let Some(raw) = json.get_mut(ENVELOPE_KEY).map(Value::take) else {
        return Outcome::MalformedResponse {
            code: code.to_string(),
            reason: format!("missing {}", ENVELOPE_KEY),
        };
    };

    if raw.get("RESULT").and_then(|r| r.get("STATUS")).is_none() {
        return Outcome::MalformedResponse {
            code: code.to_string(),
            reason: "missing RESULT.STATUS".to_string(),
        };
    }

    let mut envelope = match envelope::decode(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Outcome::MalformedResponse {
                code: code.to_string(),
                reason: format!("unexpected envelope shape: {}", e),
            };
        }
    };

    if !envelope.is_ok() {
        return Outcome::ApiError {
            code: code.to_string(),
            status: envelope.status(),
            message: envelope
                .result
                .error_msg
                .clone()
                .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
        };
    }

    let rows = envelope.take_rows();
    if rows.is_empty() {
        return Outcome::EmptyResult {
            code: code.to_string(),
            message: envelope.result.error_msg.clone(),
        };
    }

    Outcome::Success { code: code.to_string(), rows, envelope: Box::new(envelope) }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Fixed query parameters shared by every call of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
    fixed: Vec<(&'static str, String)>,
}

impl RequestParams {
    pub fn new(config: &Config, app_id: &str, year: i32) -> Self {
        let fixed = vec![
            ("cdTime", cd_time(year)),
            ("appId", app_id.to_string()),
            ("lang", config.lang.clone()),
            ("statsDataId", config.stats_data_id.clone()),
            ("metaGetFlg", "Y".to_string()),
            ("cntGetFlg", "N".to_string()),
            ("explanationGetFlg", "Y".to_string()),
            ("annotationGetFlg", "Y".to_string()),
            ("sectionHeaderFlg", "1".to_string()),
            ("replaceSpChars", "0".to_string()),
        ];
        Self { fixed }
    }

    /// The template with the HS code overlaid.
    pub fn for_code(&self, code: &str) -> Vec<(&'static str, String)> {
        let mut query = self.fixed.clone();
        query.push((CODE_PARAM, code.to_string()));
        query
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fixed
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Period code for a whole year: `YYYY000000`.
pub fn cd_time(year: i32) -> String {
    format!("{}000000", year)
}

// =============================================================================
// Client
// =============================================================================

/// HTTP client bound to one run (one year, one application id).
#[derive(Clone)]
pub struct EStatClient {
    http: reqwest::Client,
    url: String,
    params: RequestParams,
}

impl EStatClient {
    /// Create a client. Fails if the configuration has no application id
    /// or an unusable URL.
    pub fn new(config: &Config, year: i32) -> ConfigResult<Self> {
        config.check_url()?;
        let app_id = config.require_app_id()?;
        Ok(Self {
            http: reqwest::Client::new(),
            url: config.request_url.clone(),
            params: RequestParams::new(config, app_id, year),
        })
    }

    /// Fetch one HS code. Single attempt.
    pub async fn fetch(&self, code: &str) -> Outcome {
        let transport = |e: reqwest::Error| Outcome::TransportError {
            code: code.to_string(),
            detail: e.to_string(),
        };

        let response = match self
            .http
            .get(&self.url)
            .query(&self.params.for_code(code))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return transport(e),
        };

        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => return transport(e),
        };

        match response.text().await {
            Ok(body) => classify(code, &body),
            Err(e) => transport(e),
        }
    }
}
