//! Canned e-Stat responses and an in-process stub server for tests.

use axum::{
    extract::Query,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::CODE_PARAM;

/// HS code the stub answers with data and full metadata.
pub const SUCCESS_CODE: &str = "010121010";

/// HS code the stub answers with data but no `CLASS_INF`.
pub const NO_META_CODE: &str = "020110000";

/// HS code the stub answers with full metadata but rows without `@time`.
pub const NO_PERIOD_CODE: &str = "030110000";

/// Category code whose label is `01_輸出`.
pub const EXPORT_CATEGORY: &str = "100";

/// Category metadata used by [`success_body`].
pub fn category_classes() -> Value {
    json!([
        { "@code": "100", "@name": "01_輸出", "@parentCode": "1" },
        { "@code": "110", "@name": "合計_金額" },
        { "@code": "120", "@name": "単位2" },
        { "@code": "130", "@name": "13_輸出" },
        { "@code": "140", "@name": "計" },
        { "@code": "150", "@name": "02_輸入", "@parentCode": "2" },
        { "@code": "160" }
    ])
}

fn value_rows(code: &str, rows: &[(&str, &str)]) -> Value {
    rows.iter()
        .map(|(category, value)| {
            json!({
                "@tab": "100",
                "@cat01": code,
                "@cat02": category,
                "@cat03": "100",
                "@area": "105",
                "@time": "2023000000",
                "@unit": "円",
                "$": value
            })
        })
        .collect()
}

/// Successful response with metadata; `rows` are `(category code, value)` pairs.
pub fn success_body(code: &str, rows: &[(&str, &str)]) -> Value {
    json!({
        "GET_STATS_DATA": {
            "RESULT": { "STATUS": 0, "ERROR_MSG": "正常に終了しました。" },
            "STATISTICAL_DATA": {
                "CLASS_INF": {
                    "CLASS_OBJ": [
                        { "@id": "cat01", "@name": "品目", "CLASS": { "@code": code, "@name": "品目名" } },
                        { "@id": "cat02", "@name": "区分", "CLASS": category_classes() },
                        { "@id": "cat03", "@name": "税関", "CLASS": [
                            { "@code": "100", "@name": "東京" },
                            { "@code": "100", "@name": "重複" }
                        ]},
                        { "@id": "area", "@name": "国", "CLASS": [
                            { "@code": "105", "@name": "105_中華人民共和国" },
                            { "@code": "304", "@name": "アメリカ合衆国" }
                        ]}
                    ]
                },
                "DATA_INF": { "VALUE": value_rows(code, rows) }
            }
        }
    })
}

/// Successful response without `CLASS_INF`.
pub fn no_metadata_body(code: &str, rows: &[(&str, &str)]) -> Value {
    json!({
        "GET_STATS_DATA": {
            "RESULT": { "STATUS": 0 },
            "STATISTICAL_DATA": { "DATA_INF": { "VALUE": value_rows(code, rows) } }
        }
    })
}

/// Successful response with metadata whose rows carry no period code.
pub fn no_period_body(code: &str, rows: &[(&str, &str)]) -> Value {
    let mut body = success_body(code, rows);
    if let Some(values) = body["GET_STATS_DATA"]["STATISTICAL_DATA"]["DATA_INF"]["VALUE"].as_array_mut() {
        for value in values.iter_mut().filter_map(Value::as_object_mut) {
            value.remove("@time");
        }
    }
    body
}

/// Failed response.
pub fn error_body(status: i64, message: Option<&str>) -> Value {
    let mut result = json!({ "STATUS": status });
    if let Some(message) = message {
        result["ERROR_MSG"] = json!(message);
    }
    json!({ "GET_STATS_DATA": { "RESULT": result } })
}

async fn stub_handler(Query(query): Query<HashMap<String, String>>) -> Response {
    let code = query.get(CODE_PARAM).map(String::as_str).unwrap_or_default();
    match code {
        SUCCESS_CODE => Json(success_body(code, &[(EXPORT_CATEGORY, "12345")])).into_response(),
        NO_META_CODE => Json(no_metadata_body(code, &[(EXPORT_CATEGORY, "500")])).into_response(),
        NO_PERIOD_CODE => Json(no_period_body(code, &[(EXPORT_CATEGORY, "700")])).into_response(),
        "empty" => Json(json!({ "GET_STATS_DATA": { "RESULT": { "STATUS": 0 } } })).into_response(),
        "malformed" => Json(json!({ "unexpected": true })).into_response(),
        "garbage" => "<html>maintenance</html>".into_response(),
        _ => Json(error_body(1, Some("該当データなし"))).into_response(),
    }
}

/// Router answering like `getStatsData`, keyed on `cdCat01`.
pub fn stub_router() -> Router {
    Router::new().route("/", get(stub_handler))
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}/", addr)
}
