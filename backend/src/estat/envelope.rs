//! Typed view of the `getStatsData` JSON response.
//!
//! ```text
//! GET_STATS_DATA
//! ├── RESULT { STATUS, ERROR_MSG }
//! └── STATISTICAL_DATA
//!     ├── CLASS_INF.CLASS_OBJ[] { @id, @name, CLASS[] { @code, @name, @parentCode } }
//!     └── DATA_INF.VALUE[]      { @cat01, @cat02, @cat03, @area, @time, @unit, $ }
//! ```
//!
//! e-Stat collapses one-element lists into a bare object, so every list is
//! decoded through [`OneOrMany`]. Scalars may come as strings or numbers and
//! are normalized to strings.
//!
//! `RESULT` and `DATA_INF` are decoded up front. `CLASS_INF` is kept as raw
//! JSON and each classification table is decoded only when looked up, so an
//! odd metadata entry never costs the value rows.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::MetadataError;

/// Top-level key wrapping the whole response.
pub const ENVELOPE_KEY: &str = "GET_STATS_DATA";

/// Status code of a successful call.
pub const STATUS_OK: i64 = 0;

/// A list that may have been collapsed to its single element.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => std::slice::from_ref(item),
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Content of `GET_STATS_DATA`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatsEnvelope {
    #[serde(rename = "RESULT")]
    pub result: ApiResult,

    #[serde(rename = "STATISTICAL_DATA", default)]
    pub statistical_data: Option<StatisticalData>,
}

/// `RESULT` block.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResult {
    #[serde(rename = "STATUS", deserialize_with = "de_status")]
    pub status: i64,

    #[serde(rename = "ERROR_MSG", default, deserialize_with = "de_opt_scalar")]
    pub error_msg: Option<String>,
}

/// `STATISTICAL_DATA` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticalData {
    #[serde(rename = "CLASS_INF", default)]
    pub class_inf: Option<Value>,

    #[serde(rename = "DATA_INF", default)]
    pub data_inf: Option<DataInf>,
}

/// One classification table, e.g. `cat02` or `area`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassObj {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@name", default)]
    pub name: Option<String>,

    #[serde(rename = "CLASS", default)]
    pub class: Option<OneOrMany<ClassEntry>>,
}

/// A `{code, name, parentCode?}` triple.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassEntry {
    #[serde(rename = "@code", deserialize_with = "de_scalar")]
    pub code: String,

    #[serde(rename = "@name", default, deserialize_with = "de_opt_scalar")]
    pub name: Option<String>,

    #[serde(rename = "@parentCode", default, deserialize_with = "de_opt_scalar")]
    pub parent_code: Option<String>,
}

/// `DATA_INF` block.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataInf {
    #[serde(rename = "VALUE", default)]
    pub value: Option<OneOrMany<ValueRow>>,
}

/// One data point with short field codes. Unknown keys (`@tab`, ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ValueRow {
    #[serde(rename = "@cat01", default, deserialize_with = "de_opt_scalar")]
    pub cat01: Option<String>,

    #[serde(rename = "@cat02", default, deserialize_with = "de_opt_scalar")]
    pub cat02: Option<String>,

    #[serde(rename = "@cat03", default, deserialize_with = "de_opt_scalar")]
    pub cat03: Option<String>,

    #[serde(rename = "@area", default, deserialize_with = "de_opt_scalar")]
    pub area: Option<String>,

    #[serde(rename = "@time", default, deserialize_with = "de_opt_scalar")]
    pub time: Option<String>,

    #[serde(rename = "@unit", default, deserialize_with = "de_opt_scalar")]
    pub unit: Option<String>,

    #[serde(rename = "$", default, deserialize_with = "de_opt_scalar")]
    pub value: Option<String>,
}

impl StatsEnvelope {
    pub fn status(&self) -> i64 {
        self.result.status
    }

    pub fn is_ok(&self) -> bool {
        self.result.status == STATUS_OK
    }

    /// Move the value rows out, leaving the metadata in place.
    pub fn take_rows(&mut self) -> Vec<ValueRow> {
        self.statistical_data
            .as_mut()
            .and_then(|sd| sd.data_inf.as_mut())
            .and_then(|di| di.value.take())
            .map(OneOrMany::into_vec)
            .unwrap_or_default()
    }

    /// Raw `CLASS_INF` block, if the response carried one.
    pub fn class_inf(&self) -> Option<&Value> {
        self.statistical_data.as_ref()?.class_inf.as_ref()
    }

    /// Decode the classification table with the given `@id`.
    pub fn class_object(&self, id: &str) -> Result<ClassObj, MetadataError> {
        let not_found = || MetadataError::NotFound(id.to_string());

        let raw = match self.class_inf().and_then(|ci| ci.get("CLASS_OBJ")) {
            Some(Value::Array(objs)) => objs.iter().find(|obj| has_id(obj, id)),
            Some(obj) => Some(obj).filter(|obj| has_id(obj, id)),
            None => None,
        }
        .ok_or_else(not_found)?;

        ClassObj::deserialize(raw).map_err(|e| MetadataError::Invalid {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

fn has_id(obj: &Value, id: &str) -> bool {
    obj.get("@id").and_then(Value::as_str) == Some(id)
}

impl ClassObj {
    pub fn entries(&self) -> &[ClassEntry] {
        self.class.as_ref().map(OneOrMany::as_slice).unwrap_or_default()
    }
}

/// Decode `GET_STATS_DATA` content.
pub fn decode(raw: Value) -> Result<StatsEnvelope, serde_json::Error> {
    serde_json::from_value(raw)
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn de_opt_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(scalar_to_string))
}

fn de_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_string(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("expected a string or number"))
}

fn de_status<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("STATUS is not an integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("STATUS '{}' is not numeric", s))),
        other => Err(serde::de::Error::custom(format!("unexpected STATUS value: {}", other))),
    }
}
