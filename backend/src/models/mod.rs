//! Domain models for the customs statistics pipeline.
//!
//! - [`CodeList`] - HS codes (and item labels) read from the uploaded file
//! - [`FlatRecord`] - one API value row with long column names
//! - [`LookupTable`] - code -> name classification table from the metadata
//! - [`EnrichedRecord`] - a flat record after the metadata joins
//! - [`ShapedRecord`] - final presentation row
//! - [`RunSummary`] - processed / skipped / errored counters
//! - [`Warning`] - non-fatal condition reported to the caller
//! - [`table`] - generic typed table consumed by export and the HTTP API

pub mod table;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::estat::envelope::ValueRow;

pub use table::{Cell, Table};

/// Column headers of the input, intermediate and output tables.
pub mod columns {
    pub const HS_CODE: &str = "HSコード";
    pub const LABEL: &str = "品目";
    pub const CATEGORY_CODE: &str = "区分コード";
    pub const OFFICE_CODE: &str = "税関コード";
    pub const COUNTRY_CODE: &str = "国コード";
    pub const PERIOD_CODE: &str = "年コード";
    pub const VALUE: &str = "値（金額、数量）";
    pub const UNIT: &str = "単位";
    pub const CATEGORY_NAME: &str = "区分名";
    pub const CATEGORY_PARENT: &str = "親コード";
    pub const OFFICE_NAME: &str = "税関";
    pub const COUNTRY_NAME: &str = "国名";
    pub const YEAR: &str = "年";
    pub const MONTH: &str = "月";
    pub const YEAR_MONTH: &str = "年月";
    pub const CATEGORY: &str = "区分";
}

// =============================================================================
// Code List (input)
// =============================================================================

/// One HS code from the input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub code: String,
    pub label: Option<String>,
}

/// Ordered, deduplicated HS codes with their item labels.
///
/// Codes are trimmed; empty codes are dropped and the first occurrence of a
/// code wins (both for position and for its label).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CodeList {
    entries: Vec<CodeEntry>,
    has_labels: bool,
}

impl CodeList {
    /// Build from raw `(code, label)` pairs.
    pub fn from_pairs<I, C, L>(pairs: I, has_labels: bool) -> Self
    where
        I: IntoIterator<Item = (C, Option<L>)>,
        C: AsRef<str>,
        L: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for (code, label) in pairs {
            let code = code.as_ref().trim();
            if code.is_empty() || !seen.insert(code.to_string()) {
                continue;
            }
            let label = label
                .map(|l| l.as_ref().trim().to_string())
                .filter(|l| !l.is_empty());
            entries.push(CodeEntry { code: code.to_string(), label });
        }

        Self { entries, has_labels }
    }

    pub fn entries(&self) -> &[CodeEntry] {
        &self.entries
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.code.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the input file had a label column at all.
    pub fn has_labels(&self) -> bool {
        self.has_labels
    }

    /// Code -> label index for joining.
    pub fn label_index(&self) -> HashMap<&str, &str> {
        self.entries
            .iter()
            .filter_map(|e| e.label.as_deref().map(|l| (e.code.as_str(), l)))
            .collect()
    }
}

// =============================================================================
// Flat Record
// =============================================================================

/// A value row with its short field codes renamed.
///
/// | API key  | Field           | Column               |
/// |----------|-----------------|----------------------|
/// | `@cat01` | `hs_code`       | HSコード             |
/// | `@cat02` | `category_code` | 区分コード           |
/// | `@cat03` | `office_code`   | 税関コード           |
/// | `@area`  | `country_code`  | 国コード             |
/// | `@time`  | `period_code`   | 年コード             |
/// | `$`      | `value`         | 値（金額、数量）     |
/// | `@unit`  | `unit`          | 単位                 |
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatRecord {
    pub hs_code: Option<String>,
    pub category_code: Option<String>,
    pub office_code: Option<String>,
    pub country_code: Option<String>,
    pub period_code: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
}

impl From<ValueRow> for FlatRecord {
    fn from(row: ValueRow) -> Self {
        Self {
            hs_code: row.cat01,
            category_code: row.cat02,
            office_code: row.cat03,
            country_code: row.area,
            period_code: row.time,
            value: row.value,
            unit: row.unit,
        }
    }
}

// =============================================================================
// Lookup Tables
// =============================================================================

/// Name (and parent code) for one classification code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupEntry {
    pub name: Option<String>,
    pub parent_code: Option<String>,
}

/// Code -> name classification table.
///
/// An unavailable table (classification missing from the metadata) joins
/// like an empty one; the flag only tells the shaper whether the source
/// column existed at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    available: bool,
    entries: HashMap<String, LookupEntry>,
}

impl LookupTable {
    /// Table for a classification that was not in the metadata.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Build from `(code, entry)` pairs. Duplicate codes keep the first entry
    /// so that a left join can never multiply rows.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, LookupEntry)>,
    {
        let mut map = HashMap::new();
        for (code, entry) in entries {
            map.entry(code).or_insert(entry);
        }
        Self { available: true, entries: map }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn get(&self, code: &str) -> Option<&LookupEntry> {
        self.entries.get(code)
    }

    /// Name for an optional code.
    pub fn name_of(&self, code: Option<&str>) -> Option<String> {
        code.and_then(|c| self.get(c)).and_then(|e| e.name.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Enriched / Shaped Records
// =============================================================================

/// A flat record after the category, office, country and label joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichedRecord {
    pub record: FlatRecord,
    pub label: Option<String>,
    pub category_name: Option<String>,
    pub category_parent: Option<String>,
    pub office_name: Option<String>,
    pub country_name: Option<String>,
}

impl From<FlatRecord> for EnrichedRecord {
    fn from(record: FlatRecord) -> Self {
        Self { record, ..Self::default() }
    }
}

/// Final presentation row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapedRecord {
    pub hs_code: Option<String>,
    pub label: Option<String>,
    pub year: Option<i32>,
    pub month: Option<String>,
    pub year_month: Option<NaiveDate>,
    pub category: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub office_code: Option<String>,
    pub office_name: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

// =============================================================================
// Run Summary & Warnings
// =============================================================================

/// Per-identifier outcome counters.
///
/// `skipped` is the sum of `empty` (success without rows) and `malformed`
/// (unusable envelope); both are kept so callers can present them apart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub empty: usize,
    pub malformed: usize,
}

impl RunSummary {
    /// Number of identifiers accounted for.
    pub fn total(&self) -> usize {
        self.processed + self.skipped + self.errored
    }

    /// One-line result message.
    pub fn describe(&self, rows: usize) -> String {
        format!(
            "取得件数: {}件 (処理成功: {}, スキップ: {}, エラー: {})",
            rows, self.processed, self.skipped, self.errored
        )
    }
}

/// Pipeline stage a warning belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Merge,
    Shape,
    Export,
}

/// What a warning is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum WarningScope {
    Identifier(String),
    Stage(Stage),
}

/// A non-fatal condition surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub scope: WarningScope,
    pub message: String,
}

impl Warning {
    pub fn identifier(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { scope: WarningScope::Identifier(code.into()), message: message.into() }
    }

    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        Self { scope: WarningScope::Stage(stage), message: message.into() }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.scope {
            WarningScope::Identifier(code) => write!(f, "[HS {}] {}", code, self.message),
            WarningScope::Stage(stage) => write!(f, "[{:?}] {}", stage, self.message),
        }
    }
}
