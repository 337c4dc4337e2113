//! CSV export with Japanese Excel friendly encodings.
//!
//! Primary output is cp932 (Shift_JIS). Characters cp932 cannot represent
//! are replaced by `?` unless [`ReplacementPolicy::Strict`] is selected, in
//! which case the whole file falls back to UTF-8 with a BOM.

use chrono::NaiveDateTime;
use csv::{QuoteStyle, WriterBuilder};
use encoding_rs::{EncoderResult, SHIFT_JIS};
use serde::Serialize;

use crate::api::logs::log_warning;
use crate::error::{ExportError, ExportResult};
use crate::models::Table;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Substitute for characters cp932 cannot encode.
pub const REPLACEMENT: u8 = b'?';

/// What to do with characters the primary encoding cannot represent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Write `?` and keep cp932.
    #[default]
    Replace,
    /// Treat any unmappable character as a failure and fall back to UTF-8.
    Strict,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    pub policy: ReplacementPolicy,
}

impl ExportOptions {
    pub fn strict() -> Self {
        Self { policy: ReplacementPolicy::Strict }
    }
}

/// Encoding actually used for an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputEncoding {
    #[serde(rename = "cp932")]
    Cp932,
    #[serde(rename = "utf-8-sig")]
    Utf8Sig,
}

impl OutputEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            OutputEncoding::Cp932 => "cp932",
            OutputEncoding::Utf8Sig => "utf-8-sig",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputEncoding::Cp932 => "text/csv",
            OutputEncoding::Utf8Sig => "text/csv;charset=utf-8-sig",
        }
    }
}

/// Encoded CSV ready for download.
#[derive(Debug, Clone)]
pub struct CsvExport {
    pub bytes: Vec<u8>,
    pub encoding: OutputEncoding,
    pub mime_type: &'static str,
    /// Characters written as `?`.
    pub replaced: usize,
}

/// `通関統計API_{year}_{YYYYmmddHHMMSS}.csv`
pub fn download_file_name(year: i32, now: NaiveDateTime) -> String {
    format!("通関統計API_{}_{}.csv", year, now.format("%Y%m%d%H%M%S"))
}

/// Render the table as CSV text. Nulls become empty fields.
pub fn render_csv(table: &Table) -> Result<String, csv::Error> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .from_writer(Vec::new());

    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.render()))?;
    }

    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Encode to cp932. Returns the bytes and the number of replaced characters.
pub fn encode_cp932(text: &str, policy: ReplacementPolicy) -> Result<(Vec<u8>, usize), String> {
    let mut encoder = SHIFT_JIS.new_encoder();
    let mut out = Vec::with_capacity(text.len() + 16);
    let mut rest = text;
    let mut replaced = 0;

    loop {
        let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(rest, &mut out, true);
        rest = &rest[read..];
        match result {
            EncoderResult::InputEmpty => break,
            EncoderResult::OutputFull => out.reserve(rest.len() * 2 + 16),
            EncoderResult::Unmappable(c) => match policy {
                ReplacementPolicy::Strict => {
                    return Err(format!("character '{}' (U+{:04X}) has no cp932 mapping", c, c as u32));
                }
                ReplacementPolicy::Replace => {
                    out.push(REPLACEMENT);
                    replaced += 1;
                }
            },
        }
    }

    Ok((out, replaced))
}

fn encode_utf8_sig(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(UTF8_BOM.len() + text.len());
    out.extend_from_slice(UTF8_BOM);
    out.extend_from_slice(text.as_bytes());
    out
}

/// Serialize the table: cp932 first, UTF-8 with BOM if that fails.
pub fn export_csv(table: &Table, options: &ExportOptions) -> ExportResult<CsvExport> {
    let primary = render_csv(table)
        .map_err(|e| e.to_string())
        .and_then(|text| encode_cp932(&text, options.policy));

    let primary = match primary {
        Ok((bytes, replaced)) => {
            if replaced > 0 {
                log_warning(format!("{} character(s) could not be written as cp932 and were replaced by '?'", replaced));
            }
            return Ok(CsvExport {
                bytes,
                encoding: OutputEncoding::Cp932,
                mime_type: OutputEncoding::Cp932.mime_type(),
                replaced,
            });
        }
        Err(e) => e,
    };

    log_warning(format!("cp932 export failed ({}); writing UTF-8 with BOM instead", primary));

    match render_csv(table) {
        Ok(text) => Ok(CsvExport {
            bytes: encode_utf8_sig(&text),
            encoding: OutputEncoding::Utf8Sig,
            mime_type: OutputEncoding::Utf8Sig.mime_type(),
            replaced: 0,
        }),
        Err(e) => Err(ExportError::Failed { primary, fallback: e.to_string() }),
    }
}
