//! HS code list reader with encoding and delimiter auto-detection.
//!
//! The uploaded file is usually exported from Excel on Windows (cp932), but
//! UTF-8 files are accepted too. Decoding is a success heuristic: cp932 is
//! tried first, then UTF-8 from the start of the payload. A UTF-8 BOM
//! short-circuits to UTF-8.

use csv::{ReaderBuilder, StringRecord, Trim};
use encoding_rs::SHIFT_JIS;
use std::borrow::Cow;
use std::path::Path;

use crate::api::logs::log_warning;
use crate::error::{InputFormatError, InputResult};
use crate::models::{columns, CodeList};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encodings accepted for the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEncoding {
    Cp932,
    Utf8,
}

impl InputEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            InputEncoding::Cp932 => "cp932",
            InputEncoding::Utf8 => "utf-8",
        }
    }
}

/// Column names and delimiter override.
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Column holding the HS codes (required).
    pub code_column: String,
    /// Column holding the item labels (optional).
    pub label_column: String,
    /// Field delimiter (auto-detect if `None`).
    pub delimiter: Option<u8>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            code_column: columns::HS_CODE.to_string(),
            label_column: columns::LABEL.to_string(),
            delimiter: None,
        }
    }
}

/// Result of reading the code list, with what was detected on the way.
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Deduplicated codes and labels.
    pub codes: CodeList,
    /// Encoding that decoded the payload.
    pub encoding: InputEncoding,
    /// Delimiter used.
    pub delimiter: u8,
    /// Header row.
    pub headers: Vec<String>,
    /// Data rows read (before deduplication).
    pub row_count: usize,
}

/// Decode with cp932 first, then UTF-8. Returns every encoding that
/// decodes cleanly, in preference order.
pub fn decode_candidates(bytes: &[u8]) -> Vec<(InputEncoding, Cow<'_, str>)> {
    if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        return std::str::from_utf8(rest)
            .map(|s| vec![(InputEncoding::Utf8, Cow::Borrowed(s))])
            .unwrap_or_default();
    }

    let mut candidates = Vec::with_capacity(2);
    if let Some(text) = SHIFT_JIS.decode_without_bom_handling_and_without_replacement(bytes) {
        candidates.push((InputEncoding::Cp932, text));
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        candidates.push((InputEncoding::Utf8, Cow::Borrowed(text)));
    }
    candidates
}

/// Detect the delimiter by counting occurrences in the first line.
/// Comma wins ties.
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(char::from(sep)).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

fn clean_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').to_string()
}

fn read_headers(content: &str, delimiter: u8) -> InputResult<Vec<String>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());
    Ok(reader.headers()?.iter().map(clean_header).collect())
}

/// Read the HS code list from raw bytes.
///
/// Fails when the code column is absent or when no non-empty code is left
/// after trimming and deduplication (a header-only file included).
pub fn read_code_list(bytes: &[u8], options: &ReaderOptions) -> InputResult<ParseResult> {
    let candidates = decode_candidates(bytes);
    if candidates.is_empty() {
        return Err(InputFormatError::Undecodable);
    }

    // A UTF-8 file can occasionally decode as cp932 mojibake; prefer the
    // first decoding whose header row actually has the code column.
    let mut first_headers: Option<Vec<String>> = None;
    for (index, (encoding, content)) in candidates.iter().enumerate() {
        let delimiter = options.delimiter.unwrap_or_else(|| detect_delimiter(content));
        let headers = read_headers(content, delimiter)?;

        if headers.iter().any(|h| h == &options.code_column) {
            if index > 0 {
                log_warning(format!(
                    "Could not read the file as {}; retried as {}",
                    candidates[0].0.name(),
                    encoding.name()
                ));
            }
            return parse_content(content, *encoding, delimiter, headers, options);
        }
        first_headers.get_or_insert(headers);
    }

    Err(InputFormatError::MissingColumn {
        column: options.code_column.clone(),
        found: first_headers.unwrap_or_default(),
    })
}

fn parse_content(
    content: &str,
    encoding: InputEncoding,
    delimiter: u8,
    headers: Vec<String>,
    options: &ReaderOptions,
) -> InputResult<ParseResult> {
    let position = |name: &str| headers.iter().position(|h| h == name);

    let code_idx = position(&options.code_column).ok_or_else(|| InputFormatError::MissingColumn {
        column: options.code_column.clone(),
        found: headers.clone(),
    })?;
    let label_idx = position(&options.label_column);

    if label_idx.is_none() {
        log_warning(format!(
            "Column '{}' not found; item labels will be empty",
            options.label_column
        ));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(content.as_bytes());

    let mut pairs: Vec<(String, Option<String>)> = Vec::new();
    let mut record = StringRecord::new();
    while reader.read_record(&mut record)? {
        let code = record.get(code_idx).unwrap_or("").to_string();
        let label = label_idx.and_then(|i| record.get(i)).map(str::to_string);
        pairs.push((code, label));
    }

    let row_count = pairs.len();
    let codes = CodeList::from_pairs(pairs, label_idx.is_some());

    if codes.is_empty() {
        return Err(InputFormatError::NoIdentifiers { column: options.code_column.clone() });
    }

    Ok(ParseResult { codes, encoding, delimiter, headers, row_count })
}

/// Read the HS code list from a file.
pub fn read_code_file<P: AsRef<Path>>(path: P, options: &ReaderOptions) -> InputResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    read_code_list(&bytes, options)
}
