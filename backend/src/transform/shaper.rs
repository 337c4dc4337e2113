//! Reshape enriched records into the final presentation table.
//!
//! Category labels look like `01_輸出`: the part before the first `_` is a
//! month token, the rest is the flow/measure category. Summary and unit
//! rows (`合計_金額`, `単位2`, ...) and labels without a usable month are
//! not data and are removed.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ShapeError;
use crate::models::{columns, Cell, EnrichedRecord, ShapedRecord, Table};
use crate::transform::resolver::Resolved;

/// Category labels that are never data rows.
pub const CATEGORY_DENYLIST: &[&str] = &["単位2", "合計_金額", "合計_数量1", "合計_数量2"];

static FIRST_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

/// Columns of the shaped table, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColumn {
    HsCode,
    Label,
    Year,
    Month,
    YearMonth,
    Category,
    CountryCode,
    CountryName,
    OfficeCode,
    OfficeName,
    Value,
    Unit,
}

impl OutputColumn {
    pub const ALL: [OutputColumn; 12] = [
        OutputColumn::HsCode,
        OutputColumn::Label,
        OutputColumn::Year,
        OutputColumn::Month,
        OutputColumn::YearMonth,
        OutputColumn::Category,
        OutputColumn::CountryCode,
        OutputColumn::CountryName,
        OutputColumn::OfficeCode,
        OutputColumn::OfficeName,
        OutputColumn::Value,
        OutputColumn::Unit,
    ];

    pub fn header(&self) -> &'static str {
        match self {
            OutputColumn::HsCode => columns::HS_CODE,
            OutputColumn::Label => columns::LABEL,
            OutputColumn::Year => columns::YEAR,
            OutputColumn::Month => columns::MONTH,
            OutputColumn::YearMonth => columns::YEAR_MONTH,
            OutputColumn::Category => columns::CATEGORY,
            OutputColumn::CountryCode => columns::COUNTRY_CODE,
            OutputColumn::CountryName => columns::COUNTRY_NAME,
            OutputColumn::OfficeCode => columns::OFFICE_CODE,
            OutputColumn::OfficeName => columns::OFFICE_NAME,
            OutputColumn::Value => columns::VALUE,
            OutputColumn::Unit => columns::UNIT,
        }
    }

    pub fn cell(&self, record: &ShapedRecord) -> Cell {
        match self {
            OutputColumn::HsCode => record.hs_code.clone().into(),
            OutputColumn::Label => record.label.clone().into(),
            OutputColumn::Year => record.year.into(),
            OutputColumn::Month => record.month.clone().into(),
            OutputColumn::YearMonth => record.year_month.into(),
            OutputColumn::Category => record.category.clone().into(),
            OutputColumn::CountryCode => record.country_code.clone().into(),
            OutputColumn::CountryName => record.country_name.clone().into(),
            OutputColumn::OfficeCode => record.office_code.clone().into(),
            OutputColumn::OfficeName => record.office_name.clone().into(),
            OutputColumn::Value => record.value.into(),
            OutputColumn::Unit => record.unit.clone().into(),
        }
    }
}

/// Shaped rows plus the columns that apply to them.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedTable {
    pub columns: Vec<OutputColumn>,
    pub records: Vec<ShapedRecord>,
}

impl ShapedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_table(&self) -> Table {
        let mut table = Table::new(self.columns.iter().map(OutputColumn::header));
        for record in &self.records {
            table.push_row(self.columns.iter().map(|c| c.cell(record)).collect());
        }
        table
    }
}

/// Year from the first four characters of a period code (`2023000000`).
pub fn parse_year(period_code: &str) -> Option<i32> {
    period_code.trim().get(..4)?.parse().ok()
}

/// Split `01_輸出` into `("01", Some("輸出"))`.
pub fn split_category(label: &str) -> (&str, Option<&str>) {
    match label.split_once('_') {
        Some((token, rest)) => (token, Some(rest)),
        None => (label, None),
    }
}

/// First run of ASCII digits in a month token.
pub fn month_digits(token: &str) -> Option<&str> {
    FIRST_DIGITS.find(token).map(|m| m.as_str())
}

/// Numeric value; placeholders such as `-` or `***` and thousands-separated
/// text (`1,234`) become `None`.
pub fn parse_value(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Month fields derived from a category label, or `None` if the row must go.
struct MonthFields {
    month: String,
    year_month: NaiveDate,
    category: Option<String>,
}

fn month_fields(label: Option<&str>, year: Option<i32>) -> Option<MonthFields> {
    let label = label.map(str::trim).filter(|l| !l.is_empty())?;
    if CATEGORY_DENYLIST.contains(&label) {
        return None;
    }

    let (token, rest) = split_category(label);
    let month_number = month_digits(token)?.parse().ok()?;
    let year_month = NaiveDate::from_ymd_opt(year?, month_number, 1)?;

    Some(MonthFields {
        month: token.to_string(),
        year_month,
        category: rest.map(str::to_string),
    })
}

fn shape_record(record: &EnrichedRecord, with_category: bool) -> Option<ShapedRecord> {
    let flat = &record.record;
    let year = flat.period_code.as_deref().and_then(parse_year);

    let (month, year_month, category) = if with_category {
        let fields = month_fields(record.category_name.as_deref(), year)?;
        (Some(fields.month), Some(fields.year_month), fields.category)
    } else {
        (None, None, None)
    };

    Some(ShapedRecord {
        hs_code: flat.hs_code.clone(),
        label: record.label.clone(),
        year,
        month,
        year_month,
        category,
        country_code: flat.country_code.clone(),
        country_name: record.country_name.clone(),
        office_code: flat.office_code.clone(),
        office_name: record.office_name.clone(),
        value: parse_value(flat.value.as_deref()),
        unit: flat.unit.clone(),
    })
}

/// Columns whose source exists upstream.
fn present_columns(resolved: &Resolved) -> Vec<OutputColumn> {
    let any = |f: fn(&EnrichedRecord) -> bool| resolved.records.iter().any(f);

    OutputColumn::ALL
        .into_iter()
        .filter(|column| match column {
            OutputColumn::Label => resolved.labels_available,
            OutputColumn::Year => any(|r| r.record.period_code.is_some()),
            OutputColumn::Month | OutputColumn::YearMonth | OutputColumn::Category => {
                resolved.category_available
            }
            OutputColumn::CountryCode => any(|r| r.record.country_code.is_some()),
            OutputColumn::CountryName => resolved.country_available,
            OutputColumn::OfficeCode => any(|r| r.record.office_code.is_some()),
            OutputColumn::OfficeName => resolved.office_available,
            OutputColumn::Unit => any(|r| r.record.unit.is_some()),
            OutputColumn::HsCode | OutputColumn::Value => true,
        })
        .collect()
}

/// Reshape resolved records into the presentation schema.
///
/// Rows are dropped only when the category table is available and the row
/// has no usable category label or year-month. Unparsable values become
/// empty cells, not drops.
pub fn shape(resolved: &Resolved) -> Result<ShapedTable, ShapeError> {
    let with_category = resolved.category_available;

    if with_category
        && !resolved.records.is_empty()
        && resolved.records.iter().all(|r| r.record.period_code.is_none())
    {
        return Err(ShapeError::MissingPeriodCode);
    }

    let records = resolved
        .records
        .iter()
        .filter_map(|r| shape_record(r, with_category))
        .collect();

    Ok(ShapedTable { columns: present_columns(resolved), records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FlatRecord;

    fn enriched(category: Option<&str>, value: &str) -> EnrichedRecord {
        EnrichedRecord {
            record: FlatRecord {
                hs_code: Some("010121010".into()),
                category_code: Some("100".into()),
                office_code: Some("100".into()),
                country_code: Some("105".into()),
                period_code: Some("2023000000".into()),
                value: Some(value.into()),
                unit: Some("円".into()),
            },
            label: Some("馬".into()),
            category_name: category.map(str::to_string),
            category_parent: None,
            office_name: Some("東京".into()),
            country_name: Some("中華人民共和国".into()),
        }
    }

    fn resolved(records: Vec<EnrichedRecord>) -> Resolved {
        Resolved {
            records,
            category_available: true,
            office_available: true,
            country_available: true,
            labels_available: true,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_helpers() {
        assert_eq!(parse_year("2023000000"), Some(2023));
        assert_eq!(parse_year("20"), None);
        assert_eq!(parse_year("abcd00"), None);

        assert_eq!(split_category("01_輸出"), ("01", Some("輸出")));
        assert_eq!(split_category("01_輸出_金額"), ("01", Some("輸出_金額")));
        assert_eq!(split_category("計"), ("計", None));

        assert_eq!(month_digits("1月"), Some("1"));
        assert_eq!(month_digits("M12x3"), Some("12"));
        assert_eq!(month_digits("計"), None);

        assert_eq!(parse_value(Some("12345")), Some(12345.0));
        assert_eq!(parse_value(Some(" 1234 ")), Some(1234.0));
        assert_eq!(parse_value(Some("1,234")), None);
        assert_eq!(parse_value(Some("-")), None);
        assert_eq!(parse_value(Some("***")), None);
        assert_eq!(parse_value(None), None);
    }

    #[test]
    fn test_export_row() {
        let shaped = shape(&resolved(vec![enriched(Some("01_輸出"), "12345")])).unwrap();
        assert_eq!(shaped.len(), 1);

        let row = &shaped.records[0];
        assert_eq!(row.year, Some(2023));
        assert_eq!(row.month.as_deref(), Some("01"));
        assert_eq!(row.year_month, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(row.category.as_deref(), Some("輸出"));
        assert_eq!(row.value, Some(12345.0));
        assert_eq!(row.country_name.as_deref(), Some("中華人民共和国"));
        assert_eq!(shaped.columns, OutputColumn::ALL.to_vec());
    }

    #[test]
    fn test_filtering() {
        let shaped = shape(&resolved(vec![
            enriched(Some("01_輸出"), "1"),
            enriched(Some("合計_金額"), "2"),
            enriched(Some("単位2"), "3"),
            enriched(Some("13_輸出"), "4"),
            enriched(Some("計"), "5"),
            enriched(None, "6"),
            enriched(Some("  "), "7"),
            enriched(Some("12_輸入"), "-"),
        ]))
        .unwrap();

        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped.records[0].value, Some(1.0));
        assert_eq!(shaped.records[1].month.as_deref(), Some("12"));
        assert_eq!(shaped.records[1].category.as_deref(), Some("輸入"));
        assert_eq!(shaped.records[1].value, None);
    }

    #[test]
    fn test_month_keeps_raw_token() {
        let shaped = shape(&resolved(vec![
            enriched(Some("1月_金額"), "10"),
            enriched(Some("12月_数量1"), "20"),
        ]))
        .unwrap();

        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped.records[0].month.as_deref(), Some("1月"));
        assert_eq!(shaped.records[0].category.as_deref(), Some("金額"));
        assert_eq!(shaped.records[0].year_month, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(shaped.records[1].month.as_deref(), Some("12月"));
        assert_eq!(shaped.records[1].year_month, NaiveDate::from_ymd_opt(2023, 12, 1));

        let table = shaped.to_table();
        assert_eq!(table.rows[0][3], Cell::Text("1月".into()));
    }

    #[test]
    fn test_rows_without_year_dropped() {
        let mut record = enriched(Some("01_輸出"), "1");
        record.record.period_code = Some("x".into());
        let shaped = shape(&resolved(vec![record, enriched(Some("02_輸出"), "2")])).unwrap();
        assert_eq!(shaped.len(), 1);
    }

    #[test]
    fn test_without_category_table() {
        let mut input = resolved(vec![enriched(None, "1"), enriched(Some("合計_金額"), "2")]);
        input.category_available = false;

        let shaped = shape(&input).unwrap();
        assert_eq!(shaped.len(), 2);
        assert!(!shaped.columns.contains(&OutputColumn::Month));
        assert!(!shaped.columns.contains(&OutputColumn::YearMonth));
        assert!(!shaped.columns.contains(&OutputColumn::Category));
        assert!(shaped.columns.contains(&OutputColumn::Year));
        assert_eq!(shaped.records[0].month, None);
    }

    #[test]
    fn test_absent_sources_omit_columns() {
        let mut input = resolved(vec![enriched(Some("01_輸出"), "1")]);
        input.labels_available = false;
        input.office_available = false;
        input.records[0].record.unit = None;

        let table = shape(&input).unwrap().to_table();
        assert!(table.column_index(columns::LABEL).is_none());
        assert!(table.column_index(columns::OFFICE_NAME).is_none());
        assert!(table.column_index(columns::UNIT).is_none());
        assert_eq!(table.column_index(columns::OFFICE_CODE), Some(7));
    }

    #[test]
    fn test_missing_period_code() {
        let mut record = enriched(Some("01_輸出"), "1");
        record.record.period_code = None;
        assert!(matches!(
            shape(&resolved(vec![record])),
            Err(ShapeError::MissingPeriodCode)
        ));
    }

    #[test]
    fn test_shaping_is_idempotent() {
        let input = resolved(vec![
            enriched(Some("01_輸出"), "1"),
            enriched(Some("合計_金額"), "2"),
            enriched(Some("11_輸入"), "3"),
            enriched(Some("99_輸出"), "4"),
        ]);
        let first = shape(&input).unwrap();

        // Rebuild enriched records from the shaped output.
        let rebuilt = first
            .records
            .iter()
            .map(|s| {
                let mut record = enriched(None, &s.value.map(|v| v.to_string()).unwrap_or_default());
                record.category_name = Some(match &s.category {
                    Some(c) => format!("{}_{}", s.month.as_deref().unwrap_or_default(), c),
                    None => s.month.clone().unwrap_or_default(),
                });
                record
            })
            .collect();
        let second = shape(&resolved(rebuilt)).unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second, first);
    }

    #[test]
    fn test_to_table() {
        let table = shape(&resolved(vec![enriched(Some("01_輸出"), "12345")]))
            .unwrap()
            .to_table();

        assert_eq!(table.columns[0], "HSコード");
        assert_eq!(table.columns.len(), 12);
        let row = &table.rows[0];
        assert_eq!(row[2], Cell::Int(2023));
        assert_eq!(row[4].render(), "2023-01-01");
        assert_eq!(row[10].render(), "12345");
    }
}
