//! Metadata resolution: classification tables and item labels.
//!
//! ```text
//! retained envelope ──► CLASS_OBJ cat02 ──► category LookupTable ─┐
//!                   ├─► CLASS_OBJ cat03 ──► office LookupTable   ─┤ left joins
//!                   └─► CLASS_OBJ area  ──► country LookupTable  ─┤ (row count
//! uploaded file ──────────────────────────► HS code labels       ─┘  preserved)
//! ```
//!
//! A missing table is never fatal: its enrichment columns stay empty.

use std::collections::HashMap;

use crate::error::MergeError;
use crate::estat::envelope::{ClassObj, StatsEnvelope};
use crate::models::{
    columns, Cell, CodeList, EnrichedRecord, FlatRecord, LookupEntry, LookupTable, Stage, Table,
    Warning,
};

/// Classification id of the category (month x flow x measure) table.
pub const CATEGORY_CLASS_ID: &str = "cat02";

/// Classification id of the customs office table.
pub const OFFICE_CLASS_ID: &str = "cat03";

/// Classification id of the country table.
pub const COUNTRY_CLASS_ID: &str = "area";

/// The three classification tables.
#[derive(Debug, Clone, Default)]
pub struct Lookups {
    pub category: LookupTable,
    pub office: LookupTable,
    pub country: LookupTable,
}

impl Lookups {
    /// Build the tables from the retained envelope, recording a warning for
    /// every table that is missing or does not decode.
    pub fn from_envelope(envelope: Option<&StatsEnvelope>, warnings: &mut Vec<Warning>) -> Self {
        let Some(envelope) = envelope else {
            warnings.push(Warning::stage(
                Stage::Merge,
                "No successful response to read metadata from; continuing without metadata",
            ));
            return Self::default();
        };

        if envelope.class_inf().is_none() {
            warnings.push(Warning::stage(
                Stage::Merge,
                "No CLASS_INF metadata in the response; continuing without metadata",
            ));
            return Self::default();
        }

        let mut table = |id: &str, build: fn(&ClassObj) -> LookupTable| match envelope.class_object(id) {
            Ok(obj) => build(&obj),
            Err(e) => {
                warnings.push(Warning::stage(Stage::Merge, e.to_string()));
                LookupTable::unavailable()
            }
        };

        Self {
            category: table(CATEGORY_CLASS_ID, category_table),
            office: table(OFFICE_CLASS_ID, name_table),
            country: table(COUNTRY_CLASS_ID, country_table),
        }
    }
}

fn category_table(obj: &ClassObj) -> LookupTable {
    LookupTable::from_entries(obj.entries().iter().map(|e| {
        (
            e.code.clone(),
            LookupEntry { name: e.name.clone(), parent_code: e.parent_code.clone() },
        )
    }))
}

fn name_table(obj: &ClassObj) -> LookupTable {
    LookupTable::from_entries(
        obj.entries()
            .iter()
            .map(|e| (e.code.clone(), LookupEntry { name: e.name.clone(), parent_code: None })),
    )
}

fn country_table(obj: &ClassObj) -> LookupTable {
    LookupTable::from_entries(obj.entries().iter().map(|e| {
        (
            e.code.clone(),
            LookupEntry {
                name: e.name.as_deref().and_then(strip_code_prefix),
                parent_code: None,
            },
        )
    }))
}

/// `"105_中華人民共和国"` -> `"中華人民共和国"`. Names without `_` yield nothing.
pub fn strip_code_prefix(name: &str) -> Option<String> {
    name.split_once('_')
        .map(|(_, rest)| rest.to_string())
        .filter(|rest| !rest.is_empty())
}

/// Records after the joins, plus what the shaper needs to know about them.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub records: Vec<EnrichedRecord>,
    /// Category table existed (rows may still be unmatched).
    pub category_available: bool,
    pub office_available: bool,
    pub country_available: bool,
    /// The input file had a label column.
    pub labels_available: bool,
    pub warnings: Vec<Warning>,
}

impl Resolved {
    /// Pre-merge records, used when the merge itself failed.
    pub fn unmerged(records: Vec<FlatRecord>) -> Self {
        Self {
            records: records.into_iter().map(EnrichedRecord::from).collect(),
            ..Self::default()
        }
    }

    /// Render without reshaping: raw codes plus whatever enrichment exists.
    pub fn to_table(&self) -> Table {
        let mut headers = vec![
            columns::HS_CODE,
            columns::CATEGORY_CODE,
            columns::OFFICE_CODE,
            columns::COUNTRY_CODE,
            columns::PERIOD_CODE,
            columns::VALUE,
            columns::UNIT,
        ];
        if self.category_available {
            headers.extend([columns::CATEGORY_NAME, columns::CATEGORY_PARENT]);
        }
        if self.office_available {
            headers.push(columns::OFFICE_NAME);
        }
        if self.country_available {
            headers.push(columns::COUNTRY_NAME);
        }
        if self.labels_available {
            headers.push(columns::LABEL);
        }

        let mut table = Table::new(headers);
        for r in &self.records {
            let flat = &r.record;
            let mut row = vec![
                Cell::text(flat.hs_code.as_deref()),
                Cell::text(flat.category_code.as_deref()),
                Cell::text(flat.office_code.as_deref()),
                Cell::text(flat.country_code.as_deref()),
                Cell::text(flat.period_code.as_deref()),
                Cell::text(flat.value.as_deref()),
                Cell::text(flat.unit.as_deref()),
            ];
            if self.category_available {
                row.push(Cell::text(r.category_name.as_deref()));
                row.push(Cell::text(r.category_parent.as_deref()));
            }
            if self.office_available {
                row.push(Cell::text(r.office_name.as_deref()));
            }
            if self.country_available {
                row.push(Cell::text(r.country_name.as_deref()));
            }
            if self.labels_available {
                row.push(Cell::text(r.label.as_deref()));
            }
            table.push_row(row);
        }
        table
    }
}

/// Joins lookups and labels onto flat records.
#[derive(Debug)]
pub struct Resolver<'a> {
    lookups: Lookups,
    labels: HashMap<&'a str, &'a str>,
    warnings: Vec<Warning>,
}

impl<'a> Resolver<'a> {
    /// Prepare the joins. Fails when the code list carries no labels.
    pub fn new(retained: Option<&StatsEnvelope>, codes: &'a CodeList) -> Result<Self, MergeError> {
        if !codes.has_labels() {
            return Err(MergeError::MissingLabelColumn);
        }

        let mut warnings = Vec::new();
        let lookups = Lookups::from_envelope(retained, &mut warnings);

        Ok(Self { lookups, labels: codes.label_index(), warnings })
    }

    pub fn lookups(&self) -> &Lookups {
        &self.lookups
    }

    /// Left-join every record. Never drops or duplicates a row.
    pub fn join(self, records: Vec<FlatRecord>) -> Resolved {
        let Self { lookups, labels, warnings } = self;

        let records = records
            .into_iter()
            .map(|record| {
                let category = record
                    .category_code
                    .as_deref()
                    .and_then(|c| lookups.category.get(c));
                let label = record
                    .hs_code
                    .as_deref()
                    .map(str::trim)
                    .and_then(|c| labels.get(c))
                    .map(|l| l.to_string());

                EnrichedRecord {
                    label,
                    category_name: category.and_then(|e| e.name.clone()),
                    category_parent: category.and_then(|e| e.parent_code.clone()),
                    office_name: lookups.office.name_of(record.office_code.as_deref()),
                    country_name: lookups.country.name_of(record.country_code.as_deref()),
                    record,
                }
            })
            .collect();

        Resolved {
            records,
            category_available: lookups.category.is_available(),
            office_available: lookups.office.is_available(),
            country_available: lookups.country.is_available(),
            labels_available: true,
            warnings,
        }
    }
}
