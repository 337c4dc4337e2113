//! Accumulate fetch outcomes into one flat record list.
//!
//! The aggregator owns the only state shared across identifiers: the
//! record sequence, the retained envelope (last success wins, never merged)
//! and the counters.

use crate::error::NoDataError;
use crate::estat::envelope::StatsEnvelope;
use crate::estat::Outcome;
use crate::models::{FlatRecord, RunSummary, Warning};

/// Counter an outcome lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Processed,
    Skipped,
    Errored,
}

impl Bucket {
    pub fn of(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { .. } => Bucket::Processed,
            Outcome::EmptyResult { .. } | Outcome::MalformedResponse { .. } => Bucket::Skipped,
            Outcome::TransportError { .. } | Outcome::ParseError { .. } | Outcome::ApiError { .. } => {
                Bucket::Errored
            }
        }
    }
}

/// Everything the later stages need once the loop is over.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub records: Vec<FlatRecord>,
    /// Envelope of the last successful call, for metadata.
    pub retained: Option<StatsEnvelope>,
    pub summary: RunSummary,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Default)]
pub struct Aggregator {
    records: Vec<FlatRecord>,
    retained: Option<StatsEnvelope>,
    summary: RunSummary,
    warnings: Vec<Warning>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one outcome. Exactly one counter is incremented.
    pub fn record(&mut self, outcome: Outcome) -> Bucket {
        let bucket = Bucket::of(&outcome);
        match bucket {
            Bucket::Processed => self.summary.processed += 1,
            Bucket::Skipped => self.summary.skipped += 1,
            Bucket::Errored => self.summary.errored += 1,
        }

        match outcome {
            Outcome::Success { rows, envelope, .. } => {
                self.records.extend(rows.into_iter().map(FlatRecord::from));
                self.retained = Some(*envelope);
            }
            other => {
                match &other {
                    Outcome::EmptyResult { .. } => self.summary.empty += 1,
                    Outcome::MalformedResponse { .. } => self.summary.malformed += 1,
                    _ => {}
                }
                self.warnings.push(Warning::identifier(other.code(), other.describe()));
            }
        }

        bucket
    }

    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Finish the loop. Fails when not a single row was accumulated.
    pub fn finish(self) -> Result<Aggregate, NoDataError> {
        if self.records.is_empty() {
            return Err(NoDataError { identifiers: self.summary.total() });
        }
        Ok(Aggregate {
            records: self.records,
            retained: self.retained,
            summary: self.summary,
            warnings: self.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estat::classify;
    use crate::estat::testing::{error_body, no_metadata_body, success_body, EXPORT_CATEGORY};

    fn success(code: &str, rows: &[(&str, &str)]) -> Outcome {
        classify(code, &success_body(code, rows).to_string())
    }

    fn mixed_outcomes() -> Vec<Outcome> {
        vec![
            success("0101", &[(EXPORT_CATEGORY, "1"), ("150", "2")]),
            Outcome::EmptyResult { code: "0102".into(), message: None },
            Outcome::MalformedResponse { code: "0103".into(), reason: "missing".into() },
            Outcome::ApiError { code: "0104".into(), status: 1, message: "該当データなし".into() },
            Outcome::TransportError { code: "0105".into(), detail: "timeout".into() },
            Outcome::ParseError { code: "0106".into(), detail: "eof".into() },
            success("0107", &[(EXPORT_CATEGORY, "3")]),
        ]
    }

    #[test]
    fn test_counters_cover_every_identifier() {
        let outcomes = mixed_outcomes();
        let total = outcomes.len();

        let mut aggregator = Aggregator::new();
        for outcome in outcomes {
            aggregator.record(outcome);
        }
        let summary = aggregator.summary();

        assert_eq!(summary.processed + summary.skipped + summary.errored, total);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.errored, 3);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.malformed, 1);
    }

    #[test]
    fn test_rows_appended_in_order_with_warnings() {
        let mut aggregator = Aggregator::new();
        for outcome in mixed_outcomes() {
            aggregator.record(outcome);
        }
        let aggregate = aggregator.finish().unwrap();

        let codes: Vec<_> = aggregate
            .records
            .iter()
            .map(|r| r.hs_code.as_deref().unwrap())
            .collect();
        assert_eq!(codes, vec!["0101", "0101", "0107"]);
        assert_eq!(aggregate.records[1].category_code.as_deref(), Some("150"));
        assert_eq!(aggregate.records[0].value.as_deref(), Some("1"));
        assert_eq!(aggregate.warnings.len(), 5);
    }

    #[test]
    fn test_last_success_wins() {
        let mut aggregator = Aggregator::new();
        aggregator.record(success("0101", &[(EXPORT_CATEGORY, "1")]));
        aggregator.record(classify("0102", &no_metadata_body("0102", &[(EXPORT_CATEGORY, "2")]).to_string()));
        aggregator.record(Outcome::TransportError { code: "0103".into(), detail: "x".into() });

        let aggregate = aggregator.finish().unwrap();
        // The second (metadata-less) envelope replaced the first.
        let retained = aggregate.retained.unwrap();
        assert!(retained.class_inf().is_none());
        assert_eq!(aggregate.records.len(), 2);
    }

    #[test]
    fn test_no_data_error() {
        let mut aggregator = Aggregator::new();
        assert_eq!(
            aggregator.record(classify("resume", &error_body(1, Some("該当データなし")).to_string())),
            Bucket::Errored
        );
        assert_eq!(
            aggregator.record(Outcome::EmptyResult { code: "x".into(), message: None }),
            Bucket::Skipped
        );

        let err = aggregator.finish().unwrap_err();
        assert_eq!(err.identifiers, 2);
    }

    #[test]
    fn test_no_identifiers_is_no_data() {
        assert!(Aggregator::new().finish().is_err());
    }
}
