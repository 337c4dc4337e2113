//! Transformation module.
//!
//! This module turns fetch outcomes into the final table:
//! - Aggregator: outcomes to flat records and counters
//! - Resolver: metadata and label joins
//! - Shaper: derived date fields, filtering, final column schema
//! - Pipeline: the whole run, from CSV bytes to export

pub mod aggregator;
pub mod pipeline;
pub mod resolver;
pub mod shaper;

pub use aggregator::{Aggregate, Aggregator, Bucket};
pub use pipeline::*;
pub use resolver::{Lookups, Resolved, Resolver};
pub use shaper::{shape, OutputColumn, ShapedTable};
