//! Batch index builds and report/export drivers for keydex.
//!
//! This crate provides:
//! - The batch sort-index builder (collect, sort once, write one pass)
//! - Selection between incremental and batch builds
//! - Drivers that build, list, export and consolidate record stores

mod driver;
mod sort;
mod strategy;

pub use driver::{
    BuildSummary, ConsolidateSummary, ListingSummary, Source, build_index, consolidate,
    export_lines, list_index,
};
pub use sort::{CollectSummary, PushOutcome, SortIndexBuilder, SortedRun};
pub use strategy::{BuildStrategy, IncrementalBuild, OrderedBuild};
