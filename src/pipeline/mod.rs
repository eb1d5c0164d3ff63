//! The two steps of a run.
//!
//! 1. `IngestionPipeline::run()`: incremental fetch into the local mirror
//! 2. `RuleProcessor::run()`: rule evaluation and actions over unprocessed messages

pub mod ingest;
pub mod processor;

pub use ingest::{FetchReport, IngestionPipeline};
pub use processor::{ProcessingStats, RuleProcessor};
