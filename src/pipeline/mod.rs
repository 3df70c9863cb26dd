//! Pipeline orchestration: read, chunk, analyze, fingerprint, merge, ingest.

pub mod errors;
pub mod orchestrator;

pub use errors::{DiagnosticCollector, DiagnosticSummary, PipelineError};
pub use orchestrator::Pipeline;
