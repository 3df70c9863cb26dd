//! Findings, per-file and per-codebase reports, and the merge steps between them.

pub mod aggregate;
pub mod merge;
pub mod model;
pub mod recommendations;
pub mod report;
pub mod scoring;

pub use aggregate::aggregate;
pub use merge::{merge_chunk_outcomes, merge_file, ChunkResult, FileMergeInput};
pub use model::{AnalysisOutcome, Category, Finding, Metrics, Severity};
pub use recommendations::heuristic_recommendations;
pub use report::{CodebaseReport, CodebaseSummary, Diagnostic, FileReport, Stage};
pub use scoring::issue_based_scores;
