pub mod analysis;
pub mod cli;
pub mod commands;
pub mod config;
pub mod duplication;
pub mod embeddings;
pub mod findings;
pub mod indexer;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retrieval;

pub use config::Config;
pub use findings::{CodebaseReport, FileReport, Finding};
pub use pipeline::{Pipeline, PipelineError};
pub use retrieval::RetrievalIndex;
