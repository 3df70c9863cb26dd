//! Adapters to the external analyzers and the inference service.

pub mod command;
pub mod inference;
pub mod outcome;
pub mod patterns;
pub mod service;

pub use command::CommandAnalyzer;
pub use inference::{InferenceAnalyzer, InferenceService, OpenAiInference};
pub use outcome::parse_outcome;
pub use patterns::PatternAnalyzer;
pub use service::{call_with_timeout, Analyzer, AnalyzerScope, ServiceError};

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;

/// Analyzers enabled by the configuration, in the order they run.
pub fn analyzers_from_config(config: &Config) -> Result<Vec<Arc<dyn Analyzer>>> {
    let mut analyzers: Vec<Arc<dyn Analyzer>> = Vec::new();

    if config.analysis.builtin_patterns {
        analyzers.push(Arc::new(PatternAnalyzer::new()));
    }
    if let Some(command) = config
        .analysis
        .external_command
        .as_deref()
        .and_then(CommandAnalyzer::from_command_line)
    {
        analyzers.push(Arc::new(command));
    }
    if config.inference.enabled {
        let service = OpenAiInference::from_config(&config.inference)?;
        analyzers.push(Arc::new(InferenceAnalyzer::new(Arc::new(service))));
    }

    Ok(analyzers)
}
