//! Fatal pipeline errors and collection of non-fatal diagnostics

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::findings::{Diagnostic, Stage};

/// Conditions that stop a run before any report is produced
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no analyzable files found under {}", root.display())]
    NoFiles { root: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Collects diagnostics from concurrently running tasks
#[derive(Clone, Default)]
pub struct DiagnosticCollector {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, path: impl Into<String>, stage: Stage, message: impl Into<String>) {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Diagnostic::new(path, stage, message));
    }

    pub fn count(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Everything recorded so far, sorted by (path, stage)
    pub fn take(&self) -> Vec<Diagnostic> {
        let mut diagnostics = std::mem::take(
            &mut *self
                .diagnostics
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        diagnostics.sort_by(|a, b| (&a.path, a.stage).cmp(&(&b.path, b.stage)));
        diagnostics
    }
}

/// Per-stage digest of diagnostics for terminal output
pub struct DiagnosticSummary {
    pub total: usize,
    pub by_stage: BTreeMap<Stage, Vec<Diagnostic>>,
}

impl DiagnosticSummary {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Self {
        let mut by_stage: BTreeMap<Stage, Vec<Diagnostic>> = BTreeMap::new();
        for diagnostic in diagnostics {
            by_stage
                .entry(diagnostic.stage)
                .or_default()
                .push(diagnostic.clone());
        }
        Self {
            total: diagnostics.len(),
            by_stage,
        }
    }

    /// Print up to five examples per stage to stderr
    pub fn print(&self) {
        if self.total == 0 {
            return;
        }

        eprintln!("⚠️  {} problems during analysis", self.total);
        for (stage, diagnostics) in &self.by_stage {
            eprintln!("  {}: {}", stage, diagnostics.len());
            for diagnostic in diagnostics.iter().take(5) {
                eprintln!("    - {}: {}", diagnostic.path, diagnostic.message);
            }
            if diagnostics.len() > 5 {
                eprintln!("    ... and {} more", diagnostics.len() - 5);
            }
        }
    }
}
