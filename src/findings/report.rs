use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::model::{Finding, Metrics};

/// Pipeline stage a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Read,
    Chunking,
    Analysis,
    Fingerprinting,
    Retrieval,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Read => write!(f, "File Read"),
            Stage::Chunking => write!(f, "Chunking"),
            Stage::Analysis => write!(f, "Analysis"),
            Stage::Fingerprinting => write!(f, "Fingerprinting"),
            Stage::Retrieval => write!(f, "Retrieval"),
        }
    }
}

/// A non-fatal problem attached to a file or to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub path: String,
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: impl Into<String>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            stage,
            message: message.into(),
        }
    }
}

/// Merged analysis result for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file_path: String,
    pub language: String,
    pub lines: usize,
    pub findings: Vec<Finding>,
    pub metrics: Metrics,
    pub summary: String,
    pub recommendations: Vec<String>,
    /// Number of chunks the file was split into (0 when analyzed whole)
    pub chunks_analyzed: usize,
    /// Analyzer calls that failed without failing the file
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the file's analysis as a whole failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    /// Report for a file whose analysis could not complete.
    pub fn failed(
        file_path: impl Into<String>,
        language: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            language: language.into(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseSummary {
    pub total_files: usize,
    pub failed_files: usize,
    pub skipped_files: usize,
    pub total_issues: usize,
    pub metrics: Metrics,
    pub severity_counts: BTreeMap<String, usize>,
    pub category_counts: BTreeMap<String, usize>,
}

/// Corpus-level result consumed by the CLI and the retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodebaseReport {
    pub summary: CodebaseSummary,
    /// All findings, most severe first
    pub issues: Vec<Finding>,
    pub files: BTreeMap<String, FileReport>,
    pub recommendations: Vec<String>,
    /// Files that never reached analysis, plus run-level problems
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    pub generated_at: DateTime<Utc>,
}

impl CodebaseReport {
    /// Number of findings (including duplication findings) located in `path`.
    pub fn issue_count_for(&self, path: &str) -> usize {
        self.issues.iter().filter(|issue| issue.file_path == path).count()
    }
}
