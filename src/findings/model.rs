//! Finding value objects shared by analyzers, the duplication indexer and
//! the report merger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Issue category reported for a [`Finding`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Security,
    Performance,
    Complexity,
    Maintainability,
    BestPractices,
    CodeDuplication,
    Testing,
    Documentation,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Security,
        Category::Performance,
        Category::Complexity,
        Category::Maintainability,
        Category::BestPractices,
        Category::CodeDuplication,
        Category::Testing,
        Category::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::Complexity => "complexity",
            Category::Maintainability => "maintainability",
            Category::BestPractices => "best_practices",
            Category::CodeDuplication => "code_duplication",
            Category::Testing => "testing",
            Category::Documentation => "documentation",
        }
    }

    /// Lenient parse used for analyzer and inference output.
    ///
    /// Unknown names map to `BestPractices`.
    pub fn parse_lenient(name: &str) -> Self {
        let normalized = name.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "security" | "security_issues" | "vulnerability" => Category::Security,
            "performance" => Category::Performance,
            "complexity" => Category::Complexity,
            "maintainability" | "style" | "code_style" => Category::Maintainability,
            "best_practices" | "best_practice" | "pattern" => Category::BestPractices,
            "code_duplication" | "duplication" | "duplicate" => Category::CodeDuplication,
            "testing" | "testing_gaps" | "tests" => Category::Testing,
            "documentation" | "docs" => Category::Documentation,
            _ => Category::BestPractices,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordinal severity, `Info` lowest and `Critical` highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Info,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Lenient parse. Linter-style levels (`error`, `warning`) are mapped onto
    /// the ordinal scale; anything unknown is `Info`.
    pub fn parse_lenient(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "critical" | "blocker" => Severity::Critical,
            "high" | "error" | "major" => Severity::High,
            "medium" | "warning" | "moderate" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single reported quality issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: Category,
    pub severity: Severity,
    /// 1-based line number in the owning file
    pub line: usize,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub file_path: String,
    /// Set when the finding came from a chunked sub-analysis
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<usize>,
}

impl Finding {
    pub fn new(
        category: Category,
        severity: Severity,
        line: usize,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            line,
            title: title.into(),
            description: description.into(),
            remediation: None,
            snippet: None,
            file_path: String::new(),
            chunk_id: None,
        }
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn in_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = file_path.into();
        self
    }

    /// Identity used when collapsing duplicate findings.
    pub fn dedup_key(&self) -> (usize, Category, String) {
        (self.line, self.category, self.title.clone())
    }
}

/// Named numeric metrics, kept ordered so reports serialize deterministically.
pub type Metrics = BTreeMap<String, f64>;

/// Structured result of one analyzer call (whole file or one chunk).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub findings: Vec<Finding>,
    pub metrics: Metrics,
    pub summary: String,
    pub recommendations: Vec<String>,
}

impl AnalysisOutcome {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty() && self.metrics.is_empty() && self.recommendations.is_empty()
    }
}
