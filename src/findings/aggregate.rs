//! File-to-codebase aggregation.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::warn;

use super::merge::MetricAverager;
use super::model::{Category, Finding, Severity};
use super::recommendations::{heuristic_recommendations, union_into};
use super::report::{CodebaseReport, CodebaseSummary, Diagnostic, FileReport};

/// Fold file reports and duplication findings into the codebase report.
///
/// Error-marked files stay in the per-file map but contribute neither
/// findings nor metrics. The issue list is stable-sorted by descending
/// severity, so files (in path order) and then duplication findings keep
/// their relative order within a severity.
pub fn aggregate(
    files: Vec<FileReport>,
    duplication: Vec<Finding>,
    skipped: Vec<Diagnostic>,
) -> CodebaseReport {
    let mut by_path: BTreeMap<String, FileReport> = BTreeMap::new();
    for report in files {
        if let Some(earlier) = by_path.insert(report.file_path.clone(), report) {
            warn!(file = %earlier.file_path, "Two reports share a path; keeping the later one");
        }
    }

    let mut issues: Vec<Finding> = Vec::new();
    let mut metrics = MetricAverager::default();
    let mut recommendations = Vec::new();
    let mut failed_files = 0;

    for report in by_path.values() {
        if report.is_error() {
            failed_files += 1;
            continue;
        }
        issues.extend(report.findings.iter().cloned());
        metrics.add(&report.metrics);
        union_into(&mut recommendations, &report.recommendations);
    }
    issues.extend(duplication);
    issues.sort_by(|a, b| b.severity.cmp(&a.severity));

    if recommendations.is_empty() {
        recommendations = heuristic_recommendations(&issues);
    }

    let summary = CodebaseSummary {
        total_files: by_path.len(),
        failed_files,
        skipped_files: skipped.len(),
        total_issues: issues.len(),
        metrics: metrics.finish(),
        severity_counts: count_by(&issues, |f| f.severity.as_str(), &Severity::ALL.map(|s| s.as_str())),
        category_counts: count_by(&issues, |f| f.category.as_str(), &Category::ALL.map(|c| c.as_str())),
    };

    CodebaseReport {
        summary,
        issues,
        files: by_path,
        recommendations,
        diagnostics: skipped,
        generated_at: Utc::now(),
    }
}

fn count_by(
    issues: &[Finding],
    key: impl Fn(&Finding) -> &'static str,
    all_keys: &[&'static str],
) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> =
        all_keys.iter().map(|k| (k.to_string(), 0)).collect();
    for issue in issues {
        *counts.entry(key(issue).to_string()).or_default() += 1;
    }
    counts
}
