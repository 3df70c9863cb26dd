//! Chunk-to-file merging.

use std::collections::{BTreeMap, HashSet};

use crate::config::ScoringConfig;

use super::model::{AnalysisOutcome, Finding, Metrics};
use super::recommendations::union_into;
use super::report::{Diagnostic, FileReport};
use super::scoring::{has_external_scores, issue_based_scores};

/// Lines of context shown around a finding that came without an excerpt.
const SNIPPET_RADIUS: usize = 4;

/// Analyzer output for one chunk, with the offset needed to re-map lines.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub chunk_id: usize,
    /// 1-based first line of the chunk in the file
    pub start_line: usize,
    pub outcome: AnalysisOutcome,
}

/// Per-key running mean over the sources that reported the key.
#[derive(Debug, Default)]
pub struct MetricAverager {
    sums: BTreeMap<String, (f64, usize)>,
}

impl MetricAverager {
    pub fn add(&mut self, metrics: &Metrics) {
        for (key, value) in metrics {
            if !value.is_finite() {
                continue;
            }
            let entry = self.sums.entry(key.clone()).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }

    pub fn finish(self) -> Metrics {
        self.sums
            .into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect()
    }
}

/// Fold per-chunk outcomes into one file-level outcome.
///
/// Lines are shifted into file coordinates and tagged with their chunk id.
/// Results are ordered by chunk id first so completion order never matters;
/// duplicate (line, category, title) triples from overlapping windows keep
/// their first occurrence.
pub fn merge_chunk_outcomes(mut results: Vec<ChunkResult>) -> AnalysisOutcome {
    results.sort_by_key(|result| result.chunk_id);

    let mut seen = HashSet::new();
    let mut findings = Vec::new();
    let mut metrics = MetricAverager::default();
    let mut recommendations = Vec::new();
    let chunk_count = results.len();

    for result in results {
        let offset = result.start_line.saturating_sub(1);
        for mut finding in result.outcome.findings {
            finding.line += offset;
            finding.chunk_id = Some(result.chunk_id);
            if seen.insert(finding.dedup_key()) {
                findings.push(finding);
            }
        }
        metrics.add(&result.outcome.metrics);
        union_into(&mut recommendations, &result.outcome.recommendations);
    }

    let summary = format!(
        "Large file analysis completed. Found {} issues across {} code chunks.",
        findings.len(),
        chunk_count
    );

    AnalysisOutcome {
        findings,
        metrics: metrics.finish(),
        summary,
        recommendations,
    }
}

/// Everything needed to assemble one [`FileReport`].
pub struct FileMergeInput<'a> {
    pub file_path: &'a str,
    pub language: &'a str,
    pub content: &'a str,
    /// One outcome per successful analyzer, in analyzer order
    pub outcomes: Vec<AnalysisOutcome>,
    pub chunks_analyzed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Combine analyzer outcomes for one file into its report.
///
/// Findings are deduplicated across analyzers, stamped with the file path,
/// given an excerpt when missing and ordered by line. Issue-based scores are
/// filled in unless an analyzer reported its own.
pub fn merge_file(input: FileMergeInput<'_>, scoring: &ScoringConfig) -> FileReport {
    let lines: Vec<&str> = input.content.lines().collect();
    let mut seen = HashSet::new();
    let mut findings: Vec<Finding> = Vec::new();
    let mut metrics = MetricAverager::default();
    let mut recommendations = Vec::new();
    let mut summaries = Vec::new();

    for outcome in input.outcomes {
        for mut finding in outcome.findings {
            finding.file_path = input.file_path.to_string();
            if finding.snippet.is_none() {
                finding.snippet = snippet_around(&lines, finding.line);
            }
            if seen.insert(finding.dedup_key()) {
                findings.push(finding);
            }
        }
        metrics.add(&outcome.metrics);
        union_into(&mut recommendations, &outcome.recommendations);
        if !outcome.summary.trim().is_empty() {
            summaries.push(outcome.summary.trim().to_string());
        }
    }

    findings.sort_by_key(|finding| finding.line);

    let mut metrics = metrics.finish();
    if !has_external_scores(&metrics) {
        metrics.extend(issue_based_scores(&findings, scoring));
    }

    let summary = if summaries.is_empty() {
        format!("Found {} issues.", findings.len())
    } else {
        summaries.join(" ")
    };

    FileReport {
        file_path: input.file_path.to_string(),
        language: input.language.to_string(),
        lines: lines.len(),
        findings,
        metrics,
        summary,
        recommendations,
        chunks_analyzed: input.chunks_analyzed,
        diagnostics: input.diagnostics,
        error: None,
    }
}

/// Lines `line - radius ..= line + radius` of the file, or `None` when the
/// line is outside the file.
fn snippet_around(lines: &[&str], line: usize) -> Option<String> {
    if line == 0 || line > lines.len() {
        return None;
    }
    let start = line.saturating_sub(SNIPPET_RADIUS + 1);
    let end = (line + SNIPPET_RADIUS).min(lines.len());
    Some(lines[start..end].join("\n"))
}
