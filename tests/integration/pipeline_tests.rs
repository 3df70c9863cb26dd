use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use codequal::analysis::{Analyzer, PatternAnalyzer};
use codequal::findings::{Category, Severity, Stage};
use codequal::PipelineError;

use crate::helpers::analyzers::{RecordingAnalyzer, SlowAnalyzer};
use crate::helpers::test_harness::TestHarness;

const RISKY: &str = r#"import json


def handle(payload):
    data = json.loads(payload)
    return eval(data["expression"])
"#;

const CLEAN: &str = r#"def add(a, b):
    return a + b
"#;

#[tokio::test]
async fn test_eval_file_yields_single_security_issue() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("app/handler.py", RISKY)?;
    harness.create_test_file("app/math_utils.py", CLEAN)?;

    let pipeline = harness.pipeline(vec![Arc::new(PatternAnalyzer::new())]);
    let report = pipeline.run(harness.path()).await?;

    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.summary.total_issues, 1);

    let issue = &report.issues[0];
    assert_eq!(issue.category, Category::Security);
    assert_eq!(issue.severity, Severity::High);
    assert_eq!(issue.file_path, "app/handler.py");
    assert_eq!(issue.line, 6);
    assert!(issue.snippet.as_deref().unwrap_or_default().contains("eval("));

    assert_eq!(report.summary.severity_counts["high"], 1);
    assert_eq!(report.summary.category_counts["security"], 1);
    assert_eq!(report.summary.category_counts["performance"], 0);
    assert!(report.files["app/math_utils.py"].findings.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_oversized_file_is_analyzed_in_three_chunks() -> Result<()> {
    let mut harness = TestHarness::new()?;
    harness.config.analysis.max_file_size = 1_000_000;
    harness.config.analysis.chunk_budget = 1_000_000;
    harness.config.analysis.chunk_overlap_lines = 100;

    // 25,000 distinct lines of 100 bytes each
    let content: String = (0..25_000)
        .map(|i| format!("{:<99}\n", format!("let value_{i:05} = {i};")))
        .collect();
    assert_eq!(content.len(), 2_500_000);
    harness.create_test_file("big.js", &content)?;

    let recorder = Arc::new(RecordingAnalyzer::default());
    let analyzers: Vec<Arc<dyn Analyzer>> = vec![recorder.clone()];
    let report = harness.pipeline(analyzers).run(harness.path()).await?;

    let file = &report.files["big.js"];
    assert!(!file.is_error());
    assert_eq!(file.lines, 25_000);
    assert_eq!(file.chunks_analyzed, 3);

    let mut seen = recorder.seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].starts_with("let value_00000"));
    Ok(())
}

#[tokio::test]
async fn test_file_timeout_marks_only_that_file() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("slow_module.py", CLEAN)?;
    harness.create_test_file("fast_module.py", CLEAN)?;

    let analyzer = SlowAnalyzer {
        marker: "slow",
        delay: Duration::from_secs(5),
        metrics: [("complexity_score".to_string(), 70.0)].into_iter().collect(),
    };
    let report = harness
        .pipeline(vec![Arc::new(analyzer)])
        .with_timeouts(Duration::from_millis(200), Duration::from_secs(30))
        .run(harness.path())
        .await?;

    let slow = &report.files["slow_module.py"];
    assert!(slow.is_error());
    assert!(slow.error.as_deref().unwrap_or_default().contains("timed out"));
    assert!(!report.files["fast_module.py"].is_error());

    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.summary.failed_files, 1);
    assert_eq!(report.summary.metrics["complexity_score"], 70.0);
    assert_eq!(report.summary.metrics["security_score"], 100.0);
    Ok(())
}

#[tokio::test]
async fn test_service_timeout_is_typed_and_recorded() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("slow_module.py", CLEAN)?;

    let analyzer = SlowAnalyzer {
        marker: "slow",
        delay: Duration::from_secs(5),
        metrics: Default::default(),
    };
    let report = harness
        .pipeline(vec![Arc::new(analyzer)])
        .with_timeouts(Duration::from_secs(30), Duration::from_millis(100))
        .run(harness.path())
        .await?;

    let file = &report.files["slow_module.py"];
    assert!(file.is_error());
    assert_eq!(file.diagnostics.len(), 1);
    assert_eq!(file.diagnostics[0].stage, Stage::Analysis);
    assert!(file.diagnostics[0].message.contains("timed out"));
    Ok(())
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("good.py", CLEAN)?;
    std::fs::write(harness.path().join("latin1.py"), [0x63, 0x61, 0x66, 0xe9, 0x0a])?;

    let report = harness
        .pipeline(vec![Arc::new(PatternAnalyzer::new())])
        .run(harness.path())
        .await?;

    assert_eq!(report.summary.total_files, 1);
    assert_eq!(report.summary.skipped_files, 1);
    assert_eq!(report.diagnostics[0].path, "latin1.py");
    assert_eq!(report.diagnostics[0].stage, Stage::Read);
    Ok(())
}

#[tokio::test]
async fn test_empty_tree_is_fatal() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file("README.md", "# nothing to analyze\n")?;

    let result = harness.pipeline(Vec::new()).run(harness.path()).await;

    assert!(matches!(result, Err(PipelineError::NoFiles { .. })));
    Ok(())
}

#[tokio::test]
async fn test_notebook_code_cells_are_analyzed() -> Result<()> {
    let harness = TestHarness::new()?;
    let notebook = serde_json::json!({
        "cells": [
            {"cell_type": "markdown", "source": ["# Exploration\n"]},
            {"cell_type": "code", "source": ["result = eval(user_input)\n"]}
        ],
        "metadata": {},
        "nbformat": 4,
        "nbformat_minor": 5
    });
    harness.create_test_file("explore.ipynb", &notebook.to_string())?;

    let report = harness
        .pipeline(vec![Arc::new(PatternAnalyzer::new())])
        .run(harness.path())
        .await?;

    let file = &report.files["explore.ipynb"];
    assert_eq!(file.language, "python");
    assert_eq!(file.findings.len(), 1);
    assert_eq!(file.findings[0].category, Category::Security);
    Ok(())
}
