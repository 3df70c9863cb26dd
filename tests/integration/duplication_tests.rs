use anyhow::Result;
use std::sync::Arc;

use codequal::analysis::PatternAnalyzer;
use codequal::findings::{Category, Severity};

use crate::helpers::test_harness::TestHarness;

/// Twelve lines long enough to survive the noise filter.
fn shared_block() -> String {
    (0..12)
        .map(|i| format!("    total_{i} = compute_weighted_value(inputs[{i}], weights[{i}])\n"))
        .collect()
}

#[tokio::test]
async fn test_shared_block_reported_once_per_file_per_window() -> Result<()> {
    let harness = TestHarness::new()?;
    harness.create_test_file(
        "billing/invoice.py",
        &format!("def invoice_totals(inputs, weights):\n{}", shared_block()),
    )?;
    harness.create_test_file(
        "billing/quote.py",
        &format!("{}def unrelated_tail():\n    return None\n", shared_block()),
    )?;

    let report = harness
        .pipeline(vec![Arc::new(PatternAnalyzer::new())])
        .run(harness.path())
        .await?;

    let duplicates: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.category == Category::CodeDuplication)
        .collect();

    // three 10-line windows fit inside the 12 shared lines
    assert_eq!(duplicates.len(), 6);
    assert!(duplicates.iter().all(|issue| issue.severity == Severity::Low));
    assert!(duplicates.iter().all(|issue| issue.description.contains("2 times")));
    assert_eq!(
        duplicates.iter().filter(|issue| issue.file_path == "billing/invoice.py").count(),
        3
    );
    assert_eq!(report.summary.category_counts["code_duplication"], 6);

    // duplication lives only in the codebase issue list
    for file in report.files.values() {
        assert!(file
            .findings
            .iter()
            .all(|finding| finding.category != Category::CodeDuplication));
    }
    Ok(())
}

#[tokio::test]
async fn test_whitespace_only_differences_still_match() -> Result<()> {
    let harness = TestHarness::new()?;
    let block = shared_block();
    let reindented: String = block.lines().map(|line| format!("\t{}\n", line.trim())).collect();
    harness.create_test_file("a.py", &block)?;
    harness.create_test_file("b.py", &format!("\n\n{}", reindented))?;

    let report = harness.pipeline(Vec::new()).run(harness.path()).await?;

    let in_b: Vec<_> = report
        .issues
        .iter()
        .filter(|issue| issue.file_path == "b.py")
        .collect();
    assert!(!in_b.is_empty());
    assert!(in_b.iter().all(|issue| issue.category == Category::CodeDuplication));
    Ok(())
}

#[tokio::test]
async fn test_distinct_files_have_no_duplication() -> Result<()> {
    let harness = TestHarness::new()?;
    let first: String = (0..15).map(|i| format!("alpha_value_{i} = load_alpha_source({i})\n")).collect();
    let second: String = (0..15).map(|i| format!("beta_value_{i} = load_beta_source({i})\n")).collect();
    harness.create_test_file("alpha.py", &first)?;
    harness.create_test_file("beta.py", &second)?;

    let report = harness.pipeline(Vec::new()).run(harness.path()).await?;

    assert_eq!(report.summary.category_counts["code_duplication"], 0);
    Ok(())
}
