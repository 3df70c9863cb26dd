//! Analyze command: run the pipeline over a tree and print the report.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::findings::CodebaseReport;
use crate::pipeline::{DiagnosticSummary, Pipeline};
use crate::retrieval::RetrievalIndex;
use crate::Config;

/// Issues listed in the human-readable report
const MAX_LISTED_ISSUES: usize = 15;

pub struct AnalyzeOptions {
    pub path: Option<PathBuf>,
    pub json: bool,
    pub no_index: bool,
    pub output: Option<PathBuf>,
}

pub async fn run(cwd: &Path, options: AnalyzeOptions) -> Result<()> {
    let root = match options.path {
        Some(path) if path.is_absolute() => path,
        Some(path) => cwd.join(path),
        None => cwd.to_path_buf(),
    };
    let root = std::fs::canonicalize(&root)
        .with_context(|| format!("Cannot analyze {}", root.display()))?;

    let config = Arc::new(Config::load(&root)?);
    let mut pipeline = Pipeline::from_config(config.clone())?.with_progress(!options.json);

    if !options.no_index {
        let index = RetrievalIndex::open(&config.retrieval, &config.index_dir(&root)).await?;
        info!("Retrieval backend: {}", index.backend_name());
        pipeline = pipeline.with_index(Arc::new(index));
    }

    let report = pipeline.run(&root).await?;

    if let Some(output) = &options.output {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
        eprintln!("Report written to {}", output.display());
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        let diagnostics: Vec<_> = report
            .diagnostics
            .iter()
            .chain(report.files.values().flat_map(|f| f.diagnostics.iter()))
            .cloned()
            .collect();
        DiagnosticSummary::from_diagnostics(&diagnostics).print();
    }

    Ok(())
}

fn print_report(report: &CodebaseReport) {
    let summary = &report.summary;

    println!("Codebase Quality Report");
    println!("=======================\n");
    println!("Files analyzed: {}", summary.total_files);
    if summary.failed_files > 0 {
        println!("Files failed:   {}", summary.failed_files);
    }
    if summary.skipped_files > 0 {
        println!("Files skipped:  {}", summary.skipped_files);
    }
    println!("Total issues:   {}", summary.total_issues);
    println!();

    if !summary.metrics.is_empty() {
        println!("Scores:");
        for (name, value) in &summary.metrics {
            println!("  {:<24} {:.1}", name, value);
        }
        println!();
    }

    if summary.total_issues > 0 {
        println!("By severity:");
        for (severity, count) in summary.severity_counts.iter().filter(|(_, c)| **c > 0) {
            println!("  {:<10} {}", severity, count);
        }
        println!();

        println!("Top issues:");
        for issue in report.issues.iter().take(MAX_LISTED_ISSUES) {
            println!(
                "  [{}] {}:{} {} ({})",
                issue.severity.as_str(),
                issue.file_path,
                issue.line,
                issue.title,
                issue.category.as_str()
            );
        }
        if report.issues.len() > MAX_LISTED_ISSUES {
            println!("  ... and {} more", report.issues.len() - MAX_LISTED_ISSUES);
        }
        println!();
    }

    println!("Recommendations:");
    for recommendation in &report.recommendations {
        println!("  - {}", recommendation);
    }
}
