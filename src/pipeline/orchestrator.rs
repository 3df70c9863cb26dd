//! Concurrent analysis of a source tree

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::errors::{DiagnosticCollector, PipelineError};
use crate::analysis::{analyzers_from_config, call_with_timeout, Analyzer, AnalyzerScope};
use crate::config::Config;
use crate::duplication::DuplicationIndex;
use crate::findings::{
    aggregate, merge_chunk_outcomes, merge_file, ChunkResult, CodebaseReport, Diagnostic,
    FileMergeInput, FileReport, Stage,
};
use crate::indexer::{Chunk, Chunker, SourceUnit, Walker};
use crate::metrics::{FILES_ANALYZED, FILES_FAILED, FILE_ANALYSIS_LATENCY, FINDINGS_TOTAL};
use crate::retrieval::{CorpusDocument, RetrievalIndex};

/// Shared, read-only state for per-file tasks
struct FileContext {
    config: Arc<Config>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    chunker: Chunker,
    service_timeout: Duration,
}

/// Sequences reading, chunked analysis, fingerprinting, merging and
/// (optionally) retrieval ingestion over one source tree.
pub struct Pipeline {
    config: Arc<Config>,
    analyzers: Vec<Arc<dyn Analyzer>>,
    index: Option<Arc<RetrievalIndex>>,
    file_timeout: Duration,
    service_timeout: Duration,
    show_progress: bool,
}

impl Pipeline {
    pub fn new(config: Arc<Config>, analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        let file_timeout = Duration::from_secs(config.analysis.file_timeout_secs);
        let service_timeout = Duration::from_secs(config.analysis.service_timeout_secs);
        Self {
            config,
            analyzers,
            index: None,
            file_timeout,
            service_timeout,
            show_progress: false,
        }
    }

    /// Pipeline with the analyzers the configuration enables
    pub fn from_config(config: Arc<Config>) -> anyhow::Result<Self> {
        let analyzers = analyzers_from_config(&config)?;
        Ok(Self::new(config, analyzers))
    }

    /// Ingest analyzed files into `index` at the end of each run
    pub fn with_index(mut self, index: Arc<RetrievalIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_timeouts(mut self, file: Duration, service: Duration) -> Self {
        self.file_timeout = file;
        self.service_timeout = service;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Analyze every matching file under `root`.
    pub async fn run(&self, root: &Path) -> Result<CodebaseReport, PipelineError> {
        self.config
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(format!("{:#}", e)))?;

        let walker = Walker::new(root.to_path_buf(), &self.config.analysis);
        let files = walker.collect_files();
        if files.is_empty() {
            return Err(PipelineError::NoFiles {
                root: root.to_path_buf(),
            });
        }

        info!("Analyzing {} files under {}", files.len(), root.display());
        let skipped = DiagnosticCollector::new();
        let units = read_units(files, root, &skipped).await;

        Ok(self.run_units(units, skipped.take()).await)
    }

    /// Analyze already-read units. `skipped` holds files that never made
    /// it to analysis.
    pub async fn run_units(&self, units: Vec<SourceUnit>, skipped: Vec<Diagnostic>) -> CodebaseReport {
        let start = Instant::now();

        // Fingerprinting depends on content only; it runs alongside analysis
        let fingerprint_input: Vec<(String, Arc<str>)> = units
            .iter()
            .map(|unit| (unit.display_path.clone(), unit.content.clone()))
            .collect();
        let fingerprint_config = self.config.fingerprint.clone();
        let fingerprinting = tokio::task::spawn_blocking(move || {
            DuplicationIndex::build(&fingerprint_input, &fingerprint_config)
        });

        let progress = self.progress_bar(units.len());
        let context = Arc::new(FileContext {
            config: self.config.clone(),
            analyzers: self.analyzers.clone(),
            chunker: Chunker::from_config(&self.config.analysis),
            service_timeout: self.service_timeout,
        });

        let pool_size = match self.config.analysis.max_concurrent_files {
            0 => num_cpus::get(),
            n => n,
        };
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut tasks = JoinSet::new();

        for unit in &units {
            let unit = unit.clone();
            let context = context.clone();
            let semaphore = semaphore.clone();
            let file_timeout = self.file_timeout;

            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = semaphore.acquire_owned().await.ok();
                let started = Instant::now();

                let analysis = AssertUnwindSafe(tokio::time::timeout(file_timeout, analyze_file(&context, &unit)))
                    .catch_unwind()
                    .await;
                let report = match analysis {
                    Ok(Ok(report)) => report,
                    Err(_) => {
                        warn!(file = %unit.display_path, "File analysis panicked");
                        FileReport::failed(
                            unit.display_path.clone(),
                            unit.language.clone(),
                            "analysis task panicked",
                        )
                    }
                    Ok(Err(_)) => {
                        warn!(file = %unit.display_path, ?file_timeout, "File analysis abandoned");
                        FileReport::failed(
                            unit.display_path.clone(),
                            unit.language.clone(),
                            format!("analysis timed out after {:?}", file_timeout),
                        )
                    }
                };

                FILE_ANALYSIS_LATENCY.observe(started.elapsed().as_secs_f64());
                report
            });
        }

        let mut reports = Vec::with_capacity(units.len());
        let mut run_diagnostics = skipped;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    if report.is_error() {
                        FILES_FAILED.inc();
                    } else {
                        FILES_ANALYZED.inc();
                    }
                    progress.inc(1);
                    reports.push(report);
                }
                Err(e) => {
                    warn!("File analysis task failed: {}", e);
                    progress.inc(1);
                    run_diagnostics.push(Diagnostic::new("", Stage::Analysis, format!("analysis task failed: {}", e)));
                }
            }
        }
        progress.finish_and_clear();

        let duplication = match fingerprinting.await {
            Ok(index) => {
                debug!("Fingerprinted {} files", index.file_count());
                index.findings()
            }
            Err(e) => {
                warn!("Fingerprinting task failed: {}", e);
                run_diagnostics.push(Diagnostic::new("", Stage::Fingerprinting, e.to_string()));
                Vec::new()
            }
        };

        let mut report = aggregate(reports, duplication, run_diagnostics);
        FINDINGS_TOTAL.inc_by(report.issues.len() as f64);

        if let Some(index) = &self.index {
            let documents: Vec<CorpusDocument> = units
                .iter()
                .map(|unit| CorpusDocument {
                    path: unit.display_path.clone(),
                    language: unit.language.clone(),
                    content: unit.content.to_string(),
                    issue_count: report.issue_count_for(&unit.display_path),
                })
                .collect();

            if let Err(e) = index.ingest(&documents).await {
                warn!("Retrieval ingestion failed: {:#}", e);
                report
                    .diagnostics
                    .push(Diagnostic::new("", Stage::Retrieval, format!("{:#}", e)));
            }
        }

        info!(
            files = report.summary.total_files,
            failed = report.summary.failed_files,
            issues = report.summary.total_issues,
            "Analysis completed in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        report
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] Files: [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    }
}

/// Read files on the blocking pool, recording the ones that fail.
async fn read_units(files: Vec<PathBuf>, root: &Path, skipped: &DiagnosticCollector) -> Vec<SourceUnit> {
    let root_owned = root.to_path_buf();
    let collector = skipped.clone();

    let read = tokio::task::spawn_blocking(move || {
        files
            .par_iter()
            .filter_map(|path| match SourceUnit::read(path, &root_owned) {
                Ok(unit) => Some(unit),
                Err(e) => {
                    let display = path
                        .strip_prefix(&root_owned)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .to_string();
                    collector.record(display, Stage::Read, e.to_string());
                    None
                }
            })
            .collect::<Vec<_>>()
    })
    .await;

    match read {
        Ok(mut units) => {
            units.sort_by(|a, b| a.display_path.cmp(&b.display_path));
            units
        }
        Err(e) => {
            warn!("File reading task failed: {}", e);
            skipped.record(root.display().to_string(), Stage::Read, e.to_string());
            Vec::new()
        }
    }
}

/// Run every analyzer over one file and merge the results.
async fn analyze_file(context: &FileContext, unit: &SourceUnit) -> FileReport {
    let mut diagnostics = Vec::new();
    let file_name = unit.file_name();

    let wants_chunks = context.chunker.needs_chunking(unit.size)
        && context
            .analyzers
            .iter()
            .any(|a| a.scope() == AnalyzerScope::Chunked);

    let chunks: Option<Vec<Chunk>> = if wants_chunks {
        match context.chunker.chunk(&unit.content, &unit.language) {
            Ok(chunks) => {
                debug!(file = %unit.display_path, chunks = chunks.len(), "Split oversized file");
                Some(chunks)
            }
            Err(e) => {
                diagnostics.push(Diagnostic::new(&unit.display_path, Stage::Chunking, e.to_string()));
                None
            }
        }
    } else {
        None
    };

    let mut outcomes = Vec::new();
    let mut attempted = 0;
    let mut failures = Vec::new();

    for analyzer in &context.analyzers {
        let chunked = analyzer.scope() == AnalyzerScope::Chunked && wants_chunks;

        if chunked {
            let Some(chunks) = &chunks else {
                // chunking failed; the diagnostic is already recorded
                continue;
            };
            attempted += 1;

            let results = stream::iter(chunks.iter().cloned())
                .map(|chunk| {
                    let analyzer = analyzer.clone();
                    async move {
                        let outcome = call_with_timeout(
                            analyzer.name(),
                            context.service_timeout,
                            analyzer.analyze(&chunk.content, &unit.language, file_name),
                        )
                        .await;
                        (chunk, outcome)
                    }
                })
                .buffer_unordered(context.config.analysis.max_concurrent_chunks.max(1))
                .collect::<Vec<_>>()
                .await;

            let mut chunk_results = Vec::new();
            for (chunk, outcome) in results {
                match outcome {
                    Ok(outcome) => chunk_results.push(ChunkResult {
                        chunk_id: chunk.id,
                        start_line: chunk.start_line,
                        outcome,
                    }),
                    Err(e) => diagnostics.push(Diagnostic::new(
                        &unit.display_path,
                        Stage::Analysis,
                        format!("chunk {} (lines {}-{}): {}", chunk.id, chunk.start_line, chunk.end_line, e),
                    )),
                }
            }

            if chunk_results.is_empty() {
                failures.push(format!("{}: every chunk failed", analyzer.name()));
            } else {
                outcomes.push(merge_chunk_outcomes(chunk_results));
            }
        } else {
            attempted += 1;
            let result = call_with_timeout(
                analyzer.name(),
                context.service_timeout,
                analyzer.analyze(&unit.content, &unit.language, file_name),
            )
            .await;

            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    diagnostics.push(Diagnostic::new(&unit.display_path, Stage::Analysis, e.to_string()));
                    failures.push(e.to_string());
                }
            }
        }
    }

    if attempted > 0 && failures.len() == attempted {
        let mut report = FileReport::failed(
            unit.display_path.clone(),
            unit.language.clone(),
            failures.join("; "),
        );
        report.diagnostics = diagnostics;
        return report;
    }

    merge_file(
        FileMergeInput {
            file_path: &unit.display_path,
            language: &unit.language,
            content: &unit.content,
            outcomes,
            chunks_analyzed: chunks.as_ref().map(Vec::len).unwrap_or(0),
            diagnostics,
        },
        &context.config.scoring,
    )
}
