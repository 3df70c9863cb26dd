use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use codequal::analysis::{Analyzer, AnalyzerScope, ServiceError};
use codequal::findings::{AnalysisOutcome, Metrics};

/// Sleeps before answering for files whose name contains `marker`.
pub struct SlowAnalyzer {
    pub marker: &'static str,
    pub delay: Duration,
    pub metrics: Metrics,
}

#[async_trait]
impl Analyzer for SlowAnalyzer {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn analyze(
        &self,
        _content: &str,
        _language: &str,
        file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError> {
        if file_name.contains(self.marker) {
            tokio::time::sleep(self.delay).await;
        }
        Ok(AnalysisOutcome {
            metrics: self.metrics.clone(),
            ..AnalysisOutcome::empty()
        })
    }
}

/// Chunked analyzer recording the first line of every chunk it sees.
#[derive(Default)]
pub struct RecordingAnalyzer {
    pub seen: Mutex<Vec<String>>,
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn scope(&self) -> AnalyzerScope {
        AnalyzerScope::Chunked
    }

    async fn analyze(
        &self,
        content: &str,
        _language: &str,
        _file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let first = content.lines().next().unwrap_or_default().to_string();
        self.seen.lock().unwrap().push(first);
        Ok(AnalysisOutcome::empty())
    }
}
