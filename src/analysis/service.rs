use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::findings::AnalysisOutcome;
use crate::metrics::SERVICE_TIMEOUTS;

/// Typed failure of an external collaborator (analyzer, inference, embedding).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{service} timed out after {after:?}")]
    Timeout { service: String, after: Duration },

    #[error("{service} exited with status {code:?}: {stderr}")]
    NonZeroExit {
        service: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{service} failed: {message}")]
    Failed { service: String, message: String },
}

impl ServiceError {
    pub fn failed(service: impl Into<String>, message: impl ToString) -> Self {
        ServiceError::Failed {
            service: service.into(),
            message: message.to_string(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Timeout { .. })
    }
}

/// Run `call`, giving up after `after` with [`ServiceError::Timeout`].
///
/// The future is dropped on expiry, which cancels it at its next await point
/// (subprocesses are spawned with `kill_on_drop`).
pub async fn call_with_timeout<T, F>(service: &str, after: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => {
            SERVICE_TIMEOUTS.inc();
            warn!(service, ?after, "External call timed out");
            Err(ServiceError::Timeout {
                service: service.to_string(),
                after,
            })
        }
    }
}

/// Which content an analyzer is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerScope {
    /// Always sees the complete file
    WholeFile,
    /// Sees chunks when the file exceeds the size limit
    Chunked,
}

/// An external analyzer: (content, language, file name) → findings and metrics.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Name for logging and diagnostics
    fn name(&self) -> &'static str;

    fn scope(&self) -> AnalyzerScope {
        AnalyzerScope::WholeFile
    }

    async fn analyze(
        &self,
        content: &str,
        language: &str,
        file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError>;
}
