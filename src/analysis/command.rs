use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::outcome::parse_outcome;
use super::service::{Analyzer, ServiceError};
use crate::findings::AnalysisOutcome;

const SERVICE: &str = "command";

/// Runs an external analyzer program.
///
/// The file content is written to the program's stdin; `{file}` and
/// `{language}` in the arguments are substituted. Stdout is decoded as a JSON
/// outcome. A non-zero exit is a [`ServiceError`]; unparseable output is an
/// empty outcome.
#[derive(Debug, Clone)]
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a `[program, args...]` list; `None` for an empty list.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn analyze(
        &self,
        content: &str,
        language: &str,
        file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace("{file}", file_name).replace("{language}", language))
            .collect();

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ServiceError::failed(SERVICE, format!("failed to spawn {}: {}", self.program, e)))?;

        // feed stdin concurrently so a chatty child cannot deadlock on a full pipe
        let writer = child.stdin.take().map(|mut stdin| {
            let input = content.to_owned();
            tokio::spawn(async move {
                let _ = stdin.write_all(input.as_bytes()).await;
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ServiceError::failed(SERVICE, e))?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            return Err(ServiceError::NonZeroExit {
                service: format!("{} ({})", SERVICE, self.program),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_outcome(&stdout) {
            Some(outcome) => {
                debug!(program = %self.program, findings = outcome.findings.len(), "External analyzer finished");
                Ok(outcome)
            }
            None => {
                warn!(program = %self.program, "External analyzer output was not structured JSON");
                Ok(AnalysisOutcome::empty())
            }
        }
    }
}
