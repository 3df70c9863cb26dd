use anyhow::{anyhow, Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::outcome::parse_outcome;
use super::service::{Analyzer, AnalyzerScope, ServiceError};
use crate::config::InferenceConfig;
use crate::findings::AnalysisOutcome;

const SYSTEM_PROMPT: &str = "You are a code reviewer. Respond with a single JSON object and nothing else.";

const MAX_RETRIES: u32 = 2;
const INITIAL_BACKOFF_MS: u64 = 500;

/// A text-completion service (language model behind some API).
#[async_trait]
pub trait InferenceService: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Reviews code through an [`InferenceService`], chunk by chunk for large files.
pub struct InferenceAnalyzer {
    service: Arc<dyn InferenceService>,
}

impl InferenceAnalyzer {
    pub fn new(service: Arc<dyn InferenceService>) -> Self {
        Self { service }
    }
}

/// Prompt asking for the JSON shape [`parse_outcome`] understands.
pub fn build_prompt(content: &str, language: &str, file_name: &str) -> String {
    format!(
        "Review the following {language} code from `{file_name}`.\n\
         Return JSON with keys:\n\
         - \"issues\": list of {{\"category\", \"severity\", \"line_number\", \"title\", \"description\", \"suggestion\"}}\n\
         \x20 category is one of security, performance, complexity, maintainability, best_practices, code_duplication, testing, documentation\n\
         \x20 severity is one of critical, high, medium, low, info\n\
         - \"metrics\": numeric scores 0-100 such as complexity_score, maintainability_score, security_score\n\
         - \"summary\": one paragraph\n\
         - \"recommendations\": list of strings\n\
         Line numbers are relative to the code below, starting at 1.\n\n\
         ```{language}\n{content}\n```\n"
    )
}

#[async_trait]
impl Analyzer for InferenceAnalyzer {
    fn name(&self) -> &'static str {
        self.service.name()
    }

    fn scope(&self) -> AnalyzerScope {
        AnalyzerScope::Chunked
    }

    async fn analyze(
        &self,
        content: &str,
        language: &str,
        file_name: &str,
    ) -> Result<AnalysisOutcome, ServiceError> {
        let prompt = build_prompt(content, language, file_name);
        let raw = self.service.complete(&prompt).await?;

        Ok(parse_outcome(&raw).unwrap_or_else(|| {
            warn!(file = file_name, service = self.service.name(), "Unstructured inference response, treating as empty");
            AnalysisOutcome::empty()
        }))
    }
}

/// Chat-completion client for OpenAI-compatible endpoints.
pub struct OpenAiInference {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiInference {
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("Inference enabled but {} is not set", config.api_key_env))?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = &config.api_base {
            openai_config = openai_config.with_api_base(base);
        }

        info!("Initialized inference client with model: {}", config.model);

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages([
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()?
                    .into(),
            ])
            .build()
            .context("Failed to build chat request")?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Chat completion returned no content"))
    }
}

#[async_trait]
impl InferenceService for OpenAiInference {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let mut backoff = INITIAL_BACKOFF_MS;
        let mut attempt = 0;
        loop {
            match self.request(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt >= MAX_RETRIES => {
                    return Err(ServiceError::failed(self.name(), format!("{:#}", e)));
                }
                Err(e) => {
                    warn!("Inference request failed (attempt {}): {:#}", attempt + 1, e);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    backoff *= 2;
                    attempt += 1;
                }
            }
        }
    }
}
