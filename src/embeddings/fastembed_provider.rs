use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;
use tracing::{info, warn};

use super::provider::EmbeddingProvider;
use crate::metrics::EMBEDDING_REQUESTS;

/// Local ONNX sentence-embedding model
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Load (downloading on first use) the named model
    pub fn new(model_name: &str, batch_size: usize) -> Result<Self> {
        let model_type = Self::parse_model_name(model_name);

        info!("Loading embedding model: {}", model_name);

        let model = TextEmbedding::try_new(
            InitOptions::new(model_type).with_show_download_progress(false),
        )
        .with_context(|| format!("Failed to initialize embedding model: {}", model_name))?;

        info!("Embedding model loaded successfully");

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            batch_size: batch_size.max(1),
        })
    }

    fn parse_model_name(name: &str) -> EmbeddingModel {
        match name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" | "bge-small" | "BAAI/bge-small-en-v1.5" => {
                EmbeddingModel::BGESmallENV15
            }
            "bge-base-en-v1.5" | "bge-base" | "BAAI/bge-base-en-v1.5" => {
                EmbeddingModel::BGEBaseENV15
            }
            "nomic-embed-text-v1.5" | "nomic-embed-text" => EmbeddingModel::NomicEmbedTextV15,
            _ => {
                warn!("Unknown model '{}', falling back to all-MiniLM-L6-v2", name);
                EmbeddingModel::AllMiniLML6V2
            }
        }
    }

    fn model_dimension(model_name: &str) -> usize {
        match model_name {
            name if name.contains("bge-base") || name.contains("nomic") => 768,
            _ => 384,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        EMBEDDING_REQUESTS.inc();

        // fastembed is synchronous
        let model = self.model.clone();
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut embeddings = Vec::with_capacity(texts.len());
            for chunk in texts.chunks(batch_size) {
                let batch: Vec<&str> = chunk.iter().map(|s| s.as_str()).collect();
                let vectors = model
                    .embed(batch, None)
                    .context("Failed to generate embeddings")?;
                embeddings.extend(vectors);
            }
            Ok::<Vec<Vec<f32>>, anyhow::Error>(embeddings)
        })
        .await
        .context("FastEmbed processing task failed")?
    }

    fn embedding_dimension(&self) -> usize {
        Self::model_dimension(&self.model_name)
    }

    fn provider_name(&self) -> &'static str {
        "fastembed"
    }
}
