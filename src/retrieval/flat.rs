use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::backend::{rank, BackendCandidate, RetrievalBackend};
use super::store::{load_json, remove_file, save_json};
use super::IndexEntry;
use crate::config::{BackendKind, RetrievalConfig};
use crate::embeddings::{dot, EmbeddingProvider, HashedFeatureEmbedder};

#[derive(Debug, Default, Serialize, Deserialize)]
struct VectorFile {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Exhaustive inner-product search over vectors kept in memory and
/// persisted as JSON.
pub struct FlatVectorBackend {
    embedder: Arc<dyn EmbeddingProvider>,
    path: PathBuf,
    vectors: RwLock<Vec<Vec<f32>>>,
}

impl FlatVectorBackend {
    /// Open the index under `dir`, discarding a persisted one that is
    /// unreadable or was built with another dimension.
    pub async fn open(dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = dir.join("vectors.json");
        let dimension = embedder.embedding_dimension();

        let vectors = match load_json::<VectorFile>(&path).await {
            Some(file) if file.dimension == dimension => file.vectors,
            Some(file) => {
                warn!(
                    expected = dimension,
                    found = file.dimension,
                    "Flat index dimension changed, starting empty"
                );
                Vec::new()
            }
            None => Vec::new(),
        };

        debug!("Opened flat index with {} vectors", vectors.len());

        Ok(Self {
            embedder,
            path,
            vectors: RwLock::new(vectors),
        })
    }

    async fn persist(&self, vectors: &[Vec<f32>]) -> Result<()> {
        #[derive(Serialize)]
        struct Borrowed<'a> {
            dimension: usize,
            vectors: &'a [Vec<f32>],
        }
        save_json(
            &self.path,
            &Borrowed {
                dimension: self.embedder.embedding_dimension(),
                vectors,
            },
        )
        .await
    }
}

#[async_trait]
impl RetrievalBackend for FlatVectorBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.vectors.read().await.len())
    }

    async fn append(&self, base: usize, entries: &[IndexEntry]) -> Result<()> {
        let held = self.vectors.read().await.len();
        if held != base {
            bail!("Flat index holds {} vectors, expected {}", held, base);
        }

        let texts: Vec<String> = entries.iter().map(|e| e.content.clone()).collect();
        let embedded = self.embedder.embed(&texts).await?;
        if embedded.len() != entries.len() {
            bail!(
                "Embedder returned {} vectors for {} fragments",
                embedded.len(),
                entries.len()
            );
        }

        let mut vectors = self.vectors.write().await;
        if vectors.len() != base {
            bail!("Flat index holds {} vectors, expected {}", vectors.len(), base);
        }

        let mut next = vectors.clone();
        next.extend(embedded);
        self.persist(&next).await?;
        *vectors = next;

        Ok(())
    }

    async fn truncate(&self, len: usize) -> Result<()> {
        let mut vectors = self.vectors.write().await;
        vectors.truncate(len);
        // the file may be ahead of memory if a write was interrupted
        self.persist(&vectors).await
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
        let query_vector = self.embedder.embed_query(query).await?;
        let vectors = self.vectors.read().await;

        let scored = vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, dot(&query_vector, vector)))
            .collect();

        Ok(rank(scored, k))
    }

    async fn clear(&self) -> Result<()> {
        let mut vectors = self.vectors.write().await;
        remove_file(&self.path).await?;
        vectors.clear();
        Ok(())
    }
}

/// In-process fallback using hashed code-feature embeddings
pub struct FlatCandidate;

#[async_trait]
impl BackendCandidate for FlatCandidate {
    fn kind(&self) -> BackendKind {
        BackendKind::Flat
    }

    async fn probe(
        &self,
        config: &RetrievalConfig,
        dir: &Path,
    ) -> Result<Arc<dyn RetrievalBackend>> {
        let embedder = HashedFeatureEmbedder::new(config.flat_dimension)?;
        let status = embedder.health_check().await?;
        if !status.is_healthy() {
            bail!("Hashed embedder unhealthy: {:?}", status);
        }

        let backend = FlatVectorBackend::open(dir, Arc::new(embedder)).await?;
        info!("Flat vector index ready ({} dimensions)", config.flat_dimension);
        Ok(Arc::new(backend))
    }
}
