use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::backend::{BackendCandidate, RetrievalBackend};
use crate::config::{BackendKind, RetrievalConfig};

/// Full vector database: LanceDB table plus a local embedding model.
pub struct VectorDbCandidate;

#[cfg(not(feature = "vector-db"))]
#[async_trait]
impl BackendCandidate for VectorDbCandidate {
    fn kind(&self) -> BackendKind {
        BackendKind::VectorDb
    }

    async fn probe(
        &self,
        _config: &RetrievalConfig,
        _dir: &Path,
    ) -> Result<Arc<dyn RetrievalBackend>> {
        anyhow::bail!("built without the `vector-db` feature")
    }
}

#[cfg(feature = "vector-db")]
pub use lance::LanceDbBackend;

#[cfg(feature = "vector-db")]
#[async_trait]
impl BackendCandidate for VectorDbCandidate {
    fn kind(&self) -> BackendKind {
        BackendKind::VectorDb
    }

    async fn probe(
        &self,
        config: &RetrievalConfig,
        dir: &Path,
    ) -> Result<Arc<dyn RetrievalBackend>> {
        use crate::embeddings::{EmbeddingProvider, FastEmbedProvider};
        use anyhow::Context;

        let model = config.model.clone();
        let batch_size = config.batch_size;
        // model load may download weights and is blocking
        let embedder = tokio::task::spawn_blocking(move || FastEmbedProvider::new(&model, batch_size))
            .await
            .context("Embedding model task failed")??;

        let status = embedder.health_check().await?;
        if !status.is_healthy() {
            anyhow::bail!("Embedding model unhealthy: {:?}", status);
        }

        let backend = LanceDbBackend::open(dir, Arc::new(embedder)).await?;
        Ok(Arc::new(backend))
    }
}

#[cfg(feature = "vector-db")]
mod lance {
    use anyhow::{anyhow, bail, Context, Result};
    use arrow_array::types::Float32Type;
    use arrow_array::{
        Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    };
    use arrow_schema::{DataType, Field, Schema};
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use lancedb::query::{ExecutableQuery, QueryBase};
    use lancedb::{connect, Connection, Table};
    use std::path::Path;
    use std::sync::Arc;
    use tracing::{debug, info};

    use crate::config::BackendKind;
    use crate::embeddings::EmbeddingProvider;
    use crate::retrieval::backend::RetrievalBackend;
    use crate::retrieval::IndexEntry;

    const TABLE_NAME: &str = "fragments";

    /// LanceDB table of (position, vector) rows
    pub struct LanceDbBackend {
        db: Connection,
        embedder: Arc<dyn EmbeddingProvider>,
        dimension: i32,
    }

    impl LanceDbBackend {
        pub async fn open(dir: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let uri = dir.to_string_lossy();

            info!("Opening LanceDB at: {}", uri);

            let db = connect(&uri)
                .execute()
                .await
                .with_context(|| format!("Failed to connect to LanceDB at {}", uri))?;
            let dimension = i32::try_from(embedder.embedding_dimension())
                .context("Embedding dimension out of range")?;

            Ok(Self {
                db,
                embedder,
                dimension,
            })
        }

        fn table_schema(&self) -> Schema {
            Schema::new(vec![
                Field::new("position", DataType::Int64, false),
                Field::new(
                    "vector",
                    DataType::FixedSizeList(
                        Arc::new(Field::new("item", DataType::Float32, true)),
                        self.dimension,
                    ),
                    false,
                ),
            ])
        }

        async fn open_table(&self) -> Result<Option<Table>> {
            let names = self.db.table_names().execute().await?;
            if !names.iter().any(|n| n == TABLE_NAME) {
                return Ok(None);
            }
            let table = self
                .db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .with_context(|| format!("Failed to open table {}", TABLE_NAME))?;
            Ok(Some(table))
        }

        /// Text embedded for an entry: a metadata header, then the fragment.
        fn embedding_text(entry: &IndexEntry) -> String {
            format!(
                "File: {} | Language: {} | Issues: {}\n{}",
                entry.file_path, entry.language, entry.issue_count, entry.content
            )
        }
    }

    #[async_trait]
    impl RetrievalBackend for LanceDbBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::VectorDb
        }

        async fn len(&self) -> Result<usize> {
            match self.open_table().await? {
                Some(table) => table
                    .count_rows(None)
                    .await
                    .context("Failed to count fragments"),
                None => Ok(0),
            }
        }

        async fn append(&self, base: usize, entries: &[IndexEntry]) -> Result<()> {
            if entries.is_empty() {
                return Ok(());
            }
            let held = self.len().await?;
            if held != base {
                bail!("LanceDB holds {} fragments, expected {}", held, base);
            }

            let texts: Vec<String> = entries.iter().map(Self::embedding_text).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != entries.len() {
                bail!(
                    "Embedder returned {} vectors for {} fragments",
                    vectors.len(),
                    entries.len()
                );
            }

            let positions: Vec<i64> = (base..base + entries.len()).map(|p| p as i64).collect();
            let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
                vectors.iter().map(|v| Some(v.iter().map(|&x| Some(x)))),
                self.dimension,
            );

            let schema = Arc::new(self.table_schema());
            let batch = RecordBatch::try_new(
                schema.clone(),
                vec![Arc::new(Int64Array::from(positions)), Arc::new(vector_array)],
            )
            .context("Failed to create RecordBatch")?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            match self.open_table().await? {
                Some(table) => {
                    table
                        .add(Box::new(batches))
                        .execute()
                        .await
                        .context("Failed to insert fragments")?;
                }
                None => {
                    self.db
                        .create_table(TABLE_NAME, Box::new(batches))
                        .execute()
                        .await
                        .context("Failed to create fragments table")?;
                }
            }

            debug!("Inserted {} fragments into LanceDB", entries.len());
            Ok(())
        }

        async fn truncate(&self, len: usize) -> Result<()> {
            if let Some(table) = self.open_table().await? {
                table
                    .delete(&format!("position >= {}", len))
                    .await
                    .context("Failed to remove trailing fragments")?;
                debug!("Truncated LanceDB fragments to {}", len);
            }
            Ok(())
        }

        async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>> {
            let Some(table) = self.open_table().await? else {
                return Ok(Vec::new());
            };
            let vector = self.embedder.embed_query(query).await?;

            let batches: Vec<RecordBatch> = table
                .vector_search(vector)
                .context("Failed to create vector search query")?
                .limit(k)
                .execute()
                .await
                .context("Failed to execute vector search")?
                .try_collect()
                .await
                .context("Failed to collect search results")?;

            let mut hits = Vec::new();
            for batch in batches {
                let positions = batch
                    .column_by_name("position")
                    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                    .ok_or_else(|| anyhow!("Missing position column"))?;
                let distances = batch
                    .column_by_name("_distance")
                    .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

                for i in 0..batch.num_rows() {
                    // squared L2 between unit vectors is 2 - 2cos
                    let similarity = distances
                        .filter(|d| !d.is_null(i))
                        .map(|d| 1.0 - d.value(i) / 2.0)
                        .unwrap_or(0.0);
                    hits.push((positions.value(i) as usize, similarity));
                }
            }

            Ok(crate::retrieval::backend::rank(hits, k))
        }

        async fn clear(&self) -> Result<()> {
            if self.open_table().await?.is_some() {
                self.db
                    .drop_table(TABLE_NAME)
                    .await
                    .context("Failed to drop fragments table")?;
            }
            info!("Cleared LanceDB fragments");
            Ok(())
        }
    }
}
