//! Backend abstraction for the retrieval index.
//!
//! A backend owns its own similarity index and persists it under the
//! directory it was probed with. Entries are addressed by their position
//! in the fragment store, which the [`RetrievalIndex`](super::RetrievalIndex)
//! owns.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use super::IndexEntry;
use crate::config::{BackendKind, RetrievalConfig};

/// A bound similarity index.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Entries currently held by the backend's own index
    async fn len(&self) -> Result<usize>;

    /// Index `entries`, which occupy positions `base..base + entries.len()`
    /// in the fragment store. Persists before returning.
    async fn append(&self, base: usize, entries: &[IndexEntry]) -> Result<()>;

    /// Forget every entry at position `len` or later. Used to undo an
    /// append whose fragment metadata could not be stored.
    async fn truncate(&self, len: usize) -> Result<()>;

    /// Up to `k` (position, similarity) pairs, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<(usize, f32)>>;

    async fn clear(&self) -> Result<()>;
}

/// One entry of the fallback chain; probed once when the index opens.
#[async_trait]
pub trait BackendCandidate: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Initialize the backend under `dir`, or explain why it is unavailable.
    async fn probe(&self, config: &RetrievalConfig, dir: &Path)
        -> Result<Arc<dyn RetrievalBackend>>;
}

/// Candidates for the configured backend kinds, in priority order.
pub fn candidates_for(kinds: &[BackendKind]) -> Vec<Box<dyn BackendCandidate>> {
    kinds
        .iter()
        .map(|kind| -> Box<dyn BackendCandidate> {
            match kind {
                BackendKind::VectorDb => Box::new(super::vector_db::VectorDbCandidate),
                BackendKind::Flat => Box::new(super::flat::FlatCandidate),
                BackendKind::Keyword => Box::new(super::keyword::KeywordCandidate),
            }
        })
        .collect()
}

/// Sort (position, score) pairs best first, ties by position, and keep `k`.
pub(crate) fn rank(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}
