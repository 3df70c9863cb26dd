use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::backend::{candidates_for, BackendCandidate, RetrievalBackend};
use super::fragment::Fragmenter;
use super::store::FragmentStore;
use crate::analysis::call_with_timeout;
use crate::config::{BackendKind, RetrievalConfig};
use crate::metrics::{INDEXED_FRAGMENTS, RETRIEVAL_LATENCY, RETRIEVAL_QUERIES};

/// One indexed fragment with its metadata. The embedding lives in the
/// bound backend, addressed by the entry's position in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub content: String,
    pub file_path: String,
    pub language: String,
    /// Issues reported for the owning file
    pub issue_count: usize,
    /// Fragment number within the owning file
    pub chunk_index: usize,
    pub has_function: bool,
    pub has_import: bool,
    pub has_comment: bool,
    pub size: usize,
}

/// A file offered for ingestion
#[derive(Debug, Clone)]
pub struct CorpusDocument {
    pub path: String,
    pub language: String,
    pub content: String,
    pub issue_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    pub score: f32,
    #[serde(flatten)]
    pub entry: IndexEntry,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub backend: String,
    pub total_fragments: usize,
    pub total_files: usize,
    pub languages: BTreeMap<String, usize>,
    pub avg_issues_per_fragment: f64,
    pub avg_fragment_size: f64,
    pub fragments_with_functions: usize,
    pub fragments_with_imports: usize,
}

impl IndexStats {
    /// Statistics computed from stored metadata alone
    pub fn from_entries(backend: BackendKind, entries: &[IndexEntry]) -> Self {
        let total = entries.len();
        let mut languages = BTreeMap::new();
        for entry in entries {
            *languages.entry(entry.language.clone()).or_insert(0) += 1;
        }
        let files: BTreeSet<&str> = entries.iter().map(|e| e.file_path.as_str()).collect();
        let mean = |sum: usize| if total == 0 { 0.0 } else { sum as f64 / total as f64 };

        Self {
            backend: backend.to_string(),
            total_fragments: total,
            total_files: files.len(),
            languages,
            avg_issues_per_fragment: mean(entries.iter().map(|e| e.issue_count).sum()),
            avg_fragment_size: mean(entries.iter().map(|e| e.size).sum()),
            fragments_with_functions: entries.iter().filter(|e| e.has_function).count(),
            fragments_with_imports: entries.iter().filter(|e| e.has_import).count(),
        }
    }
}

/// Similarity index over analyzed code, bound at open time to the first
/// backend in the fallback chain that initializes.
///
/// Writes are serialized; queries read a snapshot of the fragment store,
/// so a batch becomes visible only once it is fully appended.
pub struct RetrievalIndex {
    backend: Arc<dyn RetrievalBackend>,
    store: FragmentStore,
    snapshot: RwLock<Arc<Vec<IndexEntry>>>,
    writer: Mutex<()>,
    fragmenter: Fragmenter,
    floor: f32,
    dir: PathBuf,
    call_timeout: Duration,
}

/// Run one backend call under `after`; expiry is a
/// [`ServiceError::Timeout`](crate::analysis::ServiceError::Timeout).
async fn bounded<T>(
    kind: BackendKind,
    operation: &str,
    after: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    let service = format!("{} {}", kind, operation);
    call_with_timeout(&service, after, async { Ok(call.await) }).await?
}

impl RetrievalIndex {
    /// Open the index under `dir` with the configured backend chain.
    pub async fn open(config: &RetrievalConfig, dir: &Path) -> Result<Self> {
        Self::open_with_candidates(config, dir, candidates_for(&config.backends)).await
    }

    pub async fn open_with_candidates(
        config: &RetrievalConfig,
        dir: &Path,
        candidates: Vec<Box<dyn BackendCandidate>>,
    ) -> Result<Self> {
        let mut bound = None;
        let mut tried = Vec::new();
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        let call_timeout = Duration::from_secs(config.embedding_timeout_secs);

        for candidate in &candidates {
            let kind = candidate.kind();
            let backend_dir = dir.join(kind.to_string());
            let probed = tokio::time::timeout(probe_timeout, candidate.probe(config, &backend_dir))
                .await
                .unwrap_or_else(|_| Err(anyhow!("initialization timed out after {:?}", probe_timeout)));
            match probed {
                Ok(backend) => {
                    bound = Some((backend, backend_dir));
                    break;
                }
                Err(e) => {
                    warn!(backend = %kind, error = %format!("{:#}", e), "Retrieval backend unavailable");
                    tried.push(kind.to_string());
                }
            }
        }

        let Some((backend, backend_dir)) = bound else {
            bail!("No retrieval backend available (tried: {})", tried.join(", "));
        };

        let kind = backend.kind();
        let store = FragmentStore::new(&backend_dir);
        let mut entries = store.load().await;

        let indexed = match bounded(kind, "count", call_timeout, backend.len()).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Unable to read backend index size");
                usize::MAX
            }
        };
        if indexed != entries.len() {
            warn!(
                backend = %kind,
                stored = entries.len(),
                indexed,
                "Fragment store and backend index disagree, starting empty"
            );
            bounded(kind, "clear", call_timeout, backend.clear()).await?;
            store.clear().await?;
            entries.clear();
        }

        INDEXED_FRAGMENTS.set(entries.len() as f64);
        info!(backend = %kind, fragments = entries.len(), "Retrieval index ready");

        Ok(Self {
            backend,
            store,
            snapshot: RwLock::new(Arc::new(entries)),
            writer: Mutex::new(()),
            fragmenter: Fragmenter::from_config(config),
            floor: config.floor_for(kind),
            dir: backend_dir,
            call_timeout,
        })
    }

    /// Override the per-call budget taken from the configuration
    pub fn with_call_timeout(mut self, after: Duration) -> Self {
        self.call_timeout = after;
        self
    }

    async fn call<T>(&self, operation: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        bounded(self.backend.kind(), operation, self.call_timeout, call).await
    }

    /// Drop backend entries past `len` after a failed write. If this fails
    /// too, the next open finds the mismatch and starts empty.
    async fn roll_back(&self, len: usize) {
        if let Err(e) = self.call("rollback", self.backend.truncate(len)).await {
            warn!(
                backend = %self.backend.kind(),
                error = %format!("{:#}", e),
                "Unable to roll back backend after a failed write"
            );
        }
    }

    pub fn backend_name(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Directory holding the bound backend's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fragment, embed and append `documents`; returns the number of
    /// fragments added.
    pub async fn ingest(&self, documents: &[CorpusDocument]) -> Result<usize> {
        let _writer = self.writer.lock().await;
        let current = self.snapshot.read().await.clone();

        let fresh: Vec<IndexEntry> = documents
            .iter()
            .flat_map(|doc| {
                self.fragmenter
                    .split(&doc.content)
                    .into_iter()
                    .map(move |fragment| IndexEntry {
                        id: Uuid::new_v4().to_string(),
                        has_function: fragment.has_function(),
                        has_import: fragment.has_import(),
                        has_comment: fragment.has_comment(),
                        size: fragment.content.len(),
                        content: fragment.content,
                        file_path: doc.path.clone(),
                        language: doc.language.clone(),
                        issue_count: doc.issue_count,
                        chunk_index: fragment.index,
                    })
            })
            .collect();

        if fresh.is_empty() {
            debug!("Nothing to ingest");
            return Ok(0);
        }

        let base = current.len();
        if let Err(e) = self.call("append", self.backend.append(base, &fresh)).await {
            self.roll_back(base).await;
            return Err(e);
        }

        let mut next = Vec::with_capacity(base + fresh.len());
        next.extend(current.iter().cloned());
        next.extend(fresh.iter().cloned());
        if let Err(e) = self.store.save(&next).await {
            self.roll_back(base).await;
            return Err(e);
        }

        INDEXED_FRAGMENTS.set(next.len() as f64);
        *self.snapshot.write().await = Arc::new(next);

        info!(
            documents = documents.len(),
            fragments = fresh.len(),
            "Ingested into retrieval index"
        );
        Ok(fresh.len())
    }

    /// Up to `k` fragments above the backend's similarity floor, best
    /// first. Empty means no confident match.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<QueryHit>> {
        RETRIEVAL_QUERIES.inc();
        let start = Instant::now();

        let snapshot = self.snapshot.read().await.clone();
        if k == 0 || text.trim().is_empty() || snapshot.is_empty() {
            return Ok(Vec::new());
        }

        let scored = self.call("search", self.backend.search(text, k)).await?;
        let hits: Vec<QueryHit> = scored
            .into_iter()
            .filter(|(_, score)| *score >= self.floor)
            // positions past the snapshot belong to an in-flight batch
            .filter_map(|(position, score)| {
                snapshot.get(position).map(|entry| QueryHit {
                    score,
                    entry: entry.clone(),
                })
            })
            .take(k)
            .collect();

        RETRIEVAL_LATENCY.observe(start.elapsed().as_secs_f64());
        debug!(query = text, results = hits.len(), "Retrieval query");
        Ok(hits)
    }

    pub async fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.read().await.clone();
        IndexStats::from_entries(self.backend.kind(), &snapshot)
    }

    /// Drop every fragment from the backend and the store.
    pub async fn clear(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.call("clear", self.backend.clear()).await?;
        self.store.clear().await?;
        *self.snapshot.write().await = Arc::new(Vec::new());
        INDEXED_FRAGMENTS.set(0.0);
        info!(backend = %self.backend.kind(), "Retrieval index cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Unavailable(BackendKind);

    #[async_trait]
    impl BackendCandidate for Unavailable {
        fn kind(&self) -> BackendKind {
            self.0
        }

        async fn probe(
            &self,
            _config: &RetrievalConfig,
            _dir: &Path,
        ) -> Result<Arc<dyn RetrievalBackend>> {
            bail!("not installed")
        }
    }

    /// Backend whose calls never return
    struct Hanging;

    #[async_trait]
    impl RetrievalBackend for Hanging {
        fn kind(&self) -> BackendKind {
            BackendKind::VectorDb
        }

        async fn len(&self) -> Result<usize> {
            Ok(0)
        }

        async fn append(&self, _base: usize, _entries: &[IndexEntry]) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn truncate(&self, _len: usize) -> Result<()> {
            Ok(())
        }

        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<(usize, f32)>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<()> {
            Ok(())
        }
    }

    struct HangingCandidate;

    #[async_trait]
    impl BackendCandidate for HangingCandidate {
        fn kind(&self) -> BackendKind {
            BackendKind::VectorDb
        }

        async fn probe(
            &self,
            _config: &RetrievalConfig,
            _dir: &Path,
        ) -> Result<Arc<dyn RetrievalBackend>> {
            Ok(Arc::new(Hanging))
        }
    }

    /// Candidate whose initialization never finishes
    struct StalledCandidate;

    #[async_trait]
    impl BackendCandidate for StalledCandidate {
        fn kind(&self) -> BackendKind {
            BackendKind::VectorDb
        }

        async fn probe(
            &self,
            _config: &RetrievalConfig,
            _dir: &Path,
        ) -> Result<Arc<dyn RetrievalBackend>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            bail!("unreachable")
        }
    }

    fn config() -> RetrievalConfig {
        RetrievalConfig {
            backends: vec![BackendKind::Flat, BackendKind::Keyword],
            ..RetrievalConfig::default()
        }
    }

    fn document(path: &str, content: &str, issues: usize) -> CorpusDocument {
        CorpusDocument {
            path: path.to_string(),
            language: "python".to_string(),
            content: content.to_string(),
            issue_count: issues,
        }
    }

    const LOADER: &str = "def load_settings(path):\n    with open(path) as handle:\n        return json.load(handle)\n";
    const HANDLER: &str = "import subprocess\n\ndef run_command(user_input):\n    return subprocess.call(user_input, shell=True)\n";

    #[tokio::test]
    async fn test_falls_back_past_unavailable_backend() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex::open_with_candidates(
            &config(),
            dir.path(),
            vec![
                Box::new(Unavailable(BackendKind::VectorDb)),
                Box::new(super::super::keyword::KeywordCandidate),
            ],
        )
        .await
        .unwrap();

        assert_eq!(index.backend_name(), BackendKind::Keyword);
    }

    #[tokio::test]
    async fn test_no_backend_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = RetrievalIndex::open_with_candidates(
            &config(),
            dir.path(),
            vec![Box::new(Unavailable(BackendKind::Flat))],
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ingest_query_stats() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        assert_eq!(index.backend_name(), BackendKind::Flat);

        let added = index
            .ingest(&[document("settings.py", LOADER, 0), document("runner.py", HANDLER, 2)])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let hits = index.query(HANDLER.trim_end(), 5).await.unwrap();
        assert_eq!(hits[0].entry.file_path, "runner.py");
        assert!(hits[0].score >= index.floor);

        let stats = index.stats().await;
        assert_eq!(stats.total_fragments, 2);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.languages["python"], 2);
        assert!((stats.avg_issues_per_fragment - 1.0).abs() < 1e-9);
        assert_eq!(stats.fragments_with_imports, 1);
        assert_eq!(stats.fragments_with_functions, 2);
    }

    #[tokio::test]
    async fn test_clear_then_query_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        index.ingest(&[document("settings.py", LOADER, 0)]).await.unwrap();

        index.clear().await.unwrap();

        assert!(index.query(LOADER, 5).await.unwrap().is_empty());
        assert_eq!(index.stats().await.total_fragments, 0);
    }

    #[tokio::test]
    async fn test_reload_gives_identical_results() {
        let dir = TempDir::new().unwrap();
        let before = {
            let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
            index
                .ingest(&[document("settings.py", LOADER, 0), document("runner.py", HANDLER, 2)])
                .await
                .unwrap();
            index.query("subprocess shell command", 5).await.unwrap()
        };

        let reopened = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        let after = reopened.query("subprocess shell command", 5).await.unwrap();

        assert_eq!(before.len(), after.len());
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.entry, b.entry);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_inconsistent_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        {
            let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
            index.ingest(&[document("settings.py", LOADER, 0)]).await.unwrap();
        }
        tokio::fs::remove_file(dir.path().join("flat").join("vectors.json"))
            .await
            .unwrap();

        let reopened = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        assert_eq!(reopened.stats().await.total_fragments, 0);
        assert!(reopened.query(LOADER, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_content_is_skipped() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        let added = index.ingest(&[document("tiny.py", "x = 1", 0)]).await.unwrap();
        assert_eq!(added, 0);
    }

    #[tokio::test]
    async fn test_hanging_backend_times_out() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex::open_with_candidates(
            &config(),
            dir.path(),
            vec![Box::new(HangingCandidate)],
        )
        .await
        .unwrap()
        .with_call_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = index
            .ingest(&[document("settings.py", LOADER, 0)])
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("timed out"), "{:#}", err);
        assert!(started.elapsed() < Duration::from_secs(30));

        // nothing became visible
        assert_eq!(index.stats().await.total_fragments, 0);
        assert!(index.query(LOADER, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_initialization_falls_through() {
        let dir = TempDir::new().unwrap();
        let config = RetrievalConfig {
            probe_timeout_secs: 1,
            ..config()
        };
        let index = RetrievalIndex::open_with_candidates(
            &config,
            dir.path(),
            vec![
                Box::new(StalledCandidate),
                Box::new(super::super::keyword::KeywordCandidate),
            ],
        )
        .await
        .unwrap();

        assert_eq!(index.backend_name(), BackendKind::Keyword);
    }

    #[tokio::test]
    async fn test_failed_store_write_rolls_back_backend() {
        let dir = TempDir::new().unwrap();
        // a directory in place of the store file makes every save fail
        let blocker = dir.path().join("flat").join("fragments.json");
        tokio::fs::create_dir_all(&blocker).await.unwrap();

        {
            let index = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
            assert_eq!(index.backend_name(), BackendKind::Flat);
            assert!(index.ingest(&[document("settings.py", LOADER, 0)]).await.is_err());
            assert_eq!(index.backend.len().await.unwrap(), 0);

            tokio::fs::remove_dir(&blocker).await.unwrap();
            let added = index.ingest(&[document("runner.py", HANDLER, 2)]).await.unwrap();
            assert_eq!(added, 1);
            assert_eq!(index.backend.len().await.unwrap(), 1);
        }

        let reopened = RetrievalIndex::open(&config(), dir.path()).await.unwrap();
        let stats = reopened.stats().await;
        assert_eq!(stats.total_fragments, 1);
        assert_eq!(stats.total_files, 1);

        let hits = reopened.query(HANDLER.trim_end(), 5).await.unwrap();
        assert_eq!(hits[0].entry.file_path, "runner.py");
    }
}
