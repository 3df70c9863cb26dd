use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use codequal::analysis::Analyzer;
use codequal::config::BackendKind;
use codequal::{Config, Pipeline, RetrievalIndex};

/// Scratch project directory with a test-friendly configuration.
pub struct TestHarness {
    pub temp_dir: TempDir,
    pub config: Config,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let mut config = Config::default();
        config.logging.enabled = false;
        // no model downloads in tests
        config.retrieval.backends = vec![BackendKind::Flat, BackendKind::Keyword];

        Ok(Self { temp_dir, config })
    }

    pub fn create_test_file(&self, path: &str, content: &str) -> Result<PathBuf> {
        let file_path = self.temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&file_path, content)?;
        Ok(file_path)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn pipeline(&self, analyzers: Vec<Arc<dyn Analyzer>>) -> Pipeline {
        Pipeline::new(Arc::new(self.config.clone()), analyzers)
    }

    pub async fn open_index(&self) -> Result<RetrievalIndex> {
        RetrievalIndex::open(&self.config.retrieval, &self.config.index_dir(self.path())).await
    }
}
