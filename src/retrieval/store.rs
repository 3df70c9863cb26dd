use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::IndexEntry;

/// Read a JSON document, treating a missing file as `None` and an
/// unreadable or corrupt one as `None` with a warning.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable index file, starting empty");
            return None;
        }
    };

    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt index file, starting empty");
            None
        }
    }
}

/// Write a JSON document through a temporary file and rename, so readers
/// never see a half-written file.
pub async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let data = serde_json::to_vec(value).context("Failed to serialize index file")?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

/// Remove a file, ignoring one that does not exist.
pub async fn remove_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Raw fragment text and metadata, independent of the bound backend.
#[derive(Debug, Clone)]
pub struct FragmentStore {
    path: PathBuf,
}

impl FragmentStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("fragments.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Vec<IndexEntry> {
        let entries: Vec<IndexEntry> = load_json(&self.path).await.unwrap_or_default();
        debug!("Loaded {} fragments from {}", entries.len(), self.path.display());
        entries
    }

    pub async fn save(&self, entries: &[IndexEntry]) -> Result<()> {
        save_json(&self.path, entries).await
    }

    pub async fn clear(&self) -> Result<()> {
        remove_file(&self.path).await
    }
}
