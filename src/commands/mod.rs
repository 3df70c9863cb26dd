pub mod analyze;
pub mod clear;
pub mod init;
pub mod query;
pub mod stats;

use anyhow::{bail, Result};
use std::path::Path;

use crate::retrieval::RetrievalIndex;
use crate::Config;

/// Open the retrieval index of an initialized project.
pub(crate) async fn open_index(root: &Path) -> Result<(Config, RetrievalIndex)> {
    if !Config::is_initialized(root) {
        bail!("codequal is not initialized. Run 'codequal init' first.");
    }
    let config = Config::load(root)?;
    let index = RetrievalIndex::open(&config.retrieval, &config.index_dir(root)).await?;
    Ok((config, index))
}
