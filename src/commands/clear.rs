use anyhow::Result;
use std::path::Path;

use super::open_index;

pub async fn run(root: &Path) -> Result<()> {
    let (_, index) = open_index(root).await?;
    let before = index.stats().await.total_fragments;

    index.clear().await?;

    println!(
        "Cleared {} fragments from the {} index",
        before,
        index.backend_name()
    );
    Ok(())
}
