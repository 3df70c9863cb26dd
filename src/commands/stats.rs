//! Stats command for displaying index statistics and metrics

use anyhow::Result;
use std::path::Path;

use super::open_index;
use crate::metrics::gather_metrics;

/// Print retrieval index statistics, or all metrics in Prometheus
/// text format when `prometheus` is set.
pub async fn run(root: &Path, prometheus: bool) -> Result<()> {
    let (config, index) = open_index(root).await?;
    // opening the index sets the fragment gauge
    let stats = index.stats().await;

    if prometheus {
        print!("{}", gather_metrics());
        return Ok(());
    }

    println!("Retrieval Index Statistics");
    println!("==========================\n");

    println!("Backend:   {}", stats.backend);
    println!("Location:  {}", index.dir().display());
    println!();

    println!("Index Contents:");
    println!("  Total fragments:          {}", stats.total_fragments);
    println!("  Total files:              {}", stats.total_files);
    println!("  Avg issues per fragment:  {:.2}", stats.avg_issues_per_fragment);
    println!("  Avg fragment size:        {:.0} chars", stats.avg_fragment_size);
    println!("  Fragments with functions: {}", stats.fragments_with_functions);
    println!("  Fragments with imports:   {}", stats.fragments_with_imports);
    println!();

    if !stats.languages.is_empty() {
        println!("Languages:");
        for (language, count) in &stats.languages {
            println!("  {:<12} {}", language, count);
        }
        println!();
    }

    println!("Configured backends: {:?}", config.retrieval.backends);

    Ok(())
}
