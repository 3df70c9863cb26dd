use anyhow::{bail, Result};
use std::path::Path;
use tracing::info;

use crate::Config;

pub async fn run(root: &Path, force: bool) -> Result<()> {
    let config_dir = Config::codequal_dir(root);

    if Config::is_initialized(root) && !force {
        bail!(
            "codequal is already initialized in {:?} (use --force to overwrite)",
            config_dir
        );
    }

    let config = Config::default();
    config.save(root)?;

    info!("Initialized codequal in {:?}", config_dir);
    println!(
        "✓ Created {} with default configuration",
        config_dir.display()
    );
    println!("\nNext steps:");
    println!("  1. Edit .codequal/config.toml to customize analyzers and retrieval");
    println!("  2. Run 'codequal analyze' to analyze the codebase");
    println!("  3. Run 'codequal query \"...\"' to search the analyzed code");

    Ok(())
}
