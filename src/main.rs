use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use codequal::cli::{Cli, Commands};
use codequal::commands::analyze::AnalyzeOptions;
use codequal::config::Config;
use codequal::logging::{init_early_logging, init_logging};
use codequal::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    // An invalid config is reported by the command that loads it
    let mut config = Config::load(&project_root).unwrap_or_default();
    if !Config::is_initialized(&project_root) {
        // log files would otherwise create .codequal/ before `init` runs
        config.logging.enabled = false;
    }

    // The guard must be held until exit so buffered logs are flushed
    let _logging_guard = match init_logging(&config.logging, &project_root) {
        Ok(guard) => Some(guard),
        Err(e) => {
            init_early_logging();
            tracing::warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    tracing::info!("codequal starting up");
    tracing::debug!("Project root: {}", project_root.display());

    metrics::register_metrics();

    match cli.command {
        Commands::Init { force } => {
            codequal::commands::init::run(&project_root, force).await?;
        }
        Commands::Analyze {
            path,
            json,
            no_index,
            output,
        } => {
            codequal::commands::analyze::run(
                &project_root,
                AnalyzeOptions {
                    path,
                    json,
                    no_index,
                    output,
                },
            )
            .await?;
        }
        Commands::Query { text, limit, json } => {
            codequal::commands::query::run(&project_root, &text, limit, json).await?;
        }
        Commands::Stats { prometheus } => {
            codequal::commands::stats::run(&project_root, prometheus).await?;
        }
        Commands::Clear => {
            codequal::commands::clear::run(&project_root).await?;
        }
    }

    Ok(())
}
