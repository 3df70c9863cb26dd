use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codequal")]
#[command(author, version, about = "Codebase quality analysis with duplicate detection and semantic retrieval")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .codequal/ with a default configuration
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Analyze a source tree and print the codebase report
    Analyze {
        /// Root of the tree to analyze (defaults to the current directory)
        path: Option<PathBuf>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Do not ingest analyzed files into the retrieval index
        #[arg(long)]
        no_index: bool,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ask the retrieval index about the analyzed code
    Query {
        /// Natural-language or code query
        text: String,

        /// Maximum number of results to return
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show retrieval index statistics and metrics
    Stats {
        /// Output in Prometheus format
        #[arg(long)]
        prometheus: bool,
    },

    /// Remove every fragment from the retrieval index
    Clear,
}
