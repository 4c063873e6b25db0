use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Model package directory (overrides config.yaml)
    #[clap(long, global = true)]
    pub package: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Find detectors matching a query
    QueryDetectors {
        /// Free-text query
        text: String,
    },

    /// Find sample utterances matching a detector description
    QueryUtterances {
        /// Detector description
        text: String,

        /// Utterance the detector already has; repeat for several
        #[clap(short, long = "existing")]
        existing: Vec<String>,
    },

    /// Fetch detectors for a product into Detectors.json
    FetchDetectors {
        /// Product id to keep
        #[clap(long)]
        product_id: String,

        /// Directory to write Detectors.json into (defaults to the model package)
        #[clap(long)]
        data_path: Option<PathBuf>,
    },
}
