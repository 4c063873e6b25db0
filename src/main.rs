use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use detector_search::config::Config;
use detector_search::fetcher::DetectorsFetcher;
use detector_search::search::{QueryOptions, SearchModel, SearchResult};

mod cli;

fn print_result(result: Option<SearchResult>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config = Config::load().context("failed to load config")?;
    let package = args.package.unwrap_or_else(|| config.model_package());

    let options = config
        .query_timeout()
        .map(QueryOptions::with_timeout)
        .unwrap_or_default();

    match args.command {
        cli::Command::QueryDetectors { text } => {
            let model: SearchModel = SearchModel::open(&package)?;
            tracing::debug!(query = %text, "querying detectors");
            print_result(model.query_detectors_with(&text, &options))
        }

        cli::Command::QueryUtterances { text, existing } => {
            let model: SearchModel = SearchModel::open(&package)?;
            tracing::debug!(query = %text, existing = existing.len(), "querying utterances");
            print_result(model.query_utterances_with(&text, &existing, &options))
        }

        cli::Command::FetchDetectors {
            product_id,
            data_path,
        } => {
            let data_path = data_path.unwrap_or(package);
            let fetcher = DetectorsFetcher::new(config.fetcher.clone())?;
            let kept = fetcher.fetch_detectors(&product_id, &data_path)?;
            println!("{kept} detectors fetched");
            Ok(())
        }
    }
}
