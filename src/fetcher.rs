//! Detectors fetcher.
//!
//! Pulls the detector list from the internal API, keeps detectors belonging
//! to one product, lifts sample utterances out of each detector's metadata
//! and writes the result to `Detectors.json` in a model package directory.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::config::{FetcherConfig, ProductRule};
use crate::search::{DetectorRecord, DETECTORS_FILE};
use crate::storage::BackendLocal;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("reqwest error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("detector {id} has malformed metadata: {source}")]
    Metadata {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A detector as served by the internal API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetector {
    id: String,

    #[serde(default)]
    resource_filter: Value,

    #[serde(default)]
    metadata: Option<String>,

    #[serde(flatten)]
    extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorMetadata {
    #[serde(default)]
    utterances: Vec<String>,
}

pub struct DetectorsFetcher {
    config: FetcherConfig,
    client: reqwest::blocking::Client,
}

impl DetectorsFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch detectors for `product_id` and write them to `data_path`.
    ///
    /// Returns the number of detectors kept. Writing is best-effort: a failed
    /// write is logged and does not fail the fetch.
    pub fn fetch_detectors(&self, product_id: &str, data_path: &Path) -> Result<usize, FetchError> {
        let url = self.config.detectors_url();
        log::debug!("fetching detectors url={url}");

        let content: Vec<RawDetector> = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?
            .error_for_status()?
            .json()?;

        if self.config.products.is_empty() {
            log::warn!("no product rules configured, no detector will match product={product_id}");
        }

        let fetched = content.len();
        let detectors = select_detectors(content, product_id, &self.config.products)?;

        log::info!(
            "detectors fetched product={product_id} fetched={fetched} kept={}",
            detectors.len()
        );

        if fetched > 0 {
            write_detectors(data_path, &detectors);
        }

        Ok(detectors.len())
    }
}

/// Product ids a resource filter belongs to.
pub fn product_ids<'a>(resource_filter: &Value, rules: &'a [ProductRule]) -> Vec<&'a str> {
    let resource_type = filter_field(resource_filter, "resourceType");
    let app_type = filter_field(resource_filter, "appType");

    rules
        .iter()
        .filter(|rule| resource_type == Some(rule.resource_type))
        .filter(|rule| match rule.app_type {
            Some(flags) => app_type.is_some_and(|t| t & flags != 0),
            None => true,
        })
        .map(|rule| rule.product_id.as_str())
        .collect()
}

/// Read an integer field, accepting camelCase or PascalCase keys.
fn filter_field(filter: &Value, key: &str) -> Option<u64> {
    let mut pascal = key.to_string();
    pascal[..1].make_ascii_uppercase();

    filter
        .get(key)
        .or_else(|| filter.get(&pascal))
        .and_then(Value::as_u64)
}

fn select_detectors(
    content: Vec<RawDetector>,
    product_id: &str,
    rules: &[ProductRule],
) -> Result<Vec<DetectorRecord>, FetchError> {
    content
        .into_iter()
        .filter(|detector| product_ids(&detector.resource_filter, rules).contains(&product_id))
        .map(|detector| {
            let utterances = match detector.metadata.as_deref() {
                Some(md) if !md.is_empty() => {
                    serde_json::from_str::<DetectorMetadata>(md)
                        .map_err(|source| FetchError::Metadata {
                            id: detector.id.clone(),
                            source,
                        })?
                        .utterances
                }
                _ => Vec::new(),
            };

            Ok(DetectorRecord {
                id: detector.id,
                resource_filter: detector.resource_filter,
                metadata: detector.metadata.map(Value::String).unwrap_or(Value::Null),
                utterances,
                extra: detector.extra,
            })
        })
        .collect()
}

fn write_detectors(data_path: &Path, detectors: &[DetectorRecord]) {
    let write = || -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(detectors)?;
        BackendLocal::new(data_path)?.write(DETECTORS_FILE, json.as_bytes())?;
        Ok(())
    };

    if let Err(e) = write() {
        log::error!(
            "failed to write detectors path={} err={e}",
            data_path.join(DETECTORS_FILE).display()
        );
    }
}
