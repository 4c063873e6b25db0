use std::path::{Path, PathBuf};
use std::time::Duration;

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::storage::BackendLocal;

const CONFIG_FILE: &str = "config.yaml";

/// Port of the internal API serving the detector list
const DEFAULT_INTERNAL_API_PORT: u16 = 2223;
/// Default HTTP timeout for the detectors fetcher
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config is not valid utf8")]
    NotUtf8,

    #[error("couldnt find home dir")]
    NoHomeDir,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Maps a detector resource filter to a product id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRule {
    pub product_id: String,

    /// `ResourceType` the filter must have
    pub resource_type: u64,

    /// `AppType` bit flags, at least one of which the filter must set
    #[serde(default)]
    pub app_type: Option<u64>,
}

/// Configuration for the detectors fetcher
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Detector list endpoint; built from `internal_api_port` when unset
    #[serde(default)]
    pub detectors_url: Option<String>,

    #[serde(default = "default_internal_api_port")]
    pub internal_api_port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub products: Vec<ProductRule>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            detectors_url: None,
            internal_api_port: DEFAULT_INTERNAL_API_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            products: Vec::new(),
        }
    }
}

impl FetcherConfig {
    pub fn detectors_url(&self) -> String {
        self.detectors_url.clone().unwrap_or_else(|| {
            format!(
                "http://localhost:{}/internal/detectors",
                self.internal_api_port
            )
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_internal_api_port() -> u16 {
    DEFAULT_INTERNAL_API_PORT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Model package directory; `<base>/model` when unset
    #[serde(default)]
    pub model_package: Option<PathBuf>,

    /// Per-query scoring deadline in milliseconds, 0 disables it
    #[serde(default)]
    pub query_timeout_ms: u64,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.fetcher.detectors_url {
            url::Url::parse(url).map_err(|e| {
                ConfigError::Invalid(format!("fetcher.detectors_url '{url}' is not a url: {e}"))
            })?;
        }

        if self.fetcher.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetcher.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (idx, rule) in self.fetcher.products.iter().enumerate() {
            if rule.product_id.trim().is_empty() {
                let idx = idx + 1;
                return Err(ConfigError::Invalid(format!(
                    "fetcher.products rule #{idx} has an empty product_id"
                )));
            }
        }

        Ok(())
    }

    /// Base directory: `$DETECTOR_SEARCH_BASE_PATH` or `~/.local/share/detector-search`.
    pub fn default_base_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var("DETECTOR_SEARCH_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .map_err(|_| ConfigError::NoHomeDir)?
            .ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".local/share/detector-search"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&Self::default_base_path()?)
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let store = BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str =
            String::from_utf8(store.read(CONFIG_FILE)?).map_err(|_| ConfigError::NotUtf8)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn model_package(&self) -> PathBuf {
        self.model_package
            .clone()
            .unwrap_or_else(|| self.base_path.join("model"))
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}
