//! JSON reference data shipped in a model package.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors reading a catalog artifact.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse json from {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Model configuration from `ModelInfo.json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Largest n-gram size used when tokenizing queries
    #[serde(default, rename = "textNGrams")]
    pub text_ngrams: usize,

    /// Whether each detector's content is spread over several indexed documents
    #[serde(default, rename = "detectorContentSplitted")]
    pub detector_content_split: bool,
}

impl ModelInfo {
    /// Read the manifest, falling back to defaults when it is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        match read_json(path) {
            Ok(info) => info,
            Err(e) => {
                log::warn!("model info unreadable, using defaults: {e}");
                Self::default()
            }
        }
    }
}

/// A detector as written by the detectors fetcher.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorRecord {
    pub id: String,

    #[serde(default)]
    pub resource_filter: Value,

    #[serde(default)]
    pub metadata: Value,

    #[serde(default)]
    pub utterances: Vec<String>,

    /// Fields this crate does not interpret, kept for round-tripping
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Inclusive range of primary-index positions belonging to one detector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    #[serde(rename = "startindex")]
    pub start: usize,

    #[serde(rename = "endindex")]
    pub end: usize,

    #[serde(rename = "id")]
    pub detector_id: String,
}

impl IndexRange {
    pub fn contains(&self, position: usize) -> bool {
        self.start <= position && position <= self.end
    }
}

/// A sample utterance. Its position in `SampleUtterances.json` is its
/// position in the secondary index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleUtterance {
    pub text: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Read and parse a JSON artifact.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let bytes = std::fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_slice(&bytes).map_err(|source| CatalogError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_info_keys() {
        let info: ModelInfo =
            serde_json::from_str(r#"{"textNGrams": 2, "detectorContentSplitted": true}"#).unwrap();
        assert_eq!(info.text_ngrams, 2);
        assert!(info.detector_content_split);
    }

    #[test]
    fn test_model_info_missing_fields_default() {
        let info: ModelInfo = serde_json::from_str("{}").unwrap();
        assert_eq!(info, ModelInfo::default());
    }

    #[test]
    fn test_model_info_malformed_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ModelInfo.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert_eq!(ModelInfo::load_or_default(&path), ModelInfo::default());
        assert_eq!(
            ModelInfo::load_or_default(&dir.path().join("absent.json")),
            ModelInfo::default()
        );
    }

    #[test]
    fn test_detector_record_keeps_unknown_fields() {
        let json = r#"{"id": "cpu", "resourceFilter": {"ResourceType": 1}, "metadata": "", "utterances": ["high cpu"], "name": "CPU Usage"}"#;
        let record: DetectorRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, "cpu");
        assert_eq!(record.utterances, vec!["high cpu"]);
        assert_eq!(record.extra.get("name"), Some(&Value::from("CPU Usage")));
    }

    #[test]
    fn test_index_range_inclusive() {
        let range: IndexRange =
            serde_json::from_str(r#"{"startindex": 5, "endindex": 9, "id": "D2"}"#).unwrap();
        assert!(!range.contains(4));
        assert!(range.contains(5));
        assert!(range.contains(9));
        assert!(!range.contains(10));
    }

    #[test]
    fn test_sample_utterance_round_trip_extra() {
        let json = r#"{"text": "app is slow", "links": ["a"]}"#;
        let utterance: SampleUtterance = serde_json::from_str(json).unwrap();
        assert_eq!(utterance.text, "app is slow");

        let back = serde_json::to_value(&utterance).unwrap();
        assert_eq!(back["links"][0], "a");
    }

    #[test]
    fn test_read_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Detectors.json");
        std::fs::write(&path, "[{").unwrap();

        let err = read_json::<Vec<DetectorRecord>>(&path).unwrap_err();
        assert!(err.to_string().contains("Detectors.json"));
    }
}
