//! Cross-module tests for the search model.
//!
//! Most tests drive the model through [`FixedIndex`], whose scores are read
//! straight from the index file, so rankings can be stated exactly.

mod wmd_package;

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::search::{
    read_json, IndexError, IndexStorageError, ModelInfo, ScoreKind, SimilarityIndex, DETECTORS_FILE,
    MAPPINGS_FILE, MODEL_INFO_FILE, PRIMARY_INDEX_FILE, SAMPLE_UTTERANCES_FILE,
    SECONDARY_INDEX_FILE,
};

/// Index returning the same stored scores for every query.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FixedIndex {
    scores: Vec<f32>,
    /// Fail every scoring call
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    kind: ScoreKind,
}

impl SimilarityIndex for FixedIndex {
    fn load(path: &Path) -> Result<Self, IndexError> {
        read_json(path)
            .map_err(|e| IndexError::Storage(IndexStorageError::InvalidFormat(e.to_string())))
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn score_kind(&self) -> ScoreKind {
        self.kind
    }

    fn score(&self, _tokens: &[String], deadline: Option<Instant>) -> Result<Vec<f32>, IndexError> {
        if self.fail {
            return Err(IndexError::NoKnownTokens);
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(IndexError::DeadlineExceeded);
        }
        Ok(self.scores.clone())
    }
}

/// A model package in a temp directory.
pub(crate) struct Package {
    dir: tempfile::TempDir,
}

impl Package {
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// A complete package of fixed-score indices.
    ///
    /// Detectors are named `d0`, `d1`, ...; one per primary score when
    /// `detector_count` is `None`.
    pub fn fixed(
        primary: &[f32],
        secondary: &[f32],
        utterances: &[&str],
        info: ModelInfo,
        detector_count: Option<usize>,
    ) -> Self {
        let package = Self::empty();

        package.write_json(PRIMARY_INDEX_FILE, &json!({ "scores": primary }));
        package.write_json(SECONDARY_INDEX_FILE, &json!({ "scores": secondary, "kind": "distance" }));
        package.write_json(MODEL_INFO_FILE, &info);

        let detectors: Vec<_> = (0..detector_count.unwrap_or(primary.len()))
            .map(|i| json!({ "id": format!("d{i}"), "resourceFilter": {}, "metadata": "", "utterances": [] }))
            .collect();
        package.write_json(DETECTORS_FILE, &detectors);

        let utterances: Vec<_> = utterances.iter().map(|t| json!({ "text": t })).collect();
        package.write_json(SAMPLE_UTTERANCES_FILE, &utterances);

        package
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_json(&self, name: &str, value: &impl Serialize) {
        std::fs::write(self.path().join(name), serde_json::to_vec(value).unwrap()).unwrap();
    }

    pub fn write_raw(&self, name: &str, content: &str) {
        std::fs::write(self.path().join(name), content).unwrap();
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path().join(name)).unwrap();
    }

    pub fn write_mappings(&self, ranges: &[(usize, usize, &str)]) {
        let ranges: Vec<_> = ranges
            .iter()
            .map(|(start, end, id)| json!({ "startindex": start, "endindex": end, "id": id }))
            .collect();
        self.write_json(MAPPINGS_FILE, &ranges);
    }
}

pub(crate) fn split_info() -> ModelInfo {
    ModelInfo {
        text_ngrams: 1,
        detector_content_split: true,
    }
}

pub(crate) fn unsplit_info() -> ModelInfo {
    ModelInfo {
        text_ngrams: 1,
        detector_content_split: false,
    }
}
