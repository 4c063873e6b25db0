//! Search model over a detector package.
//!
//! Owns the detector-level index for its whole lifetime and loads the
//! utterance-level index per query:
//! - Construction verifies every mandatory artifact and fails fast
//! - Queries never fail; errors are reported inside the [`SearchResult`]
//! - The utterance index is owned by the query that loaded it, so queries
//!   can run concurrently on a shared model

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

use crate::search::catalog::{
    read_json, CatalogError, DetectorRecord, IndexRange, ModelInfo, SampleUtterance,
};
use crate::search::index::{IndexError, ScoreKind, SimilarityIndex, WmdIndex};
use crate::search::package::PackageFiles;
use crate::search::result::{ScoredMatch, SearchResult, TOP_K};
use crate::search::tokenize;

/// Errors that stop a model from being constructed.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model package verification failed, missing: {}", display_paths(.missing))]
    VerificationFailed { missing: Vec<PathBuf> },

    #[error("failed to load {}: {reason}", .path.display())]
    LoadFailed { path: PathBuf, reason: String },
}

impl ModelError {
    fn load_failed(path: &Path, reason: impl std::fmt::Display) -> Self {
        Self::LoadFailed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<CatalogError> for ModelError {
    fn from(e: CatalogError) -> Self {
        match &e {
            CatalogError::Io { path, .. } | CatalogError::Json { path, .. } => {
                Self::load_failed(path, &e)
            }
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures inside a single query. Reported in-band, never returned.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0}")]
    Index(#[from] IndexError),

    #[error("failed to load utterance model: {0}")]
    UtteranceModel(String),

    #[error("detector content is split but {} could not be loaded", .0.display())]
    MappingUnavailable(PathBuf),

    #[error("index position {position} is outside the catalog of {len} entries")]
    PositionOutOfRange { position: usize, len: usize },
}

/// Per-query settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    /// Give up scoring once this instant has passed
    pub deadline: Option<Instant>,
}

impl QueryOptions {
    /// Options whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }
}

/// Utterance index and catalog, alive for one utterance query.
struct UtteranceModel<I> {
    index: I,
    utterances: Vec<SampleUtterance>,
}

impl<I> Drop for UtteranceModel<I> {
    fn drop(&mut self) {
        log::debug!(
            "utterance model released utterances={}",
            self.utterances.len()
        );
    }
}

/// Two-tier search over detectors and their sample utterances.
pub struct SearchModel<I: SimilarityIndex = WmdIndex> {
    files: PackageFiles,
    info: ModelInfo,
    primary: I,
    detectors: Vec<DetectorRecord>,
    /// `None` when content is not split, or when the mappings file is absent
    mappings: Option<Vec<IndexRange>>,
}

impl<I: SimilarityIndex> SearchModel<I> {
    /// Open the model package at `package_dir`.
    ///
    /// Every mandatory artifact must be present and parseable. The utterance
    /// index and catalog are validated here but not kept.
    pub fn open(package_dir: &Path) -> Result<Self, ModelError> {
        let files = PackageFiles::resolve(package_dir);

        let missing = files.missing();
        if !missing.is_empty() {
            return Err(ModelError::VerificationFailed { missing });
        }

        let info = ModelInfo::load_or_default(&files.model_info);

        let primary = I::load(&files.primary_index)
            .map_err(|e| ModelError::load_failed(&files.primary_index, e))?;

        // Validated here, loaded again per utterance query
        let secondary_kind = I::load(&files.secondary_index)
            .map_err(|e| ModelError::load_failed(&files.secondary_index, e))?
            .score_kind();
        // Utterances are ranked lowest-first
        if secondary_kind != ScoreKind::Distance {
            log::warn!(
                "utterance index does not report distances path={} kind={secondary_kind:?}",
                files.secondary_index.display()
            );
        }

        let detectors: Vec<DetectorRecord> = read_json(&files.detectors)?;

        let mappings = if info.detector_content_split {
            if files.mappings.is_file() {
                Some(read_json::<Vec<IndexRange>>(&files.mappings)?)
            } else {
                log::error!(
                    "detector content is split but mappings are missing path={}",
                    files.mappings.display()
                );
                None
            }
        } else {
            None
        };

        validate_artifact::<Vec<SampleUtterance>>(&files.sample_utterances)?;

        if !info.detector_content_split && primary.len() != detectors.len() {
            log::warn!(
                "primary index and detector catalog disagree documents={} detectors={}",
                primary.len(),
                detectors.len()
            );
        }

        log::info!(
            "search model loaded package={} detectors={} documents={} ngrams={} split={}",
            package_dir.display(),
            detectors.len(),
            primary.len(),
            info.text_ngrams,
            info.detector_content_split
        );

        Ok(Self {
            files,
            info,
            primary,
            detectors,
            mappings,
        })
    }

    pub fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn detectors(&self) -> &[DetectorRecord] {
        &self.detectors
    }

    pub fn mappings(&self) -> Option<&[IndexRange]> {
        self.mappings.as_deref()
    }

    /// Detector owning primary-index `position`, first matching range wins.
    pub fn detector_for_index(&self, position: usize) -> Option<&str> {
        self.mappings
            .as_deref()?
            .iter()
            .find(|range| range.contains(position))
            .map(|range| range.detector_id.as_str())
    }

    /// Find the detectors closest to `query`. `None` for an empty query.
    pub fn query_detectors(&self, query: &str) -> Option<SearchResult> {
        self.query_detectors_with(query, &QueryOptions::default())
    }

    pub fn query_detectors_with(&self, query: &str, options: &QueryOptions) -> Option<SearchResult> {
        if query.is_empty() {
            return None;
        }

        let result = match self.rank_detectors(query, options) {
            Ok(matches) => SearchResult::found(query, matches),
            Err(e) => {
                log::warn!("detector query failed query={query:?} err={e}");
                SearchResult::detector_failure(query, e)
            }
        };

        Some(result)
    }

    fn rank_detectors(
        &self,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ScoredMatch>, QueryError> {
        let tokens = tokenize::ngrams(query, self.info.text_ngrams);
        let scores = self.primary.score(&tokens, options.deadline)?;

        let mut ranked = rank_positions(scores, SortOrder::Descending);
        ranked.truncate(TOP_K);

        if !self.info.detector_content_split {
            return ranked
                .into_iter()
                .map(|(position, score)| {
                    let detector = self.detectors.get(position).ok_or(
                        QueryError::PositionOutOfRange {
                            position,
                            len: self.detectors.len(),
                        },
                    )?;
                    Ok(ScoredMatch::detector(&detector.id, score))
                })
                .collect();
        }

        if self.mappings.is_none() {
            return Err(QueryError::MappingUnavailable(self.files.mappings.clone()));
        }

        let mut seen = HashSet::new();
        let matches = ranked
            .into_iter()
            .filter_map(|(position, score)| {
                let detector = self.detector_for_index(position)?;
                seen.insert(detector)
                    .then(|| ScoredMatch::detector(detector, score))
            })
            .collect();

        Ok(matches)
    }

    /// Find sample utterances closest to `query`, skipping any the caller
    /// already has. `None` for an empty query.
    ///
    /// The existing utterances are appended to `query`, space-joined and with
    /// no separator in front; the result echoes that combined text.
    pub fn query_utterances(&self, query: &str, existing: &[String]) -> Option<SearchResult> {
        self.query_utterances_with(query, existing, &QueryOptions::default())
    }

    pub fn query_utterances_with(
        &self,
        query: &str,
        existing: &[String],
        options: &QueryOptions,
    ) -> Option<SearchResult> {
        if query.is_empty() {
            return None;
        }

        // Existing utterances bias scoring away from phrasings already shown
        let text = format!("{query}{}", existing.join(" "));

        let result = match self.rank_utterances(&text, existing, options) {
            Ok(matches) => SearchResult::found(&text, matches),
            Err(e) => {
                log::warn!("utterance query failed query={text:?} err={e}");
                SearchResult::utterance_failure(&text)
            }
        };

        Some(result)
    }

    fn rank_utterances(
        &self,
        text: &str,
        existing: &[String],
        options: &QueryOptions,
    ) -> Result<Vec<ScoredMatch>, QueryError> {
        let model = self.load_utterance_model()?;

        let tokens = tokenize::ngrams(text, self.info.text_ngrams);
        let scores = model.index.score(&tokens, options.deadline)?;

        let seen: HashSet<&str> = existing.iter().map(String::as_str).collect();
        let mut matches = Vec::with_capacity(TOP_K);

        // Every position must resolve to a catalog entry, even past the top K
        for (position, score) in rank_positions(scores, SortOrder::Ascending) {
            let utterance = model.utterances.get(position).ok_or(QueryError::PositionOutOfRange {
                position,
                len: model.utterances.len(),
            })?;

            if seen.contains(utterance.text.to_lowercase().as_str()) {
                continue;
            }

            if matches.len() < TOP_K {
                matches.push(ScoredMatch::utterance(utterance.clone(), score));
            }
        }

        Ok(matches)
    }

    fn load_utterance_model(&self) -> Result<UtteranceModel<I>, QueryError> {
        let index = I::load(&self.files.secondary_index).map_err(|e| {
            QueryError::UtteranceModel(format!("{}: {e}", self.files.secondary_index.display()))
        })?;

        let utterances: Vec<SampleUtterance> = read_json(&self.files.sample_utterances)
            .map_err(|e| QueryError::UtteranceModel(e.to_string()))?;

        log::debug!(
            "utterance model loaded documents={} utterances={}",
            index.len(),
            utterances.len()
        );

        Ok(UtteranceModel { index, utterances })
    }
}

/// Parse an artifact and discard it, failing construction if it is unreadable.
pub fn validate_artifact<T: DeserializeOwned>(path: &Path) -> Result<(), ModelError> {
    read_json::<T>(path)?;
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SortOrder {
    Ascending,
    Descending,
}

/// Pair every score with its position and sort stably, so ties keep
/// position order.
fn rank_positions(scores: Vec<f32>, order: SortOrder) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
    ranked.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal);
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
    ranked
}
