//! Query results as returned to callers.

use serde::{Deserialize, Serialize};

use crate::search::catalog::SampleUtterance;

/// Maximum number of matches a query returns.
pub const TOP_K: usize = 10;

/// One ranked match. Scores are rendered as strings for transport stability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoredMatch {
    #[serde(rename_all = "camelCase")]
    Detector { detector_id: String, score: String },

    #[serde(rename_all = "camelCase")]
    Utterance {
        sample_utterance: SampleUtterance,
        score: String,
    },
}

impl ScoredMatch {
    pub fn detector(detector_id: impl Into<String>, score: f32) -> Self {
        Self::Detector {
            detector_id: detector_id.into(),
            score: format_score(score),
        }
    }

    pub fn utterance(sample_utterance: SampleUtterance, score: f32) -> Self {
        Self::Utterance {
            sample_utterance,
            score: format_score(score),
        }
    }

    pub fn detector_id(&self) -> Option<&str> {
        match self {
            Self::Detector { detector_id, .. } => Some(detector_id),
            Self::Utterance { .. } => None,
        }
    }

    pub fn sample_utterance(&self) -> Option<&SampleUtterance> {
        match self {
            Self::Utterance {
                sample_utterance, ..
            } => Some(sample_utterance),
            Self::Detector { .. } => None,
        }
    }

    pub fn score(&self) -> &str {
        match self {
            Self::Detector { score, .. } | Self::Utterance { score, .. } => score,
        }
    }
}

/// Shortest decimal that round-trips the score.
pub fn format_score(score: f32) -> String {
    score.to_string()
}

/// Result of a query.
///
/// A failed detector query carries `Some(vec![])` plus an `exception`
/// description; a failed utterance query carries `None` and no description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,

    pub results: Option<Vec<ScoredMatch>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl SearchResult {
    pub fn found(query: &str, results: Vec<ScoredMatch>) -> Self {
        Self {
            query: query.to_string(),
            results: Some(results),
            exception: None,
        }
    }

    /// A detector query that failed: empty matches and the failure text.
    pub fn detector_failure(query: &str, error: impl std::fmt::Display) -> Self {
        Self {
            query: query.to_string(),
            results: Some(Vec::new()),
            exception: Some(error.to_string()),
        }
    }

    /// An utterance query that failed: no match list at all.
    pub fn utterance_failure(query: &str) -> Self {
        Self {
            query: query.to_string(),
            results: None,
            exception: None,
        }
    }

    /// Matches, treating a missing list as empty.
    pub fn matches(&self) -> &[ScoredMatch] {
        self.results.as_deref().unwrap_or_default()
    }
}
