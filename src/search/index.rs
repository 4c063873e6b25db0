//! Similarity indices over tokenized documents.
//!
//! [`SimilarityIndex`] is the seam the search model is written against: given
//! a tokenized query, score it against every indexed document. [`WmdIndex`]
//! is the built-in implementation, a relaxed word-mover's-distance index over
//! per-token embeddings.
//!
//! The two tiers read scores differently: the detector index is ranked
//! highest-first, the utterance index lowest-first. [`ScoreKind`] records
//! which convention an index follows.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::search::storage::{IndexStorage, IndexStorageError};

/// A pre-built index that scores a tokenized query against every document.
pub trait SimilarityIndex: Sized {
    /// Load the index from a file produced by the index build process.
    fn load(path: &Path) -> Result<Self, IndexError>;

    /// Number of indexed documents.
    fn len(&self) -> usize;

    /// Whether a higher or a lower score means a closer document.
    fn score_kind(&self) -> ScoreKind;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Score `tokens` against every document.
    ///
    /// Returns exactly `len()` scores, position `i` belonging to document `i`.
    /// Implementations should give up with [`IndexError::DeadlineExceeded`]
    /// once `deadline` has passed.
    fn score(&self, tokens: &[String], deadline: Option<Instant>) -> Result<Vec<f32>, IndexError>;
}

/// Score convention of an index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreKind {
    /// Higher is closer
    #[default]
    Similarity,
    /// Lower is closer
    Distance,
}

impl ScoreKind {
    pub(crate) fn to_byte(self) -> u8 {
        match self {
            Self::Similarity => 0,
            Self::Distance => 1,
        }
    }

    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Similarity),
            1 => Some(Self::Distance),
            _ => None,
        }
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Document references unknown token id {0}")]
    UnknownTokenId(u32),

    #[error("None of the query tokens are in the index vocabulary")]
    NoKnownTokens,

    #[error("Scoring deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Storage(#[from] IndexStorageError),
}

/// Relaxed word-mover's-distance index.
///
/// Each document is a bag of vocabulary token ids; each vocabulary token has
/// an embedding vector. With [`ScoreKind::Similarity`] scores are
/// `1 / (1 + d)` where `d` is the relaxed WMD between query and document; with
/// [`ScoreKind::Distance`] they are `d` itself.
#[derive(Debug, Clone)]
pub struct WmdIndex {
    dimensions: usize,
    kind: ScoreKind,
    /// Token -> id into `vectors`
    vocabulary: HashMap<String, u32>,
    /// Token id -> (token, embedding)
    vectors: Vec<(String, Vec<f32>)>,
    /// Document position -> token ids
    documents: Vec<Vec<u32>>,
}

impl WmdIndex {
    /// Create a new empty similarity index with the given embedding dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self::with_kind(dimensions, ScoreKind::Similarity)
    }

    pub fn with_kind(dimensions: usize, kind: ScoreKind) -> Self {
        Self {
            dimensions,
            kind,
            vocabulary: HashMap::new(),
            vectors: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn vocabulary_len(&self) -> usize {
        self.vectors.len()
    }

    /// Insert or replace a vocabulary token, returning its id.
    pub fn insert_token(&mut self, token: &str, embedding: Vec<f32>) -> Result<u32, IndexError> {
        if embedding.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: embedding.len(),
            });
        }

        if let Some(&id) = self.vocabulary.get(token) {
            self.vectors[id as usize].1 = embedding;
            return Ok(id);
        }

        let id = self.vectors.len() as u32;
        self.vectors.push((token.to_string(), embedding));
        self.vocabulary.insert(token.to_string(), id);
        Ok(id)
    }

    /// Append a document made of vocabulary tokens, returning its position.
    ///
    /// Tokens missing from the vocabulary are dropped, the same way queries
    /// are treated.
    pub fn push_document<S: AsRef<str>>(&mut self, tokens: &[S]) -> usize {
        let ids = self.token_ids(tokens);
        self.documents.push(ids);
        self.documents.len() - 1
    }

    /// Append a document of raw token ids (used when loading from storage).
    pub(crate) fn push_document_ids(&mut self, ids: Vec<u32>) -> Result<usize, IndexError> {
        if let Some(&bad) = ids.iter().find(|&&id| id as usize >= self.vectors.len()) {
            return Err(IndexError::UnknownTokenId(bad));
        }
        self.documents.push(ids);
        Ok(self.documents.len() - 1)
    }

    pub(crate) fn tokens(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.vectors.iter().map(|(t, v)| (t.as_str(), v.as_slice()))
    }

    pub(crate) fn documents(&self) -> &[Vec<u32>] {
        &self.documents
    }

    fn token_ids<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<u32> {
        tokens
            .iter()
            .filter_map(|t| self.vocabulary.get(t.as_ref()).copied())
            .collect()
    }

    /// Save the index to `path`.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        IndexStorage::new(path.to_path_buf()).save(self)?;
        Ok(())
    }

    /// Relaxed word-mover's distance between two bags of token ids.
    ///
    /// Each side moves every token to its nearest neighbour on the other side;
    /// the larger of the two average costs is the (tighter) lower bound.
    fn relaxed_distance(&self, query: &[u32], document: &[u32]) -> f32 {
        let one_way = |from: &[u32], to: &[u32]| -> f32 {
            let total: f32 = from
                .iter()
                .map(|&a| {
                    to.iter()
                        .map(|&b| self.euclidean(a, b))
                        .fold(f32::INFINITY, f32::min)
                })
                .sum();
            total / from.len() as f32
        };

        one_way(query, document).max(one_way(document, query))
    }

    fn euclidean(&self, a: u32, b: u32) -> f32 {
        if a == b {
            return 0.0;
        }
        let va = &self.vectors[a as usize].1;
        let vb = &self.vectors[b as usize].1;
        va.iter()
            .zip(vb.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }
}

impl SimilarityIndex for WmdIndex {
    fn load(path: &Path) -> Result<Self, IndexError> {
        Ok(IndexStorage::new(path.to_path_buf()).load()?)
    }

    fn len(&self) -> usize {
        self.documents.len()
    }

    fn score_kind(&self) -> ScoreKind {
        self.kind
    }

    fn score(&self, tokens: &[String], deadline: Option<Instant>) -> Result<Vec<f32>, IndexError> {
        let query = self.token_ids(tokens);
        if query.is_empty() {
            return Err(IndexError::NoKnownTokens);
        }

        self.documents
            .par_iter()
            .map(|document| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(IndexError::DeadlineExceeded);
                }
                if document.is_empty() {
                    return Ok(match self.kind {
                        ScoreKind::Similarity => 0.0,
                        ScoreKind::Distance => f32::INFINITY,
                    });
                }
                let distance = self.relaxed_distance(&query, document);
                Ok(match self.kind {
                    ScoreKind::Similarity => 1.0 / (1.0 + distance),
                    ScoreKind::Distance => distance,
                })
            })
            .collect()
    }
}
