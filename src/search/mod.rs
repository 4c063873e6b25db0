//! Two-tier semantic search over detectors and sample utterances.
//!
//! # Architecture
//!
//! - `tokenize`: n-gram tokenization of query text
//! - `index`: similarity index trait and the built-in relaxed WMD index
//! - `storage`: binary file I/O for `m1.index` / `m2.index`
//! - `catalog`: JSON reference data (detectors, mappings, utterances)
//! - `package`: artifact layout of a model package directory
//! - `model`: the search model answering detector and utterance queries
//! - `result`: result shapes returned to callers

mod catalog;
mod index;
mod model;
mod package;
mod result;
mod storage;
pub mod tokenize;

pub use catalog::{read_json, CatalogError, DetectorRecord, IndexRange, ModelInfo, SampleUtterance};
pub use index::{IndexError, ScoreKind, SimilarityIndex, WmdIndex};
pub use model::{validate_artifact, ModelError, QueryError, QueryOptions, SearchModel};
pub use package::{
    PackageFiles, DETECTORS_FILE, MAPPINGS_FILE, MODEL_INFO_FILE, PRIMARY_INDEX_FILE,
    SAMPLE_UTTERANCES_FILE, SECONDARY_INDEX_FILE,
};
pub use result::{format_score, ScoredMatch, SearchResult, TOP_K};
pub use storage::{IndexStorage, IndexStorageError};
