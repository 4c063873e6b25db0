//! Semantic search over diagnostic detectors and their sample utterances.
//!
//! The [`search::SearchModel`] answers two kinds of queries against a model
//! package on disk: which detectors match a free-text query, and which sample
//! utterances match within a detector's context. The [`fetcher`] produces the
//! package's `Detectors.json` from the internal detectors API.

pub mod config;
pub mod fetcher;
pub mod search;
pub mod storage;

#[cfg(test)]
mod tests;
