//! End-to-end queries against a package built with the relaxed WMD index.

use std::time::{Duration, Instant};

use serde_json::json;

use super::{unsplit_info, Package};
use crate::search::{
    ModelInfo, QueryOptions, ScoreKind, SearchModel, SearchResult, WmdIndex, DETECTORS_FILE,
    MODEL_INFO_FILE, PRIMARY_INDEX_FILE, SAMPLE_UTTERANCES_FILE, SECONDARY_INDEX_FILE,
};

fn vocabulary(kind: ScoreKind) -> WmdIndex {
    let mut index = WmdIndex::with_kind(3, kind);
    for (token, vector) in [
        ("cpu", [1.0, 0.0, 0.0]),
        ("processor", [0.95, 0.05, 0.0]),
        ("high", [0.7, 0.3, 0.0]),
        ("memory", [0.0, 1.0, 0.0]),
        ("leak", [0.1, 0.9, 0.0]),
        ("ram", [0.05, 0.95, 0.0]),
        ("disk", [0.0, 0.0, 1.0]),
        ("full", [0.0, 0.2, 0.8]),
        ("space", [0.0, 0.1, 0.9]),
    ] {
        index.insert_token(token, vector.to_vec()).unwrap();
    }
    index
}

fn build_package(info: ModelInfo) -> Package {
    let package = Package::empty();

    let mut primary = vocabulary(ScoreKind::Similarity);
    primary.push_document(&["high", "cpu"]);
    primary.push_document(&["memory", "leak"]);
    primary.push_document(&["disk", "full"]);
    primary.save(&package.path().join(PRIMARY_INDEX_FILE)).unwrap();

    let mut secondary = vocabulary(ScoreKind::Distance);
    secondary.push_document(&["processor", "high"]);
    secondary.push_document(&["ram", "leak"]);
    secondary.push_document(&["disk", "space"]);
    secondary.push_document(&["cpu"]);
    secondary.save(&package.path().join(SECONDARY_INDEX_FILE)).unwrap();

    package.write_json(
        DETECTORS_FILE,
        &json!([
            {"id": "highcpu", "resourceFilter": {}, "metadata": "", "utterances": []},
            {"id": "memoryleak", "resourceFilter": {}, "metadata": "", "utterances": []},
            {"id": "diskspace", "resourceFilter": {}, "metadata": "", "utterances": []}
        ]),
    );
    package.write_json(
        SAMPLE_UTTERANCES_FILE,
        &json!([
            {"text": "Processor high"},
            {"text": "RAM leak"},
            {"text": "disk space"},
            {"text": "cpu"}
        ]),
    );
    package.write_json(MODEL_INFO_FILE, &info);

    package
}

#[test]
fn detector_query_finds_closest_detector() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let result = model.query_detectors("Memory leak in my app").unwrap();
    let ids: Vec<_> = result
        .matches()
        .iter()
        .filter_map(|m| m.detector_id())
        .collect();

    assert_eq!(ids.len(), 3);
    assert_eq!(ids[0], "memoryleak");
    assert_eq!(result.matches()[0].score(), "1");
}

#[test]
fn bigram_model_still_scores_unigrams() {
    let package = build_package(ModelInfo {
        text_ngrams: 2,
        detector_content_split: false,
    });
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let result = model.query_detectors("disk full").unwrap();
    assert_eq!(result.matches()[0].detector_id(), Some("diskspace"));
}

#[test]
fn query_without_known_words_fails_in_band() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let result = model.query_detectors("quantum entanglement").unwrap();
    assert_eq!(result.results, Some(vec![]));
    assert!(result.exception.is_some());

    let existing = vec!["entropy".to_string(), "flux".to_string()];
    let utterances = model
        .query_utterances("quantum entanglement", &existing)
        .unwrap();
    assert_eq!(utterances.query, "quantum entanglemententropy flux");
    assert!(utterances.results.is_none());
}

fn utterance_texts(result: &SearchResult) -> Vec<&str> {
    result
        .matches()
        .iter()
        .filter_map(|m| m.sample_utterance())
        .map(|u| u.text.as_str())
        .collect()
}

#[test]
fn utterance_query_ranks_closest_first() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let result = model.query_utterances("cpu", &[]).unwrap();
    assert_eq!(
        utterance_texts(&result),
        vec!["cpu", "Processor high", "RAM leak", "disk space"]
    );
    assert_eq!(result.matches()[0].score(), "0");
}

#[test]
fn utterance_query_filters_existing_and_echoes_scored_text() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let existing = vec!["disk space".to_string()];
    let result = model.query_utterances("high cpu ", &existing).unwrap();

    assert_eq!(result.query, "high cpu disk space");
    assert_eq!(
        utterance_texts(&result),
        vec!["Processor high", "cpu", "RAM leak"]
    );

    let scores: Vec<f32> = result
        .matches()
        .iter()
        .map(|m| m.score().parse().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn existing_utterances_join_the_query_without_separator() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    // "cpudisk" is not in the vocabulary, leaving only "space" to score
    let existing = vec!["disk space".to_string()];
    let result = model.query_utterances("cpu", &existing).unwrap();
    let space_only = model.query_utterances("space", &existing).unwrap();

    assert_eq!(result.query, "cpudisk space");
    assert_eq!(utterance_texts(&result), utterance_texts(&space_only));
}

#[test]
fn expired_deadline_fails_in_band() {
    let package = build_package(unsplit_info());
    let model: SearchModel = SearchModel::open(package.path()).unwrap();

    let options = QueryOptions {
        deadline: Instant::now().checked_sub(Duration::from_millis(1)),
    };

    let detectors = model.query_detectors_with("cpu", &options).unwrap();
    assert!(detectors.exception.unwrap().contains("deadline"));

    let utterances = model.query_utterances_with("cpu", &[], &options).unwrap();
    assert!(utterances.results.is_none());

    let relaxed = QueryOptions::with_timeout(Duration::from_secs(60));
    let detectors = model.query_detectors_with("cpu", &relaxed).unwrap();
    assert_eq!(detectors.matches()[0].detector_id(), Some("highcpu"));
}

#[test]
fn corrupt_index_fails_construction() {
    let package = build_package(unsplit_info());
    package.write_raw(SECONDARY_INDEX_FILE, "WMDX garbage");

    let result: Result<SearchModel, _> = SearchModel::open(package.path());
    assert!(result.is_err());
}
