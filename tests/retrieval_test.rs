use std::sync::Arc;

use pcm_dialog::config::MemoryConfig;
use pcm_dialog::memory::MemoryStore;
use pcm_dialog::memory::document::InMemoryDocumentStore;
use pcm_dialog::memory::ledger::Turn;
use pcm_dialog::retrieval::{self, RetrievalSettings};
use pcm_dialog::types::IdentityKey;

fn make_turn(index: usize, query: &str, embedding: Vec<f32>) -> Turn {
    Turn {
        index,
        timestamp: 0,
        context: None,
        triples: "None".into(),
        query: query.into(),
        inner_speech: String::new(),
        output: format!("re: {query}"),
        summary: None,
        embedding: Some(embedding),
        image: None,
    }
}

async fn store_with(turns: Vec<Turn>) -> MemoryStore {
    let mut store = MemoryStore::load(Arc::new(InMemoryDocumentStore::new()), "s", "m")
        .await
        .expect("load");
    let key = IdentityKey::new("h", "u");
    for turn in turns {
        store.append_turn(&key, turn).await.expect("append");
    }
    store
}

#[test]
fn settings_follow_memory_config() {
    let config = MemoryConfig {
        history_calling: false,
        similarity_threshold: 0.5,
        related_k: 2,
        qa_recent_window: 4,
        lq_recent_window: 6,
        ..MemoryConfig::default()
    };
    let settings = RetrievalSettings::from(&config);
    assert!(!settings.history_calling);
    assert_eq!(settings.related_k, 2);
    assert_eq!(settings.qa_recent_window, 4);
    assert_eq!(settings.lq_recent_window, 6);
    assert_eq!(RetrievalSettings::default().lq_recent_window, 3);
}

#[tokio::test]
async fn recency_on_empty_ledger_is_empty_context() {
    let mut store = store_with(vec![]).await;
    let retrieved = retrieval::recency(&mut store, &IdentityKey::new("h", "u"), 3);
    assert!(retrieved.is_empty());
    assert_eq!(retrieved.index, 1);
}

#[tokio::test]
async fn similarity_combines_recent_window_and_related_turns() {
    let mut store = store_with(vec![
        make_turn(1, "the red ball", vec![1.0, 0.0, 0.0]),
        make_turn(2, "weather", vec![0.0, 1.0, 0.0]),
        make_turn(3, "dinner", vec![0.0, 0.0, 1.0]),
    ])
    .await;

    let retrieved = retrieval::similarity(
        &mut store,
        &IdentityKey::new("h", "u"),
        &[1.0, 0.1, 0.0],
        &RetrievalSettings::default(),
    );
    assert_eq!(retrieved.index, 4);
    assert_eq!(retrieved.recent.len(), 1);
    assert_eq!(retrieved.recent[0].query, "dinner");
    let related = retrieved.related.expect("related turn");
    assert_eq!(related.len(), 1);
    assert_eq!(related[0].query, "the red ball");
}

#[tokio::test]
async fn history_calling_off_disables_related_turns() {
    let mut store = store_with(vec![
        make_turn(1, "a", vec![1.0, 0.0]),
        make_turn(2, "b", vec![0.0, 1.0]),
    ])
    .await;
    let settings = RetrievalSettings {
        history_calling: false,
        ..RetrievalSettings::default()
    };
    let retrieved =
        retrieval::similarity(&mut store, &IdentityKey::new("h", "u"), &[1.0, 0.0], &settings);
    assert!(retrieved.related.is_none());
    assert_eq!(retrieved.recent.len(), 1);
}

#[tokio::test]
async fn nothing_above_threshold_means_no_related_turn() {
    let mut store = store_with(vec![
        make_turn(1, "a", vec![1.0, 1.0]),
        make_turn(2, "b", vec![0.0, 1.0]),
    ])
    .await;
    // cos([1,0], [1,1]) ~ 0.707
    let retrieved = retrieval::similarity(
        &mut store,
        &IdentityKey::new("h", "u"),
        &[1.0, 0.0],
        &RetrievalSettings::default(),
    );
    assert!(retrieved.related.is_none());
}
