use pcm_dialog::memory::document::{
    Document, DocumentFormat, DocumentKey, DocumentStore, FileDocumentStore,
    InMemoryDocumentStore,
};
use serde_json::json;
use std::path::PathBuf;

fn tmp_dir(label: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("pcm-dialog-store-{label}-{nanos}"));
    std::fs::create_dir_all(&path).expect("create temp dir");
    path
}

fn ledger_key() -> DocumentKey {
    DocumentKey::new("runs", "sim1gpt-4o-mini.json")
}

#[tokio::test]
async fn in_memory_store_replaces_wholesale() {
    let store = InMemoryDocumentStore::new();
    assert_eq!(store.count().await, 0);
    assert!(store.get(&ledger_key()).await.unwrap().is_none());

    store
        .replace(&ledger_key(), Document::new("sim1", json!({"Bob": {"Alice": []}})))
        .await
        .unwrap();
    store
        .replace(&ledger_key(), Document::new("sim1", json!({"Bob": {}})))
        .await
        .unwrap();

    assert_eq!(store.count().await, 1);
    let doc = store.get(&ledger_key()).await.unwrap().expect("document");
    assert_eq!(doc.data, json!({"Bob": {}}));
}

#[tokio::test]
async fn json_file_store_round_trips_documents() {
    let dir = tmp_dir("json");
    let store = FileDocumentStore::new(&dir, DocumentFormat::Json);
    let document = Document::new("sim1", json!({"Bob": {"Alice": [{"index": 1}]}}));

    store.replace(&ledger_key(), document.clone()).await.unwrap();

    let path = dir.join("runs").join("sim1gpt-4o-mini.json");
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists(), "tmp file renamed away");

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["user_id"], "sim1");
    assert_eq!(raw["data"]["Bob"]["Alice"][0]["index"], 1);

    let loaded = store.get(&ledger_key()).await.unwrap().expect("document");
    assert_eq!(loaded, document);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn msgpack_file_store_round_trips_documents() {
    let dir = tmp_dir("msgpack");
    let store = FileDocumentStore::new(&dir, DocumentFormat::Msgpack);
    let document = Document::new("sim1", json!({"Bob": [{"move": {"x": 1.5}}]}));

    store.replace(&ledger_key(), document.clone()).await.unwrap();
    assert!(dir.join("runs").join("sim1gpt-4o-mini.msgpack").exists());

    let loaded = store.get(&ledger_key()).await.unwrap().expect("document");
    assert_eq!(loaded.data, document.data);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn missing_file_is_none_and_corrupt_file_is_error() {
    let dir = tmp_dir("missing");
    let store = FileDocumentStore::new(&dir, DocumentFormat::Json);
    assert!(store.get(&ledger_key()).await.unwrap().is_none());

    std::fs::create_dir_all(dir.join("runs")).unwrap();
    std::fs::write(dir.join("runs").join("sim1gpt-4o-mini.json"), "{not json").unwrap();
    let err = store.get(&ledger_key()).await.expect_err("corrupt document");
    assert!(err.to_string().contains("invalid document"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn in_memory_store_is_usable_from_blocking_code() {
    let store = InMemoryDocumentStore::new();
    tokio_test::block_on(async {
        store
            .replace(&ledger_key(), Document::new("sim1", json!({})))
            .await
            .unwrap();
    });
    let doc = tokio_test::block_on(store.get(&ledger_key())).unwrap();
    assert_eq!(doc.map(|d| d.user_id).as_deref(), Some("sim1"));
}
