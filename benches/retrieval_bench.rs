use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pcm_dialog::agent::embedding::HashingEmbedder;
use pcm_dialog::memory::document::{Document, DocumentKey, DocumentStore, InMemoryDocumentStore};
use pcm_dialog::memory::ledger::{Summary, Turn};
use pcm_dialog::memory::similarity::top_k_above_threshold;
use pcm_dialog::memory::{LedgerNames, MemoryStore};
use pcm_dialog::retrieval::{self, RetrievalSettings};
use pcm_dialog::types::IdentityKey;

const DIMENSIONS: usize = 256;

fn build_store(runtime: &tokio::runtime::Runtime, size: usize) -> MemoryStore {
    let embedder = HashingEmbedder::new(DIMENSIONS);
    let turns: Vec<Turn> = (1..=size)
        .map(|i| {
            let query = format!("where did agent {i} leave the object number {}", i % 17);
            Turn {
                index: i,
                timestamp: i as i64,
                context: None,
                triples: "None".into(),
                embedding: Some(embedder.embed_sync(&query)),
                summary: Some(Summary {
                    input: query.clone(),
                    output: format!("answer {i}"),
                }),
                query,
                inner_speech: String::new(),
                output: format!("answer {i}"),
                image: None,
            }
        })
        .collect();

    runtime.block_on(async {
        let documents = Arc::new(InMemoryDocumentStore::new());
        let names = LedgerNames::new("bench", "model");
        let key = DocumentKey::new(&names.collection, &names.conversation);
        let data = serde_json::json!({ "Bob": { "Alice": turns } });
        documents
            .replace(&key, Document::new("bench", data))
            .await
            .expect("seed ledger");
        MemoryStore::load(documents, "bench", "model")
            .await
            .expect("load ledger")
    })
}

fn bench_similarity_retrieval(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let embedder = HashingEmbedder::new(DIMENSIONS);
    let query = embedder.embed_sync("where did agent 3 leave the object number 3");
    let key = IdentityKey::new("Bob", "Alice");
    let settings = RetrievalSettings::default();

    let mut group = c.benchmark_group("similarity_retrieval");
    for size in [10usize, 100, 1_000] {
        let mut store = build_store(&runtime, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let retrieved =
                    retrieval::similarity(&mut store, black_box(&key), black_box(&query), &settings);
                black_box(retrieved.related);
            });
        });
    }
    group.finish();
}

fn bench_top_k(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_k_above_threshold");
    for size in [100usize, 10_000] {
        let scores: Vec<f32> = (0..size).map(|i| (i % 97) as f32 / 97.0).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(top_k_above_threshold(black_box(&scores), 0.85, 3)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_similarity_retrieval, bench_top_k);
criterion_main!(benches);
