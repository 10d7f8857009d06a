use tracing::debug;

use crate::config::MemoryConfig;
use crate::memory::MemoryStore;
use crate::memory::ledger::Turn;
use crate::types::IdentityKey;

/// Knobs of the two retrieval strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// When false, similarity mode never surfaces related turns.
    pub history_calling: bool,
    pub similarity_threshold: f32,
    pub related_k: usize,
    pub qa_recent_window: usize,
    pub lq_recent_window: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            history_calling: true,
            similarity_threshold: 0.85,
            related_k: 1,
            qa_recent_window: 1,
            lq_recent_window: 3,
        }
    }
}

impl From<&MemoryConfig> for RetrievalSettings {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            history_calling: config.history_calling,
            similarity_threshold: config.similarity_threshold,
            related_k: config.related_k,
            qa_recent_window: config.qa_recent_window,
            lq_recent_window: config.lq_recent_window,
        }
    }
}

/// Context selected for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    /// Index the request's own turn will take if it is persisted.
    pub index: usize,
    /// Trailing turns, chronological.
    pub recent: Vec<Turn>,
    /// Semantically related turns; `None` when nothing qualified.
    pub related: Option<Vec<Turn>>,
}

impl Retrieved {
    pub fn is_empty(&self) -> bool {
        self.recent.is_empty() && self.related.is_none()
    }
}

/// Recency mode: the trailing `window` turns of `key`, verbatim.
pub fn recency(store: &mut MemoryStore, key: &IdentityKey, window: usize) -> Retrieved {
    let index = store.next_index(key);
    let recent = store.recent_turns(key, window);
    debug!(key = %key, index, recent = recent.len(), "recency retrieval");
    Retrieved {
        index,
        recent,
        related: None,
    }
}

/// Similarity mode: the QA recency window plus the turns most similar to
/// `query_embedding`, excluding the latest turn.
pub fn similarity(
    store: &mut MemoryStore,
    key: &IdentityKey,
    query_embedding: &[f32],
    settings: &RetrievalSettings,
) -> Retrieved {
    let mut retrieved = recency(store, key, settings.qa_recent_window);
    if settings.history_calling {
        retrieved.related = store.related_turns(
            key,
            query_embedding,
            settings.similarity_threshold,
            settings.related_k,
        );
    }
    debug!(
        key = %key,
        related = retrieved.related.as_ref().map_or(0, Vec::len),
        "similarity retrieval"
    );
    retrieved
}
