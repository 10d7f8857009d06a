pub mod document;
pub mod ledger;
pub mod similarity;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::types::IdentityKey;
use document::{DEFAULT_COLLECTION, Document, DocumentKey, DocumentStore};
use ledger::{ActionRecord, CleanTurn, PreferenceUpdate, Turn};
use similarity::{cosine_similarity, top_k_above_threshold};

/// `host -> user -> entries`
type PairLedgers<T> = BTreeMap<String, BTreeMap<String, Vec<T>>>;

/// Document names of one session's ledgers.
///
/// A session identifier `collection\name` selects `collection`; a bare
/// identifier lands in the `others` collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerNames {
    pub collection: String,
    pub conversation: String,
    pub clean: String,
    pub preferences: String,
    pub actions: String,
}

impl LedgerNames {
    pub fn new(session_id: &str, model_id: &str) -> Self {
        let (collection, simulation) = match session_id.split_once('\\') {
            Some((collection, simulation)) => (collection, simulation),
            None => (DEFAULT_COLLECTION, session_id),
        };
        Self {
            collection: collection.to_string(),
            conversation: format!("{simulation}{model_id}.json"),
            clean: format!("{simulation}{model_id}_clean.json"),
            preferences: format!("{simulation}{model_id}_updating.json"),
            actions: format!("{simulation}{model_id}_actions.json"),
        }
    }

    fn key(&self, name: &str) -> DocumentKey {
        DocumentKey::new(&self.collection, name)
    }
}

/// Append-only ledgers of turns, preference updates and actions for one session.
///
/// Loaded once when the session starts, held in memory, and written through to
/// the [`DocumentStore`] after every append.
pub struct MemoryStore {
    documents: Arc<dyn DocumentStore>,
    names: LedgerNames,
    conversations: PairLedgers<Turn>,
    preferences: PairLedgers<PreferenceUpdate>,
    actions: BTreeMap<String, Vec<ActionRecord>>,
}

impl MemoryStore {
    /// Load every ledger document of `session_id`; missing documents start empty.
    pub async fn load(
        documents: Arc<dyn DocumentStore>,
        session_id: &str,
        model_id: &str,
    ) -> anyhow::Result<Self> {
        let names = LedgerNames::new(session_id, model_id);

        let conversations = load_data(documents.as_ref(), &names.key(&names.conversation)).await?;
        let preferences = load_data(documents.as_ref(), &names.key(&names.preferences)).await?;
        let actions = load_data(documents.as_ref(), &names.key(&names.actions)).await?;

        let store = Self {
            documents,
            names,
            conversations,
            preferences,
            actions,
        };
        info!(
            session = session_id,
            collection = %store.names.collection,
            hosts = store.conversations.len(),
            "ledgers loaded"
        );
        Ok(store)
    }

    pub fn names(&self) -> &LedgerNames {
        &self.names
    }

    /// Create empty conversation and preference ledgers for an unseen key.
    pub fn ensure_ledger(&mut self, key: &IdentityKey) {
        self.conversations
            .entry(key.host.clone())
            .or_default()
            .entry(key.user.clone())
            .or_default();
        self.preferences
            .entry(key.host.clone())
            .or_default()
            .entry(key.user.clone())
            .or_default();
    }

    /// All turns of `key`, oldest first.
    pub fn turns(&self, key: &IdentityKey) -> &[Turn] {
        self.conversations
            .get(&key.host)
            .and_then(|users| users.get(&key.user))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn preference_updates(&self, key: &IdentityKey) -> &[PreferenceUpdate] {
        self.preferences
            .get(&key.host)
            .and_then(|users| users.get(&key.user))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn actions(&self, host: &str) -> &[ActionRecord] {
        self.actions.get(host).map(Vec::as_slice).unwrap_or_default()
    }

    /// Index the next turn of `key` will take: ledger length + 1.
    pub fn next_index(&mut self, key: &IdentityKey) -> usize {
        self.ensure_ledger(key);
        self.turns(key).len() + 1
    }

    /// The last `j` turns of `key` in chronological order; fewer or none when
    /// the ledger is shorter.
    pub fn recent_turns(&mut self, key: &IdentityKey, j: usize) -> Vec<Turn> {
        self.ensure_ledger(key);
        let turns = self.turns(key);
        turns[turns.len().saturating_sub(j)..].to_vec()
    }

    /// Turns of `key` whose stored embedding is among the `k` most similar to
    /// `query` and strictly above `threshold`.
    ///
    /// The most recent turn is never a candidate, so fewer than two turns
    /// always yields `None`. `None` also means nothing qualified.
    pub fn related_turns(
        &mut self,
        key: &IdentityKey,
        query: &[f32],
        threshold: f32,
        k: usize,
    ) -> Option<Vec<Turn>> {
        self.ensure_ledger(key);
        let turns = self.turns(key);
        if turns.len() < 2 {
            return None;
        }

        let candidates: Vec<(&Turn, f32)> = turns[..turns.len() - 1]
            .iter()
            .filter_map(|turn| {
                let embedding = turn.embedding.as_deref()?;
                Some((turn, cosine_similarity(query, embedding)))
            })
            .collect();
        let scores: Vec<f32> = candidates.iter().map(|(_, score)| *score).collect();
        debug!(key = %key, ?scores, "similarity scores");

        let picked = top_k_above_threshold(&scores, threshold, k);
        if picked.is_empty() {
            return None;
        }
        Some(picked.into_iter().map(|i| candidates[i].0.clone()).collect())
    }

    /// Append a turn and flush the conversation ledger and its clean export.
    pub async fn append_turn(&mut self, key: &IdentityKey, turn: Turn) -> anyhow::Result<()> {
        self.ensure_ledger(key);
        let expected = self.turns(key).len() + 1;
        if turn.index != expected {
            warn!(key = %key, index = turn.index, expected, "turn index out of step with ledger");
        }
        if let Some(turns) = self
            .conversations
            .get_mut(&key.host)
            .and_then(|users| users.get_mut(&key.user))
        {
            turns.push(turn);
        }
        self.flush_conversations().await
    }

    pub async fn append_preference_update(
        &mut self,
        key: &IdentityKey,
        entry: PreferenceUpdate,
    ) -> anyhow::Result<()> {
        self.ensure_ledger(key);
        if let Some(entries) = self
            .preferences
            .get_mut(&key.host)
            .and_then(|users| users.get_mut(&key.user))
        {
            entries.push(entry);
        }
        self.flush_preferences().await
    }

    pub async fn append_action(&mut self, host: &str, entry: ActionRecord) -> anyhow::Result<()> {
        self.actions.entry(host.to_string()).or_default().push(entry);
        let key = self.names.key(&self.names.actions);
        let data = serde_json::to_value(&self.actions)?;
        self.replace(key, data).await
    }

    /// Conversation ledgers without embeddings or images.
    pub fn clean_conversations(&self) -> BTreeMap<&str, BTreeMap<&str, Vec<CleanTurn>>> {
        self.conversations
            .iter()
            .map(|(host, users)| {
                let users = users
                    .iter()
                    .map(|(user, turns)| {
                        (user.as_str(), turns.iter().map(CleanTurn::from).collect())
                    })
                    .collect();
                (host.as_str(), users)
            })
            .collect()
    }

    async fn flush_conversations(&self) -> anyhow::Result<()> {
        let data = serde_json::to_value(&self.conversations)?;
        self.replace(self.names.key(&self.names.conversation), data)
            .await?;

        let clean = serde_json::to_value(self.clean_conversations())?;
        self.replace(self.names.key(&self.names.clean), clean).await
    }

    async fn flush_preferences(&self) -> anyhow::Result<()> {
        let data = serde_json::to_value(&self.preferences)?;
        self.replace(self.names.key(&self.names.preferences), data)
            .await
    }

    async fn replace(&self, key: DocumentKey, data: serde_json::Value) -> anyhow::Result<()> {
        let document = Document::new(&key.name, data);
        self.documents.replace(&key, document).await
    }
}

async fn load_data<T: DeserializeOwned + Default>(
    documents: &dyn DocumentStore,
    key: &DocumentKey,
) -> anyhow::Result<T> {
    match documents.get(key).await? {
        Some(document) => serde_json::from_value(document.data)
            .map_err(|e| anyhow::anyhow!("ledger document {} is malformed: {e}", key.name)),
        None => Ok(T::default()),
    }
}
