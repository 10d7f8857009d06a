//! One request, end to end: decode, retrieve, assemble, generate, interpret,
//! persist.
//!
//! A [`Pipeline`] owns the external collaborators and the active [`Session`].
//! Requests for the same identity key are serialized by a per-key lock held
//! from retrieval through persistence; distinct keys proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::agent::embedding::{self, Embedder};
use crate::agent::providers::{self, LlmProvider};
use crate::config::DialogConfig;
use crate::interpret;
use crate::ledger::LedgerWriter;
use crate::memory::MemoryStore;
use crate::memory::document::{self, DocumentStore};
use crate::memory::ledger::Turn;
use crate::prompt;
use crate::protocol::{self, DecodeError, Request, TaskCode};
use crate::retrieval::{self, RetrievalSettings, Retrieved};
use crate::types::{GenerationParams, IdentityKey};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input line is not a valid request; nothing was generated or stored.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Immutable per-request state threaded from retrieval to persistence.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request: Request,
    pub key: IdentityKey,
    /// Index read at retrieval time, reused by the append.
    pub index: usize,
    /// Embedding of the query, computed for QA only.
    pub query_embedding: Option<Vec<f32>>,
}

/// Ledgers of one session plus the follow-up recency cache.
pub struct Session {
    pub id: String,
    store: RwLock<MemoryStore>,
    lq_cache: Mutex<HashMap<IdentityKey, Vec<Turn>>>,
    key_locks: RwLock<HashMap<IdentityKey, Arc<Mutex<()>>>>,
}

impl Session {
    pub async fn open(
        documents: Arc<dyn DocumentStore>,
        session_id: &str,
        model_id: &str,
    ) -> anyhow::Result<Self> {
        let store = MemoryStore::load(documents, session_id, model_id).await?;
        Ok(Self {
            id: session_id.to_string(),
            store: RwLock::new(store),
            lq_cache: Mutex::new(HashMap::new()),
            key_locks: RwLock::new(HashMap::new()),
        })
    }

    /// Read access to the session's ledgers.
    pub async fn store(&self) -> tokio::sync::RwLockReadGuard<'_, MemoryStore> {
        self.store.read().await
    }

    pub async fn key_lock(&self, key: &IdentityKey) -> Arc<Mutex<()>> {
        {
            let locks = self.key_locks.read().await;
            if let Some(lock) = locks.get(key) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.key_locks.write().await;
        Arc::clone(
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Recency snapshot for follow-up questions, taken once per key and
    /// reused for the rest of the session. An empty ledger yields no
    /// snapshot, so the next follow-up looks again.
    async fn lq_snapshot(&self, key: &IdentityKey, window: usize) -> Vec<Turn> {
        let mut cache = self.lq_cache.lock().await;
        if let Some(turns) = cache.get(key) {
            debug!(key = %key, turns = turns.len(), "reusing cached LQ context");
            return turns.clone();
        }
        let turns = self.store.write().await.recent_turns(key, window);
        if !turns.is_empty() {
            cache.insert(key.clone(), turns.clone());
        }
        turns
    }
}

pub struct Pipeline {
    provider: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    documents: Arc<dyn DocumentStore>,
    settings: RetrievalSettings,
    writer: LedgerWriter,
    params: GenerationParams,
    model_id: String,
    session: RwLock<Arc<Session>>,
}

impl Pipeline {
    /// Build the collaborators named in `config` and open its default session.
    pub async fn from_config(config: &DialogConfig) -> anyhow::Result<Self> {
        let provider: Arc<dyn LlmProvider> = Arc::from(providers::from_config(&config.model)?);
        let embedder: Arc<dyn Embedder> = Arc::from(embedding::from_config(&config.embedding)?);
        let documents = document::from_config(&config.store);
        info!(
            provider = provider.name(),
            backend = %config.store.backend,
            "pipeline collaborators ready"
        );
        Self::new(provider, embedder, documents, config).await
    }

    pub async fn new(
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        documents: Arc<dyn DocumentStore>,
        config: &DialogConfig,
    ) -> anyhow::Result<Self> {
        let model_id = config.model_id().to_string();
        let session = Session::open(
            Arc::clone(&documents),
            &config.store.default_session,
            &model_id,
        )
        .await?;
        Ok(Self {
            provider,
            embedder,
            documents,
            settings: RetrievalSettings::from(&config.memory),
            writer: LedgerWriter::from(&config.memory),
            params: config.model.generation_params(),
            model_id,
            session: RwLock::new(Arc::new(session)),
        })
    }

    /// The active session.
    pub async fn session(&self) -> Arc<Session> {
        Arc::clone(&*self.session.read().await)
    }

    /// Replace the active session with the ledgers stored under `session_id`.
    /// Requests already in flight finish against the previous session.
    pub async fn start_session(&self, session_id: &str) -> anyhow::Result<()> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            anyhow::bail!("session identifier cannot be empty");
        }
        let session =
            Session::open(Arc::clone(&self.documents), session_id, &self.model_id).await?;
        *self.session.write().await = Arc::new(session);
        info!(session = session_id, "session started");
        Ok(())
    }

    /// Run one raw protocol line through the pipeline and return the task's
    /// text result.
    pub async fn process(&self, raw: &str) -> Result<String, PipelineError> {
        let request = protocol::decode(raw).inspect_err(|e| {
            warn!("request skipped: {e}");
        })?;

        let session = self.session().await;
        let key = request.key();
        let lock = session.key_lock(&key).await;
        let _guard = lock.lock().await;

        info!(
            task = request.task.as_str(),
            host = %request.host,
            user = %request.user,
            session = %session.id,
            "processing request"
        );

        let (ctx, retrieved) = self.retrieve(&session, request).await?;
        let dialog = prompt::assemble(&ctx.request, &retrieved);
        debug!(messages = dialog.len(), "prompt assembled");

        let generated = self.provider.generate(&dialog, &self.params).await?;
        debug!(chars = generated.len(), "model output received");

        let result = self.interpret_and_persist(&session, &ctx, &generated).await?;
        Ok(result)
    }

    async fn retrieve(
        &self,
        session: &Session,
        request: Request,
    ) -> anyhow::Result<(RequestContext, Retrieved)> {
        let key = request.key();
        let mut query_embedding = None;

        let retrieved = match request.task {
            TaskCode::QA => {
                let embedding = self.embedder.embed(&request.query).await?;
                let retrieved = {
                    let mut store = session.store.write().await;
                    retrieval::similarity(&mut store, &key, &embedding, &self.settings)
                };
                query_embedding = Some(embedding);
                retrieved
            }
            TaskCode::LQ => {
                let recent = session
                    .lq_snapshot(&key, self.settings.lq_recent_window)
                    .await;
                let index = session.store.write().await.next_index(&key);
                Retrieved {
                    index,
                    recent,
                    related: None,
                }
            }
            TaskCode::PU | TaskCode::AP => {
                let index = session.store.write().await.next_index(&key);
                Retrieved {
                    index,
                    ..Retrieved::default()
                }
            }
        };

        let ctx = RequestContext {
            index: retrieved.index,
            key,
            request,
            query_embedding,
        };
        Ok((ctx, retrieved))
    }

    async fn interpret_and_persist(
        &self,
        session: &Session,
        ctx: &RequestContext,
        generated: &str,
    ) -> anyhow::Result<String> {
        let mut store = session.store.write().await;
        match ctx.request.task {
            TaskCode::QA => {
                let parsed = interpret::qa::parse(generated);
                self.writer.record_qa(&mut store, ctx, &parsed).await?;
                Ok(parsed.output)
            }
            TaskCode::LQ => {
                let parsed = interpret::lq::parse(generated);
                self.writer.record_lq(&mut store, ctx, &parsed).await?;
                Ok(parsed.answer_text())
            }
            TaskCode::PU => {
                let parsed = interpret::preference::parse(generated);
                self.writer
                    .record_preference(&mut store, ctx, generated, &parsed)
                    .await?;
                Ok(parsed.summary())
            }
            TaskCode::AP => {
                let plan = interpret::action::parse(generated);
                self.writer
                    .record_action(&mut store, ctx, generated, &plan)
                    .await?;
                Ok(serde_json::to_string(&plan)?)
            }
        }
    }
}
