//! Commits the records produced by one request back into the [`MemoryStore`].

use tracing::{debug, info};

use crate::config::MemoryConfig;
use crate::interpret::action::ActionPlan;
use crate::interpret::lq::LqOutput;
use crate::interpret::preference::PreferenceOutput;
use crate::interpret::qa::QaOutput;
use crate::memory::MemoryStore;
use crate::memory::ledger::{ActionRecord, PreferenceUpdate, Summary, Turn};
use crate::pipeline::RequestContext;
use crate::prompt::NONE_FIELD;
use crate::types::now_millis;

/// Texts longer than this many words get shortened when summarising.
pub const SUMMARY_TRIGGER_WORDS: usize = 100;
/// Word budget of a shortened text.
pub const SUMMARY_WORD_BUDGET: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerWriter {
    history_saving: bool,
    summarization: bool,
}

impl Default for LedgerWriter {
    fn default() -> Self {
        Self {
            history_saving: true,
            summarization: false,
        }
    }
}

impl From<&MemoryConfig> for LedgerWriter {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            history_saving: config.history_saving,
            summarization: config.summarization,
        }
    }
}

impl LedgerWriter {
    pub fn new(history_saving: bool, summarization: bool) -> Self {
        Self {
            history_saving,
            summarization,
        }
    }

    /// Persist a QA exchange with its summary and the query embedding.
    /// Returns false when history saving is off and nothing was written.
    pub async fn record_qa(
        &self,
        store: &mut MemoryStore,
        ctx: &RequestContext,
        parsed: &QaOutput,
    ) -> anyhow::Result<bool> {
        if !self.history_saving {
            debug!(key = %ctx.key, "history saving disabled, QA turn not persisted");
            return Ok(false);
        }

        let summary = Summary {
            input: self.summary_text(&ctx.request.query),
            output: self.summary_text(&parsed.output),
        };
        let turn = Turn {
            index: ctx.index,
            timestamp: now_millis(),
            context: context_field(&ctx.request.instruction),
            triples: ctx.request.triples.clone(),
            query: ctx.request.query.clone(),
            inner_speech: parsed.inner_speech.clone(),
            output: parsed.output.clone(),
            summary: Some(summary),
            embedding: ctx.query_embedding.clone(),
            image: ctx.request.image.clone(),
        };
        store.append_turn(&ctx.key, turn).await?;
        info!(key = %ctx.key, index = ctx.index, "QA turn persisted");
        Ok(true)
    }

    /// Persist a follow-up exchange with its section text as scanned: no
    /// context, summary or embedding.
    pub async fn record_lq(
        &self,
        store: &mut MemoryStore,
        ctx: &RequestContext,
        parsed: &LqOutput,
    ) -> anyhow::Result<()> {
        let turn = Turn {
            index: ctx.index,
            timestamp: now_millis(),
            context: None,
            triples: ctx.request.triples.clone(),
            query: ctx.request.query.clone(),
            inner_speech: parsed.inference.clone(),
            output: parsed.answer.clone(),
            summary: None,
            embedding: None,
            image: ctx.request.image.clone(),
        };
        store.append_turn(&ctx.key, turn).await?;
        info!(key = %ctx.key, index = ctx.index, "LQ turn persisted");
        Ok(())
    }

    /// Persist a preference update, whether or not any triplet survived.
    pub async fn record_preference(
        &self,
        store: &mut MemoryStore,
        ctx: &RequestContext,
        raw_output: &str,
        parsed: &PreferenceOutput,
    ) -> anyhow::Result<()> {
        let entry = PreferenceUpdate {
            index: ctx.index,
            timestamp: now_millis(),
            context: ctx.request.instruction.clone(),
            triples: ctx.request.triples.clone(),
            query: ctx.request.query.clone(),
            preference_updating: raw_output.to_string(),
            list: parsed.triplets.clone(),
        };
        store.append_preference_update(&ctx.key, entry).await?;
        info!(
            key = %ctx.key,
            triplets = parsed.triplets.len(),
            "preference update persisted"
        );
        Ok(())
    }

    /// Persist an action plan under the request's host.
    pub async fn record_action(
        &self,
        store: &mut MemoryStore,
        ctx: &RequestContext,
        raw_output: &str,
        plan: &ActionPlan,
    ) -> anyhow::Result<()> {
        let entry = ActionRecord {
            timestamp: now_millis(),
            triples: ctx.request.triples.clone(),
            full_output: raw_output.to_string(),
            output: plan.to_value(),
            image: ctx.request.image.clone(),
        };
        store.append_action(&ctx.request.host, entry).await?;
        info!(host = %ctx.request.host, "action persisted");
        Ok(())
    }

    fn summary_text(&self, text: &str) -> String {
        if self.summarization {
            summarize(text)
        } else {
            text.to_string()
        }
    }
}

fn context_field(instruction: &str) -> Option<String> {
    (instruction != NONE_FIELD).then(|| instruction.to_string())
}

/// Shorten texts over [`SUMMARY_TRIGGER_WORDS`] words to their leading
/// sentences totalling at most [`SUMMARY_WORD_BUDGET`] words. Shorter texts
/// are returned unchanged.
pub fn summarize(text: &str) -> String {
    if text.split_whitespace().count() <= SUMMARY_TRIGGER_WORDS {
        return text.to_string();
    }

    let mut kept = Vec::new();
    let mut words = 0;
    for sentence in sentences(text) {
        let count = sentence.split_whitespace().count();
        if words + count > SUMMARY_WORD_BUDGET {
            break;
        }
        kept.push(sentence);
        words += count;
    }
    kept.join(" ")
}

/// Split after `.`, `!` or `?` when followed by one or more spaces.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes.get(i + 1) == Some(&b' ') {
            out.push(&text[start..=i]);
            i += 1;
            while bytes.get(i) == Some(&b' ') {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    if start < text.len() {
        out.push(&text[start..]);
    }
    out
}
