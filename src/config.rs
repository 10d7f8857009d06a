use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use crate::credentials::{CredentialStore, KeyedProvider};
use crate::fs_util::{home_dir, state_dir};
use crate::memory::document::DocumentFormat;
use crate::types::GenerationParams;

/// Top-level configuration loaded from TOML.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DialogConfig {
    pub gateway: GatewayConfig,
    pub model: ModelConfig,
    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    8888
}
fn default_bind() -> String {
    "127.0.0.1".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_openai_base_url(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

impl ModelConfig {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f32 {
    0.6
}
fn default_top_p() -> f32 {
    0.9
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            base_url: default_openai_base_url(),
            api_key: None,
            dimensions: default_dimensions(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hashing".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimensions() -> usize {
    256
}

/// Switches and thresholds of the memory pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryConfig {
    /// Persist QA turns to the conversation ledger.
    #[serde(default = "default_true")]
    pub history_saving: bool,
    /// Surface related turns by similarity for QA.
    #[serde(default = "default_true")]
    pub history_calling: bool,
    /// Attach input/output summaries to persisted QA turns.
    #[serde(default)]
    pub summarization: bool,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_related_k")]
    pub related_k: usize,
    #[serde(default = "default_qa_recent_window")]
    pub qa_recent_window: usize,
    #[serde(default = "default_lq_recent_window")]
    pub lq_recent_window: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            history_saving: true,
            history_calling: true,
            summarization: false,
            similarity_threshold: default_similarity_threshold(),
            related_k: default_related_k(),
            qa_recent_window: default_qa_recent_window(),
            lq_recent_window: default_lq_recent_window(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_similarity_threshold() -> f32 {
    0.85
}
fn default_related_k() -> usize {
    1
}
fn default_qa_recent_window() -> usize {
    1
}
fn default_lq_recent_window() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// `memory` or `file`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Root of the file backend; defaults to `<state dir>/store`.
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: DocumentFormat,
    #[serde(default = "default_session")]
    pub default_session: String,
    /// Suffix of ledger document names; the model name when unset.
    pub model_id: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            format: DocumentFormat::default(),
            default_session: default_session(),
            model_id: None,
        }
    }
}

impl StoreConfig {
    pub fn root(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| state_dir().join("store"))
    }
}

fn default_backend() -> String {
    "memory".into()
}
fn default_session() -> String {
    "simulation_history".into()
}

impl DialogConfig {
    /// Identifier folded into ledger document names.
    pub fn model_id(&self) -> &str {
        self.store.model_id.as_deref().unwrap_or(&self.model.model)
    }
}

/// Load configuration from file or use defaults.
///
/// Search order:
/// 1. `PCM_DIALOG_CONFIG` env var
/// 2. `~/.pcm-dialog/config.toml`
/// 3. Zero-config defaults (no file needed)
pub fn load() -> anyhow::Result<DialogConfig> {
    let path = config_path();

    if path.exists() {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config = parse(&content)
            .map_err(|e| anyhow::anyhow!("invalid config at {}: {e}", path.display()))?;

        resolve_api_key(&mut config);
        validate(&config)?;

        info!("loaded config from {}", path.display());
        Ok(config)
    } else {
        info!("no config file found, using zero-config defaults");
        let mut config = DialogConfig::default();
        resolve_api_key(&mut config);
        Ok(config)
    }
}

/// Parse TOML text into a config without touching env or disk.
pub fn parse(content: &str) -> anyhow::Result<DialogConfig> {
    Ok(toml::from_str(content)?)
}

fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("PCM_DIALOG_CONFIG") {
        return PathBuf::from(path);
    }
    home_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".pcm-dialog")
        .join("config.toml")
}

/// Fill the `api_key` of the `[model]` and `[embedding]` sections whose
/// provider takes one: the config value wins, then the provider's environment
/// variable, then the credential store. Keyless providers are left untouched.
pub fn resolve_api_keys_with(
    config: &mut DialogConfig,
    store: &CredentialStore,
    env: impl Fn(&str) -> Option<String>,
) {
    let lookup = |name: &str| {
        let provider = name.parse::<KeyedProvider>().ok()?;
        env(provider.env_var())
            .filter(|key| !key.trim().is_empty())
            .or_else(|| store.load(provider))
    };
    if config.model.api_key.is_none() {
        config.model.api_key = lookup(&config.model.provider);
    }
    if config.embedding.api_key.is_none() {
        config.embedding.api_key = lookup(&config.embedding.provider);
    }
}

/// [`resolve_api_keys_with`] against the process environment and the default
/// credential store.
pub fn resolve_api_key(config: &mut DialogConfig) {
    resolve_api_keys_with(config, &CredentialStore::default_location(), |var| {
        std::env::var(var).ok()
    });
}

/// Validate the config and return clear error messages.
pub fn validate(config: &DialogConfig) -> anyhow::Result<()> {
    let valid_providers = ["openai", "anthropic", "mock"];
    if !valid_providers.contains(&config.model.provider.as_str()) {
        anyhow::bail!(
            "invalid provider '{}': must be one of {:?}",
            config.model.provider,
            valid_providers
        );
    }

    let valid_embedders = ["hashing", "openai"];
    if !valid_embedders.contains(&config.embedding.provider.as_str()) {
        anyhow::bail!(
            "invalid embedding provider '{}': must be one of {:?}",
            config.embedding.provider,
            valid_embedders
        );
    }

    let valid_backends = ["memory", "file"];
    if !valid_backends.contains(&config.store.backend.as_str()) {
        anyhow::bail!(
            "invalid store backend '{}': must be one of {:?}",
            config.store.backend,
            valid_backends
        );
    }

    for (field, base) in [
        ("model.base_url", &config.model.base_url),
        ("embedding.base_url", &config.embedding.base_url),
    ] {
        url::Url::parse(base).map_err(|e| anyhow::anyhow!("{field} '{base}' is not a URL: {e}"))?;
    }

    if config.model.max_tokens == 0 {
        anyhow::bail!("model.max_tokens must be > 0");
    }
    if config.embedding.dimensions == 0 {
        anyhow::bail!("embedding.dimensions must be > 0");
    }
    if !(-1.0..=1.0).contains(&config.memory.similarity_threshold) {
        anyhow::bail!("memory.similarity_threshold must be within [-1, 1]");
    }
    if config.memory.qa_recent_window == 0 || config.memory.lq_recent_window == 0 {
        anyhow::bail!("memory recency windows must be > 0");
    }
    if config.memory.related_k == 0 {
        anyhow::bail!("memory.related_k must be > 0");
    }
    if config.store.default_session.trim().is_empty() {
        anyhow::bail!("store.default_session cannot be empty");
    }

    Ok(())
}
