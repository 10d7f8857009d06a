//! API keys of the remote model and embedding backends, kept under
//! `<state dir>/credentials/<provider>.key`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::fs_util::{set_secure_dir_permissions, set_secure_file_permissions, state_dir};

/// Backends that authenticate with an API key. `mock` and `hashing` never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyedProvider {
    Anthropic,
    OpenAi,
}

impl KeyedProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyedProvider::Anthropic => "anthropic",
            KeyedProvider::OpenAi => "openai",
        }
    }

    /// Environment variable consulted before the credential file.
    pub fn env_var(self) -> &'static str {
        match self {
            KeyedProvider::Anthropic => "ANTHROPIC_API_KEY",
            KeyedProvider::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl FromStr for KeyedProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(KeyedProvider::Anthropic),
            "openai" => Ok(KeyedProvider::OpenAi),
            other => anyhow::bail!("provider '{other}' does not use an API key"),
        }
    }
}

impl fmt::Display for KeyedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key file per provider in a 0700 directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn at(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("credentials"),
        }
    }

    pub fn default_location() -> Self {
        Self::at(&state_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, provider: KeyedProvider) -> PathBuf {
        self.dir.join(format!("{provider}.key"))
    }

    /// Write `api_key` (trimmed) with 0600 permissions, replacing any earlier key.
    pub fn save(&self, provider: KeyedProvider, api_key: &str) -> anyhow::Result<PathBuf> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            anyhow::bail!("{provider} API key cannot be empty");
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", self.dir.display()))?;
        set_secure_dir_permissions(&self.dir)?;

        let path = self.key_path(provider);
        std::fs::write(&path, api_key)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        set_secure_file_permissions(&path)?;
        Ok(path)
    }

    /// The stored key, if a non-blank one exists.
    pub fn load(&self, provider: KeyedProvider) -> Option<String> {
        let path = self.key_path(provider);
        let value = std::fs::read_to_string(&path).ok()?;
        let value = value.trim();
        if value.is_empty() {
            debug!(path = %path.display(), "ignoring blank credential file");
            return None;
        }
        Some(value.to_string())
    }
}
