//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `OPENAI_API_KEY`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_CHUNKING__CHUNK_SIZE=600`). [`Settings::validate`] enforces the
//! structural invariants before any chunking or provider construction runs.
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current working directory.
    pub fn load() -> anyhow::Result<Self> {
        let cwd = env::current_dir()?;
        Self::load_from(&cwd)
    }

    /// Load `config.toml` (+ env overlay) from `dir`. Missing files are skipped.
    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "cloud.api_key".into()))
            .merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the typed settings. Relative paths are resolved
    /// against the directory the configuration was loaded from.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::config(e.to_string()))?;
        settings.paths.docs_dir = resolve_with_base(&self.base_dir, &settings.paths.docs_dir)
            .to_string_lossy()
            .into_owned();
        settings.paths.index_dir = resolve_with_base(&self.base_dir, &settings.paths.index_dir)
            .to_string_lossy()
            .into_owned();
        settings.local.model_dir = resolve_with_base(&self.base_dir, &settings.local.model_dir)
            .to_string_lossy()
            .into_owned();
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }
}

/// Which family of backends serves embeddings and generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Local,
    Cloud,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Local => f.write_str("local"),
            Mode::Cloud => f.write_str("cloud"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: Mode,
    /// Serve local embeddings from the deterministic hashing embedder instead
    /// of model weights (tests, offline development).
    pub use_fake_embeddings: bool,
    pub paths: PathsConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub generation: GenerationConfig,
    pub local: LocalConfig,
    pub cloud: CloudConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()?;
        self.providers().validate()
    }

    /// The subset of settings the provider layer is built from.
    pub fn providers(&self) -> ProviderSettings {
        ProviderSettings {
            mode: self.mode,
            use_fake_embeddings: self.use_fake_embeddings,
            generation: self.generation.clone(),
            local: self.local.clone(),
            cloud: self.cloud.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub docs_dir: String,
    pub index_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { docs_dir: "./docs".to_string(), index_dir: "./vectorstore".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent windows of one section.
    pub chunk_overlap: usize,
    /// Drop chunks whose normalized text already appeared earlier in the corpus.
    pub dedup_exact: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 800, chunk_overlap: 120, dedup_exact: false }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunking.chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub fetch_k: usize,
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: 5, fetch_k: 20, lambda: 0.7 }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::config("retrieval.k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(Error::config(format!("retrieval.lambda ({}) must be within [0, 1]", self.lambda)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Logical index name; generations are stored as `<alias>_<timestamp>`.
    pub alias: String,
    pub embed_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { alias: "banco_rag".to_string(), embed_batch_size: 64 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { temperature: 0.3, max_tokens: 800 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory holding `config.json`, `tokenizer.json` and weights.
    pub model_dir: String,
    pub max_tokens: usize,
    pub fake_dim: usize,
    pub ollama_url: String,
    pub llm_model: String,
    pub timeout_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model_dir: "./models/all-MiniLM-L6-v2".to_string(),
            max_tokens: 256,
            fake_dim: 384,
            ollama_url: "http://localhost:11434".to_string(),
            llm_model: "llama3.2:3b".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    /// Overrides the dimension implied by `embedding_model`.
    pub embedding_dim: Option<usize>,
    pub llm_model: String,
    pub timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: None,
            llm_model: "gpt-4o-mini".to_string(),
            timeout_secs: 30,
        }
    }
}

impl CloudConfig {
    /// The configured key, with blank strings treated as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim.unwrap_or(match self.embedding_model.as_str() {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub mode: Mode,
    pub use_fake_embeddings: bool,
    pub generation: GenerationConfig,
    pub local: LocalConfig,
    pub cloud: CloudConfig,
}

impl ProviderSettings {
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            Mode::Cloud if self.cloud.api_key().is_none() => Err(Error::config(
                "cloud.api_key (or OPENAI_API_KEY) is required when mode = \"cloud\"",
            )),
            Mode::Local if self.use_fake_embeddings && self.local.fake_dim == 0 => {
                Err(Error::config("local.fake_dim must be greater than 0"))
            }
            _ => Ok(()),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
