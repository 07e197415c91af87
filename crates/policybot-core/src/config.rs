//! Layered configuration loader and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `secrets.toml` + `GROQ_API_KEY` + `APP_*` env vars (nested with `__`).
//! `APP_USE_FAKE_EMBEDDINGS` is folded into `embedding.use_fake`.
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment
            .merge(Toml::file("secrets.toml"))
            .merge(Env::raw().only(&["GROQ_API_KEY"]).map(|_| "chat.api_key".into()))
            .merge(Env::prefixed("APP_").split("__"));
        if fake_embeddings_requested() {
            figment = figment.merge(Serialized::default("embedding.use_fake", true));
        }

        let config = Self { figment, env_name: env_name.to_string() };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.embedding.use_fake {
                    return Err(Error::InvalidConfig(
                        "embedding.use_fake must be off in production".to_string(),
                    )
                    .into());
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

fn fake_embeddings_requested() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub chat: ChatSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Base for relative paths; defaults to the running executable's directory.
    pub base_dir: Option<String>,
    pub pdf_path: String,
    pub spreadsheet_path: String,
    pub spreadsheet_has_header: bool,
    pub db_dir: String,
    pub table_name: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            base_dir: None,
            pdf_path: "condiciones_met99.pdf".to_string(),
            spreadsheet_path: "preguntas_frecuentes.xlsx".to_string(),
            spreadsheet_has_header: true,
            db_dir: "db_met99".to_string(),
            table_name: "chunks".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 2000, chunk_overlap: 400 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model_dir: String,
    pub max_len: usize,
    pub batch_size: usize,
    pub use_fake: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            max_len: 256,
            batch_size: 32,
            use_fake: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.3,
            timeout_secs: 30,
            api_key: None,
        }
    }
}

// Hand-written so the key never ends up in logs.
impl std::fmt::Debug for ChatSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSettings")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), Error> {
        let c = &self.chunking;
        if c.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunking.chunk_size must be > 0".to_string()));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be > 0".to_string()));
        }
        if self.chat.timeout_secs == 0 {
            return Err(Error::InvalidConfig("chat.timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data.base_dir {
            return expand_path(dir);
        }
        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn pdf_path(&self) -> PathBuf {
        resolve_with_base(&self.base_dir(), &self.data.pdf_path)
    }

    pub fn spreadsheet_path(&self) -> PathBuf {
        resolve_with_base(&self.base_dir(), &self.data.spreadsheet_path)
    }

    pub fn db_dir(&self) -> PathBuf {
        resolve_with_base(&self.base_dir(), &self.data.db_dir)
    }

    pub fn model_dir(&self) -> PathBuf {
        resolve_with_base(&self.base_dir(), &self.embedding.model_dir)
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
