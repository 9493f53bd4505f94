use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::semantic::{DEFAULT_MODEL, DEFAULT_OLLAMA_URL};

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_EMBEDDING_TIMEOUT_SECS: u64 = 30;
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 15;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Csv,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Catalog file. Relative paths resolve against the base directory;
    /// empty picks `books.db` or `books.csv` by backend.
    #[serde(default)]
    pub path: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Ollama,
    /// In-process fastembed model, needs the `local-embed` feature.
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: DEFAULT_EMBEDDING_TIMEOUT_SECS,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_OLLAMA_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    DEFAULT_EMBEDDING_TIMEOUT_SECS
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataSourceKind {
    #[default]
    OpenLibrary,
    Google,
}

impl std::str::FromStr for MetadataSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openlibrary" | "ol" => Ok(MetadataSourceKind::OpenLibrary),
            "google" | "googlebooks" | "gb" => Ok(MetadataSourceKind::Google),
            other => bail!("unknown metadata source \"{other}\" (use openlibrary or google)"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default)]
    pub source: MetadataSourceKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,

    #[serde(default = "default_metadata_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            source: MetadataSourceKind::default(),
            google_api_key: None,
            timeout_secs: DEFAULT_METADATA_TIMEOUT_SECS,
        }
    }
}

fn default_metadata_timeout_secs() -> u64 {
    DEFAULT_METADATA_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Result count when a search does not ask for one. 0 returns everything.
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web: WebConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&self) -> anyhow::Result<()> {
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be greater than 0");
        }
        if self.metadata.timeout_secs == 0 {
            bail!("metadata.timeout_secs must be greater than 0");
        }
        if self.embedding.base_url.trim().is_empty() {
            bail!("embedding.base_url must not be empty");
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        if self.web.listen.parse::<std::net::SocketAddr>().is_err() {
            bail!("web.listen must be an address like 127.0.0.1:8080, got {:?}", self.web.listen);
        }
        Ok(())
    }

    /// Load `config.yaml` from the default base directory.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(crate::base_path())
    }

    /// Load `config.yaml` from `base_path`, writing defaults on first use.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("couldn't create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("couldn't write {}", path.display()))?;
            log::info!("wrote default config to {}", path.display());
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("couldn't read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case new keys were added
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        std::fs::write(&path, serde_yml::to_string(&self)?)
            .with_context(|| format!("couldn't write {}", path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Where the catalog lives on disk.
    pub fn catalog_path(&self) -> PathBuf {
        let path = self.storage.path.trim();
        if path.is_empty() {
            return self.base_path.join(match self.storage.backend {
                StorageBackend::Sqlite => "books.db",
                StorageBackend::Csv => "books.csv",
            });
        }
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}
