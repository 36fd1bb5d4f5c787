use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{Error, Result};
use crate::memory::types::DistanceMetric;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Path of the SQLite database holding the memory collections. `:memory:` is allowed.
    pub db_uri: String,
    /// Collection (table) name inside `db_uri`.
    pub table: String,
    pub storage: StorageConfig,
    pub embeddings: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    pub codex: CodexConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub metric: DistanceMetric,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local` (alias `fastembed`), `openai` or `hash`.
    pub provider: String,
    /// Model override; each provider has its own default.
    pub model: Option<String>,
    pub cache_dir: String,
    pub dimensions: Option<usize>,
    pub api_base: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub enable: bool,
    pub sqlite_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CodexConfig {
    pub binary: Option<String>,
    pub args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let db_uri = default_data_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            log_level: "info".into(),
            db_uri,
            table: "interactions".into(),
            storage: StorageConfig::default(),
            embeddings: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            history: HistoryConfig::default(),
            codex: CodexConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_data_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: None,
            cache_dir,
            dimensions: None,
            api_base: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let sqlite_path = default_data_dir()
            .join("history.db")
            .to_string_lossy()
            .into_owned();
        Self {
            enable: true,
            sqlite_path,
        }
    }
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            binary: None,
            args: vec!["--oss".into()],
        }
    }
}

/// Returns `~/.codex-memory/`, or `./.codex-memory/` when there is no home directory.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".codex-memory")
}

/// Returns the default config file path: `~/.codex-memory/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl Config {
    /// Load from an explicit path (must exist) or the default path (may be absent).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            ))),
            Some(path) => Self::load_from(path),
            None => Self::load_from(default_config_path()),
        }
    }

    /// Load config from TOML file (if it exists), apply env var overrides, then validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                Error::config(format!("failed to read {}: {e}", path.display()))
            })?;
            Self::from_toml(&contents)?
        } else {
            info!("no config file at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::config(format!("failed to parse config TOML: {e}")))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CODEX_MEMORY_DB") {
            self.db_uri = val;
        }
        if let Ok(val) = std::env::var("CODEX_MEMORY_TABLE") {
            self.table = val;
        }
        if let Ok(val) = std::env::var("CODEX_MEMORY_LOG_LEVEL") {
            self.log_level = val;
        }
        if let Ok(val) = std::env::var("CODEX_MEMORY_CODEX_BIN") {
            self.codex.binary = Some(val);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(Error::config("retrieval.top_k must be a positive integer"));
        }
        crate::memory::store::validate_collection_name(&self.table)?;
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.db_uri)
    }

    pub fn resolved_history_path(&self) -> PathBuf {
        expand_tilde(&self.history.sqlite_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.table, "interactions");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.embeddings.provider, "local");
        assert!(config.embeddings.model.is_none());
        assert!(config.history.enable);
        assert_eq!(config.codex.args, vec!["--oss".to_string()]);
        assert_eq!(config.storage.metric, DistanceMetric::Cosine);
        assert!(config.db_uri.ends_with("memory.db"));
        config.validate().unwrap();
    }

    #[test]
    fn empty_document_is_valid() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.table, "interactions");
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
log_level = "debug"
db_uri = "/tmp/test.db"
table = "coding"

[storage]
metric = "l2"

[embeddings]
provider = "openai"
model = "text-embedding-3-large"

[retrieval]
top_k = 3

[history]
enable = false
"#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.db_uri, "/tmp/test.db");
        assert_eq!(config.table, "coding");
        assert_eq!(config.storage.metric, DistanceMetric::L2);
        assert_eq!(config.embeddings.provider, "openai");
        assert_eq!(
            config.embeddings.model.as_deref(),
            Some("text-embedding-3-large")
        );
        assert_eq!(config.retrieval.top_k, 3);
        assert!(!config.history.enable);
        // defaults still apply for unset fields
        assert!(config.history.sqlite_path.ends_with("history.db"));
        assert_eq!(config.codex.args, vec!["--oss".to_string()]);
    }

    #[test]
    fn unknown_metric_is_configuration_error() {
        let err = Config::from_toml("[storage]\nmetric = \"manhattan\"\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn zero_top_k_rejected() {
        let config = Config::from_toml("[retrieval]\ntop_k = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn invalid_table_name_rejected() {
        let config = Config::from_toml("table = \"drop table; --\"\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn explicit_missing_path_is_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = Config::default();
        std::env::set_var("CODEX_MEMORY_DB", "/tmp/override.db");
        std::env::set_var("CODEX_MEMORY_TABLE", "env_table");
        std::env::set_var("CODEX_MEMORY_LOG_LEVEL", "trace");
        std::env::set_var("CODEX_MEMORY_CODEX_BIN", "/opt/codex");

        config.apply_env_overrides();

        assert_eq!(config.db_uri, "/tmp/override.db");
        assert_eq!(config.table, "env_table");
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.codex.binary.as_deref(), Some("/opt/codex"));

        // Clean up
        std::env::remove_var("CODEX_MEMORY_DB");
        std::env::remove_var("CODEX_MEMORY_TABLE");
        std::env::remove_var("CODEX_MEMORY_LOG_LEVEL");
        std::env::remove_var("CODEX_MEMORY_CODEX_BIN");
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/db.sqlite"), PathBuf::from("/var/db.sqlite"));
        assert_eq!(expand_tilde(":memory:"), PathBuf::from(":memory:"));
    }
}
