use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Root configuration for QueryMate.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub models: ModelsConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding the embeddable widget script.
    pub public_dir: String,
    /// Optional text file used as the answering context for accounts
    /// that have not finalized their own.
    pub default_context_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            public_dir: "public".to_string(),
            default_context_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsConfig {
    /// Candidates for the context-collection conversation, fastest first.
    pub collection: Vec<String>,
    /// Candidates for grounded answering, fastest first.
    pub answering: Vec<String>,
    /// Per-candidate call deadline.
    pub timeout_ms: u64,
    pub max_output_tokens: u32,
    pub temperature: f64,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            collection: vec![
                "gemini-2.0-flash-exp".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-pro".to_string(),
                "gemini-pro".to_string(),
            ],
            answering: vec![
                "gemini-2.0-flash-exp".to_string(),
                "gemini-1.5-flash".to_string(),
                "gemini-pro".to_string(),
            ],
            timeout_ms: 20_000,
            max_output_tokens: 2048,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    /// Data directory for the file-backed stores. Empty means the
    /// per-user default (~/.querymate).
    pub data_dir: String,
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            get_data_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthConfig {
    pub token_ttl_days: i64,
    pub api_key_prefix: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_days: 7,
            api_key_prefix: "qm".to_string(),
        }
    }
}

/// Get the default config file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.json")
}

/// Get the QueryMate data directory.
pub fn get_data_dir() -> PathBuf {
    let path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".querymate");
    std::fs::create_dir_all(&path).ok();
    path
}

/// Load configuration from file or fall back to defaults, then apply
/// environment overrides.
pub fn load_config(config_path: Option<&Path>) -> Config {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    let mut config = if path.exists() {
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config from {}: {}", path.display(), e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config from {}: {}", path.display(), e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);
    config
}

/// Environment variables win over the config file.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            config.gemini.api_key = key;
        }
    }
    if let Ok(port) = std::env::var("PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(dir) = std::env::var("QUERYMATE_DATA_DIR") {
        if !dir.is_empty() {
            config.storage.data_dir = dir;
        }
    }
}

/// Save configuration to file.
pub fn save_config(config: &Config, config_path: Option<&Path>) -> Result<(), ConfigError> {
    let path = config_path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(get_config_path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    }

    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    Ok(())
}
