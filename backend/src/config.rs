use serde::Deserialize;
use std::env;
use std::time::Duration;

pub const CONFIG_PATH_VAR: &str = "DETECTAI_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    Dynamodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: "https://kushalkv-detectai-api.hf.space/".to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            write_timeout_secs: 30,
        }
    }
}

impl ClassifierConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// reqwest has no write timeout, so the whole exchange is bounded by the
    /// sum of the three phases instead.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.connect_timeout_secs + self.read_timeout_secs + self.write_timeout_secs,
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    pub table: String,
    pub user_index: String,
    pub undo_window_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Dynamodb,
            table: "history".to_string(),
            user_index: "userId-timestamp-index".to_string(),
            undo_window_secs: 10,
        }
    }
}

impl HistoryConfig {
    pub fn undo_window(&self) -> Duration {
        Duration::from_secs(self.undo_window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    pub classifier: ClassifierConfig,
    pub history: HistoryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            jwt_secret: String::new(),
            classifier: ClassifierConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file named by `DETECTAI_CONFIG` (if any), then
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                log::info!("Loading configuration from {}", path);
                let contents = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_yaml_str(&contents)?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PORT") {
            self.port = parse_number("PORT", &value)?;
        }
        if let Some(value) = lookup("JWT_SECRET") {
            self.jwt_secret = value;
        }
        if let Some(value) = lookup("CLASSIFIER_BASE_URL") {
            self.classifier.base_url = value;
        }
        if let Some(value) = lookup("CLASSIFIER_CONNECT_TIMEOUT_SECS") {
            self.classifier.connect_timeout_secs =
                parse_number("CLASSIFIER_CONNECT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CLASSIFIER_READ_TIMEOUT_SECS") {
            self.classifier.read_timeout_secs =
                parse_number("CLASSIFIER_READ_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("CLASSIFIER_WRITE_TIMEOUT_SECS") {
            self.classifier.write_timeout_secs =
                parse_number("CLASSIFIER_WRITE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("HISTORY_BACKEND") {
            self.history.backend = match value.trim().to_ascii_lowercase().as_str() {
                "dynamodb" => HistoryBackend::Dynamodb,
                "memory" => HistoryBackend::Memory,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "HISTORY_BACKEND",
                        value,
                    });
                }
            };
        }
        if let Some(value) = lookup("DYNAMODB_HISTORY_TABLE") {
            self.history.table = value;
        }
        if let Some(value) = lookup("DYNAMODB_HISTORY_USER_INDEX") {
            self.history.user_index = value;
        }
        if let Some(value) = lookup("UNDO_WINDOW_SECS") {
            self.history.undo_window_secs = parse_number("UNDO_WINDOW_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.classifier.base_url.trim().is_empty() {
            return Err(ConfigError::Missing("CLASSIFIER_BASE_URL"));
        }
        if self.history.backend == HistoryBackend::Dynamodb && self.history.table.is_empty() {
            return Err(ConfigError::Missing("DYNAMODB_HISTORY_TABLE"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
