use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub quota: QuotaConfig,

    pub cache: CacheConfig,

    pub generation: GenerationConfig,

    pub auth: AuthConfig,

    pub scheduler: SchedulerConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Event bus buffer size (default: 100)
    pub event_bus_buffer_size: usize,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/parlor.db".to_string(),
            log_level: "info".to_string(),
            suppress_connection_errors: false,
            event_bus_buffer_size: 100,
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            cors_allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Daily message limit for the basic tier.
    pub basic_daily_limit: i32,

    /// Daily message limit for the pro tier.
    pub pro_daily_limit: i32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            basic_daily_limit: 5,
            pro_daily_limit: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for cached chatroom lists, in seconds (default: 10 minutes).
    pub chatroom_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            chatroom_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model endpoint the pipeline posts prompts to.
    pub endpoint: String,

    /// API key for the endpoint. Overridable via `PARLOR_GENERATION_API_KEY`.
    pub api_key: String,

    pub model: String,

    /// Upper bound on the remote call; a timeout fails the call, the task
    /// degrades to the fallback reply.
    pub timeout_seconds: u64,

    /// Bound on the conversation window handed to the generator, including
    /// the triggering message. Older context is silently dropped.
    pub max_context_messages: u64,

    /// Persisted in place of a reply when the generation call fails, so the
    /// user turn is never silently lost.
    pub fallback_reply: String,

    /// Size of the worker pool draining the task queue.
    pub workers: usize,

    /// Queue capacity; dispatch fails fast once this many tasks are pending.
    pub queue_capacity: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/api/generate".to_string(),
            api_key: String::new(),
            model: "default".to_string(),
            timeout_seconds: 30,
            max_context_messages: 10,
            fallback_reply:
                "I apologize, but I'm experiencing technical difficulties. Please try again later."
                    .to_string(),
            workers: 4,
            queue_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Number of digits in a verification code.
    pub code_length: usize,

    /// Minutes before a verification code expires.
    pub code_ttl_minutes: i64,

    /// Return freshly generated codes in the API response. Development
    /// shortcut; disable once an out-of-band delivery channel exists.
    pub expose_codes: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            code_ttl_minutes: 10,
            expose_codes: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Interval between housekeeping sweeps of expired verification codes.
    pub sweep_interval_minutes: u32,

    /// Optional cron expression; takes precedence over the interval.
    pub cron_expression: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_minutes: 15,
            cron_expression: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "parlor".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                let mut config = Self::load_from_path(path)?;
                config.apply_env_overrides();
                return Ok(config);
            }
        }

        info!("No config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Secrets should not have to live in the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("PARLOR_GENERATION_API_KEY") {
            self.generation.api_key = key;
        }
        if let Ok(url) = std::env::var("PARLOR_DATABASE_PATH") {
            self.general.database_path = url;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("parlor").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".parlor").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.quota.basic_daily_limit <= 0 || self.quota.pro_daily_limit <= 0 {
            anyhow::bail!("Daily limits must be positive");
        }

        if self.generation.max_context_messages == 0 {
            anyhow::bail!("max_context_messages must be at least 1");
        }

        if self.generation.workers == 0 || self.generation.queue_capacity == 0 {
            anyhow::bail!("Generation worker pool and queue capacity must be > 0");
        }

        if self.scheduler.enabled
            && self.scheduler.sweep_interval_minutes == 0
            && self.scheduler.cron_expression.is_none()
        {
            anyhow::bail!("Sweep interval must be > 0 or cron expression must be set");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.quota.basic_daily_limit, 5);
        assert_eq!(config.quota.pro_daily_limit, 1000);
        assert_eq!(config.cache.chatroom_ttl_seconds, 600);
        assert_eq!(config.generation.max_context_messages, 10);
        assert_eq!(config.auth.code_ttl_minutes, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[quota]"));
        assert!(toml_str.contains("[generation]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [quota]
            basic_daily_limit = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.quota.basic_daily_limit, 3);

        assert_eq!(config.quota.pro_daily_limit, 1000);
    }
}
