//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every section is optional;
//! secrets may also come from the environment.

use std::path::PathBuf;
use std::time::Duration;

use bulut_execution::gateway::HttpGatewayConfig;
use bulut_execution::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
    /// Keep everything in memory; nothing survives a restart.
    #[serde(default)]
    pub in_memory: bool,
}

/// Transfer gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// "simulated" | "http".
    #[serde(default = "default_gateway_mode")]
    pub mode: String,
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub entity_id: String,
    /// Platform wallet that sponsors gas.
    #[serde(default)]
    pub wallet_id: String,
    /// Per-call timeout.
    #[serde(default = "default_gateway_timeout_ms")]
    pub timeout_ms: u64,
}

/// Retry budget for executions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_confirm_polls")]
    pub confirm_polls: u32,
    #[serde(default = "default_confirm_interval_ms")]
    pub confirm_interval_ms: u64,
    /// How often unfinished executions are resumed in the background.
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
}

/// Subscription scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

/// Natural-language parser configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// "pattern" | "llm".
    #[serde(default = "default_parser_backend")]
    pub backend: String,
    #[serde(default = "default_llm_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_gateway_mode() -> String {
    "simulated".to_string()
}

fn default_gateway_url() -> String {
    bulut_execution::gateway::http::DEFAULT_BASE_URL.to_string()
}

fn default_gateway_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    bulut_execution::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_confirm_polls() -> u32 {
    5
}

fn default_confirm_interval_ms() -> u64 {
    1_000
}

fn default_recovery_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    60
}

fn default_parser_backend() -> String {
    "pattern".to_string()
}

fn default_llm_url() -> String {
    bulut_intent::parser::llm::DEFAULT_API_URL.to_string()
}

fn default_llm_model() -> String {
    bulut_intent::parser::llm::DEFAULT_MODEL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: default_gateway_mode(),
            base_url: default_gateway_url(),
            api_key: String::new(),
            entity_id: String::new(),
            wallet_id: String::new(),
            timeout_ms: default_gateway_timeout_ms(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            confirm_polls: default_confirm_polls(),
            confirm_interval_ms: default_confirm_interval_ms(),
            recovery_secs: default_recovery_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_secs: default_tick_secs(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            backend: default_parser_backend(),
            api_url: default_llm_url(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::parse(&content)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Secrets from the environment win over the file.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("BULUT_GATEWAY_API_KEY") {
            self.gateway.api_key = key;
        }
        if let Ok(key) = std::env::var("BULUT_LLM_API_KEY") {
            self.parser.api_key = key;
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            call_timeout: Duration::from_millis(self.gateway.timeout_ms),
            confirm_polls: self.retry.confirm_polls.max(1),
            confirm_interval: Duration::from_millis(self.retry.confirm_interval_ms),
        }
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.retry.recovery_secs.max(1))
    }

    pub fn http_gateway(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            base_url: self.gateway.base_url.clone(),
            api_key: self.gateway.api_key.clone(),
            entity_id: self.gateway.entity_id.clone(),
            wallet_id: self.gateway.wallet_id.clone(),
            timeout: Duration::from_millis(self.gateway.timeout_ms),
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("BULUT_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/Bulut")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".bulut")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/bulut"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.gateway.mode, "simulated");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.recovery_interval(), Duration::from_secs(30));
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.tick_secs, 60);
        assert_eq!(config.parser.backend, "pattern");
        assert_eq!(config.advanced.log_level, "info");
        assert!(!config.storage.in_memory);
    }

    #[test]
    fn test_config_serialization() {
        let config = DaemonConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed: DaemonConfig = toml::from_str(&toml_str).expect("parse");
    }

    #[test]
    fn test_partial_file() {
        let config = DaemonConfig::parse(
            r#"
            [retry]
            max_attempts = 5

            [gateway]
            mode = "http"
            timeout_ms = 2500
            "#,
        )
        .expect("parse");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 500);
        assert_eq!(config.gateway.mode, "http");

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.call_timeout, Duration::from_millis(2500));
        assert_eq!(config.http_gateway().timeout, Duration::from_millis(2500));
    }

    #[test]
    fn test_explicit_data_dir() {
        let mut config = DaemonConfig::default();
        config.storage.data_dir = "/var/lib/bulut".into();
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/bulut"));
    }
}
