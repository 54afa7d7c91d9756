use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub const LLM_API_KEY_ENV: &str = "AUTOPOSTER_LLM_API_KEY";
pub const BOT_TOKEN_ENV: &str = "AUTOPOSTER_BOT_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Shared key/TTL store: unset = in-memory, "sqlite" or "sqlite:<path>", "redis://...".
    #[serde(default)]
    pub store_url: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub publishing: PublishingConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_drafts_per_day")]
    pub drafts_per_day: u32,
    #[serde(default = "default_publishes_per_day")]
    pub publishes_per_day: u32,
    #[serde(default = "default_llm_calls_per_day")]
    pub llm_calls_per_day: u32,
    #[serde(default = "default_publishes_per_hour")]
    pub publishes_per_hour: u32,
    #[serde(default = "default_sources_limit")]
    pub sources_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_interval_min")]
    pub fetch_interval_min: u32,
    #[serde(default = "default_source_fail_threshold")]
    pub source_fail_threshold: u32,
    #[serde(default = "default_max_generate_per_fetch")]
    pub max_generate_per_fetch: usize,
    #[serde(default = "default_generate_lock_ttl_secs")]
    pub generate_lock_ttl_secs: u64,
    #[serde(default = "default_page_max_chars")]
    pub page_max_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_backoff_hours")]
    pub max_backoff_hours: u32,
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_cooldown_secs")]
    pub manual_fetch_cooldown_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Mock,
    Claude,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmMode {
    #[default]
    Economy,
    Normal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub mode: LlmMode,
    #[serde(default = "default_facts_budget_chars")]
    pub facts_budget_chars: usize,
    #[serde(default = "default_duplicate_window_days")]
    pub duplicate_window_days: i64,
    #[serde(default = "default_max_post_len")]
    pub default_max_post_len: usize,
    #[serde(default = "default_llm_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    #[serde(default = "default_publish_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: u64,
    /// Upper bound on a server-requested retry delay.
    #[serde(default = "default_max_retry_after_secs")]
    pub max_retry_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub bot_token: Option<String>,
    #[serde(default = "default_channel_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_fetch_tick_secs")]
    pub fetch_tick_secs: u64,
    #[serde(default = "default_slot_tolerance_min")]
    pub slot_tolerance_min: i64,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autoposter");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("autoposter.db").to_string_lossy().to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_drafts_per_day() -> u32 {
    20
}
fn default_publishes_per_day() -> u32 {
    20
}
fn default_llm_calls_per_day() -> u32 {
    100
}
fn default_publishes_per_hour() -> u32 {
    10
}
fn default_sources_limit() -> u32 {
    10
}

fn default_fetch_interval_min() -> u32 {
    10
}
fn default_source_fail_threshold() -> u32 {
    3
}
fn default_max_generate_per_fetch() -> usize {
    5
}
fn default_generate_lock_ttl_secs() -> u64 {
    60
}
fn default_page_max_chars() -> usize {
    5000
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_backoff_hours() -> u32 {
    24
}
fn default_fetch_concurrency() -> usize {
    5
}
fn default_fetch_cooldown_secs() -> u64 {
    60
}

fn default_llm_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}
fn default_facts_budget_chars() -> usize {
    4000
}
fn default_duplicate_window_days() -> i64 {
    7
}
fn default_max_post_len() -> usize {
    1000
}
fn default_llm_max_retries() -> u32 {
    2
}
fn default_llm_timeout_secs() -> u64 {
    30
}

fn default_publish_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_idempotency_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_retry_after_secs() -> u64 {
    60
}

fn default_channel_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_tick_secs() -> u64 {
    60
}
fn default_fetch_tick_secs() -> u64 {
    60
}
fn default_slot_tolerance_min() -> i64 {
    5
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            drafts_per_day: default_drafts_per_day(),
            publishes_per_day: default_publishes_per_day(),
            llm_calls_per_day: default_llm_calls_per_day(),
            publishes_per_hour: default_publishes_per_hour(),
            sources_limit: default_sources_limit(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_interval_min: default_fetch_interval_min(),
            source_fail_threshold: default_source_fail_threshold(),
            max_generate_per_fetch: default_max_generate_per_fetch(),
            generate_lock_ttl_secs: default_generate_lock_ttl_secs(),
            page_max_chars: default_page_max_chars(),
            timeout_secs: default_timeout_secs(),
            max_backoff_hours: default_max_backoff_hours(),
            concurrency: default_fetch_concurrency(),
            manual_fetch_cooldown_secs: default_fetch_cooldown_secs(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            api_key: None,
            model: default_llm_model(),
            mode: LlmMode::default(),
            facts_budget_chars: default_facts_budget_chars(),
            duplicate_window_days: default_duplicate_window_days(),
            default_max_post_len: default_max_post_len(),
            max_retries: default_llm_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn llm_max_tokens(&self) -> u32 {
        match self.mode {
            LlmMode::Economy => 128,
            LlmMode::Normal => 512,
        }
    }
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            max_retries: default_publish_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
            max_retry_after_secs: default_max_retry_after_secs(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: default_channel_api_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            fetch_tick_secs: default_fetch_tick_secs(),
            slot_tolerance_min: default_slot_tolerance_min(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            store_url: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            limits: LimitsConfig::default(),
            fetch: FetchConfig::default(),
            generation: GenerationConfig::default(),
            publishing: PublishingConfig::default(),
            channel: ChannelConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path` (or the default location), writing a default file if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::config_path);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            config
        };

        config.apply_env();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("autoposter")
            .join("config.toml")
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(LLM_API_KEY_ENV) {
            if !key.is_empty() {
                self.generation.api_key = Some(key);
            }
        }
        if let Ok(token) = std::env::var(BOT_TOKEN_ENV) {
            if !token.is_empty() {
                self.channel.bot_token = Some(token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/x.db"

            [limits]
            drafts_per_day = 1

            [generation]
            mode = "normal"
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.drafts_per_day, 1);
        assert_eq!(config.limits.publishes_per_day, 20);
        assert_eq!(config.generation.llm_max_tokens(), 512);
        assert_eq!(config.fetch.source_fail_threshold, 3);
        assert_eq!(config.scheduler.slot_tolerance_min, 5);
        assert!(config.store_url.is_none());
    }

    #[test]
    fn load_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.publishing.max_retries, 2);
    }
}
