use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MendConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub healing: HealingConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_cache_path(),
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cache_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mend")
        .join("selector_cache.json")
}

fn default_ttl_days() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingConfig {
    #[serde(default = "default_true")]
    pub heuristic_enabled: bool,
    #[serde(default = "default_true")]
    pub ai_enabled: bool,
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            heuristic_enabled: true,
            ai_enabled: true,
            scan_limit: default_scan_limit(),
        }
    }
}

fn default_scan_limit() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    #[serde(default = "default_max_snippet_chars")]
    pub max_snippet_chars: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_ai_timeout_ms(),
            temperature: default_temperature(),
            max_elements: default_max_elements(),
            max_snippet_chars: default_max_snippet_chars(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.x.ai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "grok-beta".to_string()
}

fn default_api_key_env() -> String {
    "GROK_API_KEY".to_string()
}

fn default_ai_timeout_ms() -> u64 {
    15000
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_elements() -> usize {
    50
}

fn default_max_snippet_chars() -> usize {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_healing_attempts")]
    pub max_healing_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            max_backoff_ms: default_max_backoff_ms(),
            max_healing_attempts: default_max_healing_attempts(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_backoff_ms() -> u64 {
    mend_common::error::DEFAULT_MAX_BACKOFF_MS
}

fn default_max_healing_attempts() -> u32 {
    2
}

/// Per-action timeouts for the browser driver.
///
/// The engine never drives a browser itself, so nothing here is applied
/// automatically. A driver wrapping its calls in a [`BrowserAction`] reads
/// these values for each verb it issues:
///
/// ```
/// use mend_engine::config::MendConfig;
///
/// let timeouts = MendConfig::default().timeouts;
/// assert_eq!(timeouts.timeout_for("goto"), 30_000);
/// assert_eq!(timeouts.timeout_for("click"), 5_000);
/// ```
///
/// [`BrowserAction`]: crate::BrowserAction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_ms: u64,
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,
    #[serde(default = "default_element_ms")]
    pub element_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: default_timeout_ms(),
            navigation_ms: default_navigation_ms(),
            element_ms: default_element_ms(),
        }
    }
}

impl TimeoutConfig {
    /// Timeout in milliseconds a driver should use for the given action verb.
    /// Navigation and file transfer get `navigation_ms`, clicks and typing get
    /// `element_ms`, anything else `default_ms`.
    pub fn timeout_for(&self, action: &str) -> u64 {
        match action {
            "goto" | "upload" | "download" => self.navigation_ms,
            "click" | "type" => self.element_ms,
            _ => self.default_ms,
        }
    }
}

fn default_timeout_ms() -> u64 {
    10000
}

fn default_navigation_ms() -> u64 {
    30000
}

fn default_element_ms() -> u64 {
    5000
}
