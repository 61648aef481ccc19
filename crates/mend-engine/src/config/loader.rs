use super::schema::MendConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MEND_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the first config found in [`search_paths`](Self::search_paths),
    /// or the defaults when none exists. An explicit `MEND_CONFIG` that
    /// points nowhere is an error rather than a silent fallback.
    pub async fn load_default() -> Result<MendConfig, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load_from(Path::new(&path)).await;
        }

        for path in Self::search_paths() {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Self::load_from(&path).await;
            }
        }

        debug!("No config file found, using defaults");
        Ok(MendConfig::default())
    }

    /// `./mend.yaml`, then `~/.mend/config.yaml`.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./mend.yaml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".mend").join("config.yaml"));
        }
        paths
    }

    pub async fn load_from(path: &Path) -> Result<MendConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: MendConfig = serde_yaml::from_str(&content)?;
        validate(&config)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

fn validate(config: &MendConfig) -> Result<(), ConfigError> {
    let invalid = |field, reason: &str| ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    };

    if config.cache.ttl_days == 0 {
        return Err(invalid("cache.ttl_days", "must be at least 1"));
    }
    if config.healing.scan_limit == 0 {
        return Err(invalid("healing.scan_limit", "must be at least 1"));
    }
    if config.ai.timeout_ms == 0 {
        return Err(invalid("ai.timeout_ms", "must be positive"));
    }
    if !(0.0..=2.0).contains(&config.ai.temperature) {
        return Err(invalid("ai.temperature", "must be between 0 and 2"));
    }
    if config.ai.endpoint.trim().is_empty() {
        return Err(invalid("ai.endpoint", "must not be empty"));
    }
    Ok(())
}
