use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which resolver produced a healed selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealMethod {
    Heuristic,
    Ai,
}

impl HealMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealMethod::Heuristic => "HEURISTIC",
            HealMethod::Ai => "AI",
        }
    }
}

impl fmt::Display for HealMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted healing, keyed by [`cache_key`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorCacheEntry {
    pub failed_selector: String,
    pub healed_selector: String,
    pub action_hint: String,
    pub method: HealMethod,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "hits", default)]
    pub hit_count: u64,
    /// Domain the entry was learned on.
    #[serde(default)]
    pub url_pattern: String,
}

impl SelectorCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) >= ttl
    }
}

/// Domain part of a page URL, used so entries generalize across paths.
///
/// Includes the port when present. Strings that do not parse as a URL are
/// used as-is, and an empty URL maps to `"unknown"`.
pub fn domain_of(page_url: &str) -> String {
    let trimmed = page_url.trim();
    if trimmed.is_empty() {
        return "unknown".to_string();
    }
    match url::Url::parse(trimmed) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => trimmed.to_string(),
        },
        Err(_) => trimmed.to_string(),
    }
}

/// Hex SHA-256 over domain, failed selector and action hint.
///
/// Each part is prefixed with its byte length (`u64`, little endian), so
/// selectors containing `:` cannot make two different triples collide.
pub fn cache_key(domain: &str, failed_selector: &str, action_hint: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [domain, failed_selector, action_hint] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
