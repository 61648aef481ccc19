//! Healing Orchestrator
//!
//! Turns a stale selector into a usable one: cache first, then the heuristic
//! scan, then the AI resolver. `heal` always returns a selector, falling back
//! to the input when nothing better turns up.

use crate::cache::{CacheStats, HealMethod, SelectorCache};
use crate::config::schema::MendConfig;
use crate::resolution::{
    AiResolver, CandidateSource, HealRequest, HeuristicResolver, SelectorOracle,
};
use mend_common::{ActionIntent, DomSnapshot};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Where a healed selector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealSource {
    Cache,
    Heuristic,
    Ai,
}

/// One call to [`SelectorHealer::heal`], kept for statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealingAttempt {
    pub failed_selector: String,
    pub healed_selector: String,
    pub action_intent: String,
    pub success: bool,
    pub source: Option<HealSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealingStats {
    pub total: usize,
    pub successful: usize,
    /// Percentage, 0 when nothing was attempted.
    pub success_rate: f64,
    pub cache: Option<CacheStats>,
}

#[derive(Default)]
pub struct SelectorHealer {
    cache: Option<SelectorCache>,
    heuristic: Option<Box<dyn CandidateSource>>,
    oracle: Option<Box<dyn SelectorOracle>>,
    attempts: Vec<HealingAttempt>,
}

impl SelectorHealer {
    /// A healer with no cache and no resolvers; add them with the `with_*` methods.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: SelectorCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_heuristic(mut self, heuristic: Box<dyn CandidateSource>) -> Self {
        self.heuristic = Some(heuristic);
        self
    }

    pub fn with_oracle(mut self, oracle: Box<dyn SelectorOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Wire up cache and resolvers as the configuration asks.
    ///
    /// A resolver that cannot be constructed is left out with a warning.
    pub fn from_config(config: &MendConfig) -> Self {
        let mut healer = Self::new();

        if config.cache.enabled {
            healer = healer.with_cache(SelectorCache::open(
                config.cache.path.clone(),
                config.cache.ttl_days,
            ));
        }

        if config.healing.heuristic_enabled {
            healer = healer.with_heuristic(Box::new(HeuristicResolver::new(
                config.healing.scan_limit,
            )));
        }

        if config.healing.ai_enabled {
            match AiResolver::from_config(&config.ai) {
                Ok(resolver) => {
                    if !resolver.has_api_key() {
                        warn!(
                            "{} not set, AI healing will always come back empty",
                            config.ai.api_key_env
                        );
                    }
                    healer = healer.with_oracle(Box::new(resolver));
                }
                Err(e) => warn!("AI healing disabled: {}", e),
            }
        }

        healer
    }

    pub fn cache(&self) -> Option<&SelectorCache> {
        self.cache.as_ref()
    }

    pub fn attempts(&self) -> &[HealingAttempt] {
        &self.attempts
    }

    /// Find a replacement for `req.failed_selector`.
    pub async fn heal(&mut self, req: &HealRequest<'_>) -> String {
        let failed = req.failed_selector;

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get(req.page_url, failed, req.action_hint).await
        {
            debug!("Healed {} from cache: {}", failed, cached);
            self.record(req, &cached, Some(HealSource::Cache));
            return cached;
        }

        let mut healed: Option<(String, HealMethod)> = None;

        if let Some(heuristic) = &self.heuristic {
            let intent = ActionIntent::from_hint(req.action_hint);
            match heuristic.candidate(req.dom, intent) {
                Some(candidate) if candidate.selector != failed => {
                    debug!(
                        "Heuristic candidate {} (score {})",
                        candidate.selector, candidate.score
                    );
                    healed = Some((candidate.selector, HealMethod::Heuristic));
                }
                _ => debug!("Heuristic scan found nothing better than {}", failed),
            }
        }

        if healed.is_none()
            && let Some(oracle) = &self.oracle
        {
            match oracle.suggest(req).await {
                Ok(Some(selector)) if !selector.is_empty() && selector != failed => {
                    healed = Some((selector, HealMethod::Ai));
                }
                Ok(_) => debug!("AI resolver had no better selector for {}", failed),
                Err(e) => warn!("AI resolver failed for {}: {}", failed, e),
            }
        }

        match healed {
            Some((selector, method)) => {
                if let Some(cache) = &self.cache {
                    cache
                        .set(req.page_url, failed, req.action_hint, &selector, method)
                        .await;
                }
                info!("Healed selector {} -> {} ({})", failed, selector, method);
                let source = match method {
                    HealMethod::Heuristic => HealSource::Heuristic,
                    HealMethod::Ai => HealSource::Ai,
                };
                self.record(req, &selector, Some(source));
                selector
            }
            None => {
                self.record(req, failed, None);
                failed.to_string()
            }
        }
    }

    /// Positional form of [`heal`](Self::heal) for callers without a request value.
    pub async fn heal_selector(
        &mut self,
        dom: &DomSnapshot,
        failed_selector: &str,
        action_hint: &str,
        page_url: &str,
        page_title: &str,
    ) -> String {
        self.heal(&HealRequest {
            dom,
            failed_selector,
            action_hint,
            page_url,
            page_title,
        })
        .await
    }

    pub async fn stats(&self) -> HealingStats {
        let total = self.attempts.len();
        let successful = self.attempts.iter().filter(|a| a.success).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };
        let cache = match &self.cache {
            Some(cache) => Some(cache.stats().await),
            None => None,
        };

        HealingStats {
            total,
            successful,
            success_rate,
            cache,
        }
    }

    fn record(&mut self, req: &HealRequest<'_>, healed: &str, source: Option<HealSource>) {
        self.attempts.push(HealingAttempt {
            failed_selector: req.failed_selector.to_string(),
            healed_selector: healed.to_string(),
            action_intent: req.action_hint.to_string(),
            success: source.is_some(),
            source,
        });
    }
}
