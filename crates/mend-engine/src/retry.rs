//! Retry/Backoff Controller
//!
//! Runs one browser action with bounded retries. Each failure is classified;
//! assertion and permission failures stop immediately, everything else waits
//! out an exponential backoff and tries again. A missing element is healed
//! before the next attempt when a healer is supplied.
//!
//! The controller never returns an error: terminal failure is reported in the
//! [`RetryOutcome`] so a batch runner can move on to the next action. Every
//! failed attempt also lands in the controller's [`ErrorHistory`], which
//! outlives individual runs.

use crate::config::schema::RetryConfig;
use crate::healer::SelectorHealer;
use crate::history::{ErrorHistory, ErrorRecord, ErrorStats};
use crate::resolution::HealRequest;
use async_trait::async_trait;
use chrono::Utc;
use mend_common::dom::truncate_chars;
use mend_common::error::DEFAULT_MAX_BACKOFF_MS;
use mend_common::{ActionFailure, DomSnapshot, ErrorCategory, backoff_ms, classify};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

const LOG_MESSAGE_CHARS: usize = 100;

/// Page state handed to the healer when an element goes missing.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    pub dom: DomSnapshot,
    pub url: String,
    pub title: String,
}

/// A single browser action the controller can retry.
#[async_trait]
pub trait BrowserAction: Send {
    type Output: Send;

    /// Perform the action against `selector`.
    async fn perform(&mut self, selector: &str) -> Result<Self::Output, ActionFailure>;

    /// Capture the page for healing. `None` skips healing for this attempt.
    async fn capture(&mut self) -> Option<PageSnapshot> {
        None
    }
}

/// Adapts a closure into a [`BrowserAction`] that never captures the page.
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F, Fut, T, E> BrowserAction for FnAction<F>
where
    F: FnMut(String) -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: fmt::Display + Send,
{
    type Output = T;

    async fn perform(&mut self, selector: &str) -> Result<T, ActionFailure> {
        (self.0)(selector.to_string())
            .await
            .map_err(|e| ActionFailure::from_error(&e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting,
    Retrying,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub max_backoff_ms: u64,
    /// Heals allowed per action.
    pub max_healing_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_healing_attempts: 2,
        }
    }

    /// One retry, for quick smoke runs.
    pub fn simple() -> Self {
        Self::new(1)
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_backoff_ms: config.max_backoff_ms,
            max_healing_attempts: config.max_healing_attempts,
        }
    }
}

/// Why an action gave up, with static advice for the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub category: ErrorCategory,
    pub message: String,
    pub retry_count: u32,
    pub recovery_strategies: Vec<String>,
}

impl FailureReport {
    fn new(category: ErrorCategory, message: &str, retry_count: u32) -> Self {
        Self {
            category,
            message: message.to_string(),
            retry_count,
            recovery_strategies: category
                .recovery_strategies()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} after {} retries: {}",
            self.category, self.retry_count, self.message
        )?;
        writeln!(f, "Recovery suggestions:")?;
        for (i, strategy) in self.recovery_strategies.iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, strategy)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// `Success` or `Failed`.
    pub state: AttemptState,
    pub value: Option<T>,
    /// Selector in use when the controller stopped; differs from the input after a heal.
    pub selector: String,
    pub attempts: u32,
    pub retry_count: u32,
    pub heals: u32,
    pub logs: Vec<String>,
    pub failure: Option<FailureReport>,
}

impl<T> RetryOutcome<T> {
    pub fn success(&self) -> bool {
        self.state == AttemptState::Success
    }
}

pub struct RetryController {
    policy: RetryPolicy,
    history: ErrorHistory,
}

impl Default for RetryController {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            history: ErrorHistory::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Failures from every run so far.
    pub fn history(&self) -> &ErrorHistory {
        &self.history
    }

    pub fn error_stats(&self) -> ErrorStats {
        self.history.stats()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Drive `action` until it succeeds, hits a non-retryable failure, or
    /// exhausts `max_retries` (so at most `max_retries + 1` attempts).
    pub async fn run<A: BrowserAction>(
        &mut self,
        action: &mut A,
        selector: &str,
        action_hint: &str,
        mut healer: Option<&mut SelectorHealer>,
    ) -> RetryOutcome<A::Output> {
        let max_retries = self.policy.max_retries;
        let mut selector = selector.to_string();
        let mut state = AttemptState::Attempting;
        let mut retry_count = 0;
        let mut attempts = 0;
        let mut heals = 0;
        let mut logs = Vec::new();

        loop {
            attempts += 1;
            debug!("{:?} {} (attempt {})", state, selector, attempts);

            let failure = match action.perform(&selector).await {
                Ok(value) => {
                    if retry_count > 0 {
                        logs.push(format!("[OK] Succeeded after {} retries", retry_count));
                    }
                    return RetryOutcome {
                        state: AttemptState::Success,
                        value: Some(value),
                        selector,
                        attempts,
                        retry_count,
                        heals,
                        logs,
                        failure: None,
                    };
                }
                Err(failure) => failure,
            };

            let category = classify(&failure);
            let short = truncate_chars(&failure.message, LOG_MESSAGE_CHARS);
            self.history.record(ErrorRecord {
                category,
                message: failure.message.clone(),
                selector: selector.clone(),
                action_hint: action_hint.to_string(),
                retry_count,
                timestamp: Utc::now(),
            });

            if !category.is_retryable() || retry_count >= max_retries {
                let reason = if category.is_retryable() {
                    "retries exhausted"
                } else {
                    "not retryable"
                };
                logs.push(format!("[FAILED] {} ({}): {}", category, reason, short));
                warn!("Action on {} failed: {} ({})", selector, category, reason);
                return RetryOutcome {
                    state: AttemptState::Failed,
                    value: None,
                    selector,
                    attempts,
                    retry_count,
                    heals,
                    logs,
                    failure: Some(FailureReport::new(category, &failure.message, retry_count)),
                };
            }

            let wait = backoff_ms(category, retry_count, self.policy.max_backoff_ms);
            retry_count += 1;
            state = AttemptState::Retrying;
            logs.push(format!(
                "[RETRY {}/{}] {}: {}",
                retry_count, max_retries, category, short
            ));
            warn!(
                "Retrying {} in {}ms ({}/{}): {}",
                selector, wait, retry_count, max_retries, category
            );

            if wait > 0 {
                tokio::time::sleep(Duration::from_millis(wait)).await;
            }

            if category == ErrorCategory::ElementNotFound
                && heals < self.policy.max_healing_attempts
                && let Some(healer) = healer.as_deref_mut()
            {
                let Some(page) = action.capture().await else {
                    logs.push("[HEAL] Skipped: no page snapshot".to_string());
                    continue;
                };
                heals += 1;
                let healed = healer
                    .heal(&HealRequest {
                        dom: &page.dom,
                        failed_selector: &selector,
                        action_hint,
                        page_url: &page.url,
                        page_title: &page.title,
                    })
                    .await;

                if healed != selector {
                    logs.push(format!("[HEAL] {} → {}", selector, healed));
                    info!("Retrying with healed selector {}", healed);
                    selector = healed;
                } else {
                    logs.push(format!("[HEAL] No better selector than {}", selector));
                }
            }
        }
    }
}

/// Run a closure with retries and no healing, returning `(success, logs)`.
pub async fn execute_with_retry<F, Fut, T, E>(action_fn: F, max_retries: u32) -> (bool, Vec<String>)
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<T, E>> + Send,
    T: Send,
    E: fmt::Display + Send,
{
    let mut action_fn = action_fn;
    let mut action = FnAction(move |_selector: String| action_fn());
    let outcome = RetryController::new(RetryPolicy::new(max_retries))
        .run(&mut action, "", "", None)
        .await;
    (outcome.success(), outcome.logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_presets() {
        assert_eq!(RetryPolicy::default().max_retries, 3);
        assert_eq!(RetryPolicy::simple().max_retries, 1);
        assert_eq!(RetryPolicy::default().max_backoff_ms, 10_000);
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_retries: 5,
            max_backoff_ms: 2000,
            max_healing_attempts: 1,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.max_backoff_ms, 2000);
        assert_eq!(policy.max_healing_attempts, 1);
    }

    #[test]
    fn test_failure_report_display_lists_advice() {
        let report = FailureReport::new(ErrorCategory::AssertionError, "expected 3 got 2", 0);
        let text = report.to_string();
        assert!(text.starts_with("Assertion Failure after 0 retries: expected 3 got 2"));
        assert!(text.contains("1. Verify expected value is correct"));
        assert_eq!(report.recovery_strategies.len(), 4);
    }
}
