use async_trait::async_trait;
use mend_engine::retry::AttemptState;
use mend_engine::{
    ActionFailure, BrowserAction, DomSnapshot, ErrorCategory, FnAction, HeuristicResolver,
    PageSnapshot, RetryController, RetryPolicy, SelectorCache, SelectorHealer,
    execute_with_retry,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Replays a fixed list of results and records every selector it was given.
struct ScriptedAction {
    results: VecDeque<Result<&'static str, ActionFailure>>,
    selectors: Vec<String>,
    page: Option<PageSnapshot>,
    captures: usize,
}

impl ScriptedAction {
    fn new(results: Vec<Result<&'static str, ActionFailure>>) -> Self {
        Self {
            results: results.into(),
            selectors: Vec::new(),
            page: None,
            captures: 0,
        }
    }

    fn with_page(mut self, html: &str) -> Self {
        self.page = Some(PageSnapshot {
            dom: DomSnapshot::from_html(html),
            url: "https://shop.example.com/cart".into(),
            title: "Cart".into(),
        });
        self
    }
}

#[async_trait]
impl BrowserAction for ScriptedAction {
    type Output = &'static str;

    async fn perform(&mut self, selector: &str) -> Result<&'static str, ActionFailure> {
        self.selectors.push(selector.to_string());
        self.results
            .pop_front()
            .unwrap_or_else(|| Err(ActionFailure::new("script exhausted")))
    }

    async fn capture(&mut self) -> Option<PageSnapshot> {
        self.captures += 1;
        self.page.clone()
    }
}

fn fail(message: &str) -> Result<&'static str, ActionFailure> {
    Err(ActionFailure::new(message))
}

const PAGE: &str = r#"<div><button id="submit-btn">Pay</button></div>"#;

#[tokio::test(start_paused = true)]
async fn test_first_try_success() {
    let mut action = ScriptedAction::new(vec![Ok("clicked")]);
    let outcome = RetryController::default()
        .run(&mut action, "#go", "click", None)
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.value, Some("clicked"));
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.logs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_assertion_failure_stops_immediately() {
    let mut action = ScriptedAction::new(vec![
        fail("AssertionError: expected 'Welcome' but got 'Login'"),
        Ok("unreachable"),
    ]);
    let start = Instant::now();
    let outcome = RetryController::default()
        .run(&mut action, "h1", "check heading", None)
        .await;

    assert_eq!(outcome.state, AttemptState::Failed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.retry_count, 0);
    assert_eq!(start.elapsed(), Duration::ZERO);

    let report = outcome.failure.unwrap();
    assert_eq!(report.category, ErrorCategory::AssertionError);
    assert!(!report.recovery_strategies.is_empty());
    assert!(outcome.logs[0].starts_with("[FAILED] Assertion Failure (not retryable)"));
}

#[tokio::test(start_paused = true)]
async fn test_permission_failure_is_not_retried() {
    let mut action = ScriptedAction::new(vec![fail("Permission denied for clipboard")]);
    let outcome = RetryController::default()
        .run(&mut action, "#copy", "click copy", None)
        .await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.failure.map(|f| f.category),
        Some(ErrorCategory::PermissionError)
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_exhaust_retries_with_backoff() {
    let mut action = ScriptedAction::new(vec![
        fail("Timeout 5000ms exceeded"),
        fail("Timeout 5000ms exceeded"),
        fail("Timeout 5000ms exceeded"),
        fail("Timeout 5000ms exceeded"),
        Ok("too late"),
    ]);
    let start = Instant::now();
    let outcome = RetryController::new(RetryPolicy::new(3))
        .run(&mut action, "#slow", "click", None)
        .await;

    assert_eq!(outcome.state, AttemptState::Failed);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.retry_count, 3);
    // 2s, 4s, 8s
    assert_eq!(start.elapsed(), Duration::from_millis(14_000));

    let retries: Vec<_> = outcome
        .logs
        .iter()
        .filter(|l| l.starts_with("[RETRY"))
        .collect();
    assert_eq!(retries.len(), 3);
    assert!(retries[0].starts_with("[RETRY 1/3] Timeout Error: Timeout 5000ms"));
    assert!(outcome.logs.last().unwrap().contains("retries exhausted"));
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped() {
    let mut action = ScriptedAction::new(vec![
        fail("net::ERR_CONNECTION_RESET"),
        fail("net::ERR_CONNECTION_RESET"),
        fail("net::ERR_CONNECTION_RESET"),
        Ok("loaded"),
    ]);
    let start = Instant::now();
    let outcome = RetryController::new(RetryPolicy::new(3))
        .run(&mut action, "", "goto", None)
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.attempts, 4);
    // 3s, 6s, then 12s capped to 10s
    assert_eq!(start.elapsed(), Duration::from_millis(19_000));
    assert_eq!(outcome.logs.last().unwrap(), "[OK] Succeeded after 3 retries");
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_single_attempt() {
    let mut action = ScriptedAction::new(vec![fail("Timeout 30000ms exceeded"), Ok("x")]);
    let outcome = RetryController::new(RetryPolicy::new(0))
        .run(&mut action, "#a", "click", None)
        .await;
    assert_eq!(outcome.attempts, 1);
    assert!(!outcome.success());
}

#[tokio::test(start_paused = true)]
async fn test_missing_element_is_healed_before_retry() {
    let mut action = ScriptedAction::new(vec![
        fail("Element not found: #old-submit"),
        Ok("clicked"),
    ])
    .with_page(PAGE);
    let mut healer = SelectorHealer::new()
        .with_cache(SelectorCache::in_memory())
        .with_heuristic(Box::new(HeuristicResolver::default()));

    let start = Instant::now();
    let outcome = RetryController::default()
        .run(&mut action, "#old-submit", "click submit", Some(&mut healer))
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.selector, "#submit-btn");
    assert_eq!(outcome.heals, 1);
    assert_eq!(action.selectors, vec!["#old-submit", "#submit-btn"]);
    assert_eq!(start.elapsed(), Duration::from_millis(1_000));
    assert!(
        outcome
            .logs
            .iter()
            .any(|l| l == "[HEAL] #old-submit → #submit-btn")
    );
    assert_eq!(healer.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_healing_attempts_are_bounded() {
    let mut action = ScriptedAction::new(vec![
        fail("no such element"),
        fail("no such element"),
        fail("no such element"),
        fail("no such element"),
    ])
    .with_page(PAGE);
    let mut healer = SelectorHealer::new().with_heuristic(Box::new(HeuristicResolver::default()));

    let outcome = RetryController::default()
        .run(&mut action, "#old-submit", "click", Some(&mut healer))
        .await;

    assert!(!outcome.success());
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.heals, 2);
    assert_eq!(action.captures, 2);
    assert_eq!(healer.attempts().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_snapshot_skips_healing() {
    let mut action = ScriptedAction::new(vec![fail("Element not found: #a"), Ok("ok")]);
    let mut healer = SelectorHealer::new().with_heuristic(Box::new(HeuristicResolver::default()));

    let outcome = RetryController::default()
        .run(&mut action, "#a", "click", Some(&mut healer))
        .await;

    assert!(outcome.success());
    assert_eq!(outcome.selector, "#a");
    assert_eq!(outcome.heals, 0);
    assert!(outcome.logs.iter().any(|l| l.contains("Skipped: no page snapshot")));
}

#[tokio::test(start_paused = true)]
async fn test_missing_element_without_healer_just_retries() {
    let mut action = ScriptedAction::new(vec![fail("Element not found: #a"), Ok("ok")]).with_page(PAGE);
    let outcome = RetryController::default()
        .run(&mut action, "#a", "click", None)
        .await;

    assert!(outcome.success());
    assert_eq!(action.captures, 0);
    assert_eq!(action.selectors, vec!["#a", "#a"]);
}

#[tokio::test(start_paused = true)]
async fn test_structured_code_overrides_message() {
    let mut action = ScriptedAction::new(vec![
        Err(ActionFailure::with_code("PERMISSION_ERROR", "Timeout while waiting")),
        Ok("ok"),
    ]);
    let outcome = RetryController::default()
        .run(&mut action, "#a", "click", None)
        .await;
    assert_eq!(outcome.attempts, 1);
    assert_eq!(
        outcome.failure.map(|f| f.category),
        Some(ErrorCategory::PermissionError)
    );
}

#[tokio::test(start_paused = true)]
async fn test_fn_action_adapts_closures() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut action = FnAction(move |selector: String| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(format!("Unknown glitch on {}", selector))
            } else {
                Ok(selector.len())
            }
        }
    });

    let outcome = RetryController::default()
        .run(&mut action, "#abc", "click", None)
        .await;
    assert_eq!(outcome.value, Some(4));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execute_with_retry_reports_logs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let (ok, logs) = execute_with_retry(
        move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("net::ERR_CONNECTION_RESET")
                } else {
                    Ok(())
                }
            }
        },
        3,
    )
    .await;

    assert!(ok);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(logs.iter().filter(|l| l.starts_with("[RETRY")).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execute_with_retry_gives_up() {
    let (ok, logs) = execute_with_retry(
        || async { Err::<(), _>("Assertion failed: expected 2 items") },
        3,
    )
    .await;
    assert!(!ok);
    assert_eq!(logs.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_error_history_accumulates_across_runs() {
    let mut controller = RetryController::new(RetryPolicy::new(1));

    let mut flaky = ScriptedAction::new(vec![fail("Timeout 5000ms exceeded"), Ok("clicked")]);
    assert!(controller.run(&mut flaky, "#a", "click", None).await.success());

    let mut stuck = ScriptedAction::new(vec![
        fail("Timeout 5000ms exceeded"),
        fail("Timeout 5000ms exceeded"),
    ]);
    assert!(!controller.run(&mut stuck, "#b", "type name", None).await.success());

    let mut denied = ScriptedAction::new(vec![fail("Permission denied for clipboard")]);
    controller.run(&mut denied, "#copy", "click copy", None).await;

    let records = controller.history().records();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0].selector, "#a");
    assert_eq!(records[0].action_hint, "click");
    assert_eq!(records[0].retry_count, 0);
    assert_eq!(records[2].selector, "#b");
    assert_eq!(records[2].retry_count, 1);
    assert_eq!(records[3].category, ErrorCategory::PermissionError);
    assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let stats = controller.error_stats();
    assert_eq!(stats.total_errors, 4);
    assert_eq!(stats.by_category[&ErrorCategory::Timeout], 3);
    assert_eq!(stats.by_category[&ErrorCategory::PermissionError], 1);
    assert_eq!(stats.most_common, Some(ErrorCategory::Timeout));
}

#[tokio::test(start_paused = true)]
async fn test_clear_history_resets_stats() {
    let mut controller = RetryController::new(RetryPolicy::new(0));
    let mut action = ScriptedAction::new(vec![fail("Timeout 5000ms exceeded")]);
    controller.run(&mut action, "#a", "click", None).await;
    assert_eq!(controller.history().len(), 1);

    controller.clear_history();
    assert!(controller.history().is_empty());
    let stats = controller.error_stats();
    assert_eq!(stats.total_errors, 0);
    assert!(stats.by_category.is_empty());
    assert_eq!(stats.most_common, None);

    let mut action = ScriptedAction::new(vec![fail("AssertionError: expected 1 got 2")]);
    controller.run(&mut action, "h1", "check", None).await;
    assert_eq!(
        controller.error_stats().most_common,
        Some(ErrorCategory::AssertionError)
    );
}
