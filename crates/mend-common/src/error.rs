//! Action Failure Taxonomy
//!
//! Maps the heterogeneous failures of a browser-automation driver onto a small
//! closed set of categories, and attaches the retry policy and recovery advice
//! for each category.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for a single backoff wait.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Timeout,
    ElementNotFound,
    NavigationError,
    AssertionError,
    NetworkError,
    PermissionError,
    FileError,
    IframeError,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::Timeout,
        ErrorCategory::ElementNotFound,
        ErrorCategory::NavigationError,
        ErrorCategory::AssertionError,
        ErrorCategory::NetworkError,
        ErrorCategory::PermissionError,
        ErrorCategory::FileError,
        ErrorCategory::IframeError,
        ErrorCategory::Unknown,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCategory::NavigationError => "NAVIGATION_ERROR",
            ErrorCategory::AssertionError => "ASSERTION_ERROR",
            ErrorCategory::NetworkError => "NETWORK_ERROR",
            ErrorCategory::PermissionError => "PERMISSION_ERROR",
            ErrorCategory::FileError => "FILE_ERROR",
            ErrorCategory::IframeError => "IFRAME_ERROR",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "Timeout Error",
            ErrorCategory::ElementNotFound => "Element Not Found",
            ErrorCategory::NavigationError => "Navigation Error",
            ErrorCategory::AssertionError => "Assertion Failure",
            ErrorCategory::NetworkError => "Network Error",
            ErrorCategory::PermissionError => "Permission Error",
            ErrorCategory::FileError => "File Operation Error",
            ErrorCategory::IframeError => "Iframe Error",
            ErrorCategory::Unknown => "Unknown Error",
        }
    }

    /// Maps a structured driver error code. Returns `None` for codes outside
    /// the taxonomy so the caller can fall back to message matching.
    pub fn from_code(code: &str) -> Option<Self> {
        let category = match code {
            "TIMEOUT" => ErrorCategory::Timeout,
            "ELEMENT_NOT_FOUND" | "ELEMENT_STALE" => ErrorCategory::ElementNotFound,
            "NAVIGATION_ERROR" => ErrorCategory::NavigationError,
            "ASSERTION_ERROR" => ErrorCategory::AssertionError,
            "NETWORK_ERROR" | "CONNECTION_LOST" => ErrorCategory::NetworkError,
            "PERMISSION_ERROR" => ErrorCategory::PermissionError,
            "FILE_ERROR" => ErrorCategory::FileError,
            "IFRAME_ERROR" => ErrorCategory::IframeError,
            "UNKNOWN" => ErrorCategory::Unknown,
            _ => return None,
        };
        Some(category)
    }

    pub fn retry_decision(&self) -> RetryDecision {
        let (retryable, base_backoff_ms) = match self {
            ErrorCategory::Timeout => (true, 2000),
            ErrorCategory::ElementNotFound => (true, 1000),
            ErrorCategory::NetworkError => (true, 3000),
            ErrorCategory::NavigationError => (true, 2000),
            ErrorCategory::AssertionError => (false, 0),
            ErrorCategory::PermissionError => (false, 0),
            ErrorCategory::FileError => (true, 500),
            ErrorCategory::IframeError => (true, 1000),
            ErrorCategory::Unknown => (true, 1000),
        };
        RetryDecision {
            retryable,
            base_backoff_ms,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_decision().retryable
    }

    /// Static advice shown to the caller when an action fails for good.
    pub fn recovery_strategies(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::Timeout => &[
                "Increase timeout duration",
                "Wait for network idle before action",
                "Check if page is still loading",
                "Verify element selector is correct",
            ],
            ErrorCategory::ElementNotFound => &[
                "Use AI healing to find correct selector",
                "Wait longer for element to appear",
                "Check if element is in iframe",
                "Verify page has loaded completely",
                "Try alternative selectors",
            ],
            ErrorCategory::NavigationError => &[
                "Check internet connection",
                "Verify URL is correct",
                "Try navigation with different wait strategy",
                "Check for redirects or popups",
            ],
            ErrorCategory::AssertionError => &[
                "Verify expected value is correct",
                "Check if page content has changed",
                "Wait for dynamic content to load",
                "Review test logic",
            ],
            ErrorCategory::NetworkError => &[
                "Check network connectivity",
                "Verify server is accessible",
                "Try with longer timeout",
                "Check for CORS issues",
            ],
            ErrorCategory::PermissionError => &[
                "Check browser permissions",
                "Verify file paths are accessible",
                "Run with appropriate privileges",
            ],
            ErrorCategory::FileError => &[
                "Verify file path exists",
                "Check file permissions",
                "Ensure correct file format",
                "Verify upload/download directory exists",
            ],
            ErrorCategory::IframeError => &[
                "Use frame_locator for iframe access",
                "Wait for iframe to load",
                "Verify iframe selector is correct",
                "Check iframe permissions",
            ],
            ErrorCategory::Unknown => &[
                "Review error message for clues",
                "Check browser console logs",
                "Verify test environment",
                "Try with headed mode for debugging",
            ],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retryable: bool,
    pub base_backoff_ms: u64,
}

/// Wait before the next attempt: `min(base * 2^retry_count, cap_ms)`.
pub fn backoff_ms(category: ErrorCategory, retry_count: u32, cap_ms: u64) -> u64 {
    let base = category.retry_decision().base_backoff_ms;
    let factor = 2u64.checked_pow(retry_count).unwrap_or(u64::MAX);
    base.saturating_mul(factor).min(cap_ms)
}

/// A failed browser action as reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionFailure {
    pub message: String,
    /// Structured error code, when the driver exposes one.
    pub code: Option<String>,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    pub fn from_error<E: fmt::Display + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }
}

impl From<String> for ActionFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ActionFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Classify a failure into the closed taxonomy.
///
/// A recognised structured code wins; otherwise the lowercased message is
/// matched against substring rules in a fixed order. Note that "navigation"
/// lands in `NetworkError`: `NavigationError` is only produced from a code.
pub fn classify(failure: &ActionFailure) -> ErrorCategory {
    if let Some(category) = failure.code.as_deref().and_then(ErrorCategory::from_code) {
        return category;
    }
    classify_message(&failure.message)
}

pub fn classify_message(message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| msg.contains(n));

    if has(&["timeout", "timed out"]) {
        ErrorCategory::Timeout
    } else if has(&["not found", "no such element"]) {
        ErrorCategory::ElementNotFound
    } else if has(&["navigation", "net::"]) {
        ErrorCategory::NetworkError
    } else if has(&["assertion", "expected"]) {
        ErrorCategory::AssertionError
    } else if has(&["permission", "denied"]) {
        ErrorCategory::PermissionError
    } else if has(&["file", "upload", "download"]) {
        ErrorCategory::FileError
    } else if has(&["iframe", "frame"]) {
        ErrorCategory::IframeError
    } else {
        ErrorCategory::Unknown
    }
}
