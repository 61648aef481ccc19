//! Self-healing element location for browser automation.
//!
//! - [`SelectorCache`] remembers selectors that were healed before, per domain.
//! - [`HeuristicResolver`] and [`AiResolver`] propose replacements from a
//!   [`DomSnapshot`] of the page.
//! - [`SelectorHealer`] runs cache, heuristic and AI in that order.
//! - [`RetryController`] retries a [`BrowserAction`] with backoff, heals missing
//!   elements between attempts and keeps an [`ErrorHistory`].
//!
//! The crate does not talk to a browser. Callers implement [`BrowserAction`]
//! for their driver and take per-verb timeouts from
//! [`config::TimeoutConfig::timeout_for`], loaded through
//! [`config::ConfigLoader`].

pub mod cache;
pub mod config;
pub mod healer;
pub mod history;
pub mod resolution;
pub mod retry;

pub use cache::{HealMethod, SelectorCache};
pub use healer::{HealingAttempt, HealingStats, SelectorHealer};
pub use history::{ErrorHistory, ErrorRecord, ErrorStats};
pub use resolution::{AiResolver, HealRequest, HeuristicResolver};
pub use retry::{
    BrowserAction, FnAction, PageSnapshot, RetryController, RetryOutcome, RetryPolicy,
    execute_with_retry,
};

pub use mend_common::{ActionFailure, ActionIntent, DomSnapshot, ErrorCategory};
