pub mod dom;
pub mod error;
pub mod intent;

pub use dom::{DomNode, DomSnapshot};
pub use error::{ActionFailure, ErrorCategory, RetryDecision, backoff_ms, classify};
pub use intent::ActionIntent;
