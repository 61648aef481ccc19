pub mod ai;
pub mod heuristic;
pub mod result;

pub use ai::{AiResolver, AiResolverError, reduce_dom, sanitize_selector};
pub use heuristic::HeuristicResolver;
pub use result::{ElementCandidate, HealRequest};

use async_trait::async_trait;
use mend_common::{ActionIntent, DomSnapshot};

/// Offline resolver: inspects the snapshot and nothing else.
pub trait CandidateSource: Send + Sync {
    fn candidate(&self, dom: &DomSnapshot, intent: ActionIntent) -> Option<ElementCandidate>;
}

/// Remote resolver that asks an external service for a selector.
///
/// `Ok(None)` means the service had no answer; `Err` means the request itself
/// failed. Callers treat both as "no candidate".
#[async_trait]
pub trait SelectorOracle: Send + Sync {
    async fn suggest(&self, req: &HealRequest<'_>) -> Result<Option<String>, AiResolverError>;
}
