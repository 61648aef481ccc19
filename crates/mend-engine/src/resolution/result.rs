use mend_common::DomSnapshot;

/// A selector proposed by the heuristic scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCandidate {
    pub selector: String,
    /// Higher is more stable: id > data-* > name > text > class > bare tag.
    pub score: u32,
}

impl ElementCandidate {
    pub fn new(selector: impl Into<String>, score: u32) -> Self {
        Self {
            selector: selector.into(),
            score,
        }
    }
}

/// Everything a resolver may look at when healing one selector.
#[derive(Debug, Clone, Copy)]
pub struct HealRequest<'a> {
    pub dom: &'a DomSnapshot,
    pub failed_selector: &'a str,
    pub action_hint: &'a str,
    pub page_url: &'a str,
    pub page_title: &'a str,
}
