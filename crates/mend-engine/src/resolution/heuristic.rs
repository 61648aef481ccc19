use super::{CandidateSource, ElementCandidate};
use mend_common::dom::truncate_chars;
use mend_common::{ActionIntent, DomNode, DomSnapshot};

pub const DEFAULT_SCAN_LIMIT: usize = 20;

const SCORE_ID: u32 = 10;
const SCORE_DATA_ATTR: u32 = 8;
const SCORE_NAME: u32 = 7;
const SCORE_TEXT: u32 = 6;
const SCORE_CLASS: u32 = 5;
const SCORE_TAG: u32 = 1;

const TEXT_SELECTOR_CHARS: usize = 30;

/// Picks the most stable-looking selector among the elements that fit the
/// intended action. Pure and deterministic: ties go to the element that comes
/// first in the document.
#[derive(Debug, Clone)]
pub struct HeuristicResolver {
    scan_limit: usize,
}

impl Default for HeuristicResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_LIMIT)
    }
}

impl HeuristicResolver {
    pub fn new(scan_limit: usize) -> Self {
        Self { scan_limit }
    }

    pub fn resolve(&self, dom: &DomSnapshot, intent: ActionIntent) -> Option<ElementCandidate> {
        let mut best: Option<ElementCandidate> = None;

        for node in dom
            .nodes
            .iter()
            .filter(|n| intent.accepts(&n.tag))
            .take(self.scan_limit)
        {
            let candidate = score_element(node);
            if best.as_ref().is_none_or(|b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        best
    }
}

impl CandidateSource for HeuristicResolver {
    fn candidate(&self, dom: &DomSnapshot, intent: ActionIntent) -> Option<ElementCandidate> {
        self.resolve(dom, intent)
    }
}

/// Build the best selector for one element. The first matching signal wins.
pub fn score_element(node: &DomNode) -> ElementCandidate {
    let tag = node.tag.as_str();

    if let Some(id) = node.attr("id").filter(|v| !v.is_empty()) {
        return ElementCandidate::new(format!("#{}", id), SCORE_ID);
    }

    if let Some((name, value)) = node.first_data_attribute() {
        return ElementCandidate::new(
            format!("[{}='{}']", name, escape_quotes(value)),
            SCORE_DATA_ATTR,
        );
    }

    if let Some(name) = node.attr("name").filter(|v| !v.is_empty()) {
        return ElementCandidate::new(
            format!("{}[name='{}']", tag, escape_quotes(name)),
            SCORE_NAME,
        );
    }

    let classes: Vec<&str> = node.classes().take(2).collect();
    if !classes.is_empty() {
        return ElementCandidate::new(format!("{}.{}", tag, classes.join(".")), SCORE_CLASS);
    }

    let text = node.text.trim();
    if matches!(tag, "button" | "a") && !text.is_empty() {
        return ElementCandidate::new(
            format!(
                "{}:has-text('{}')",
                tag,
                escape_quotes(truncate_chars(text, TEXT_SELECTOR_CHARS))
            ),
            SCORE_TEXT,
        );
    }

    ElementCandidate::new(tag, SCORE_TAG)
}

fn escape_quotes(value: &str) -> String {
    value.replace('\'', "\\'")
}
