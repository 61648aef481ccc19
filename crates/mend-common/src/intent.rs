use serde::{Deserialize, Serialize};

const CLICK_TAGS: &[&str] = &["button", "a", "input"];
const FILL_TAGS: &[&str] = &["input", "textarea"];
const SELECT_TAGS: &[&str] = &["select"];
const ANY_TAGS: &[&str] = &["button", "a", "input", "textarea", "select"];

/// What the caller wants to do with the element, derived from the free-text
/// action hint ("click submit", "type into username").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionIntent {
    Click,
    Fill,
    Select,
    Unspecified,
}

impl ActionIntent {
    /// Classify a hint by keyword. Checked in order: click, fill, select.
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| hint.contains(w));

        if has(&["click", "press", "tap"]) {
            ActionIntent::Click
        } else if has(&["type", "fill"]) {
            ActionIntent::Fill
        } else if has(&["select", "choose"]) {
            ActionIntent::Select
        } else {
            ActionIntent::Unspecified
        }
    }

    /// Tags an element must have to be a candidate for this intent.
    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            ActionIntent::Click => CLICK_TAGS,
            ActionIntent::Fill => FILL_TAGS,
            ActionIntent::Select => SELECT_TAGS,
            ActionIntent::Unspecified => ANY_TAGS,
        }
    }

    pub fn accepts(&self, tag: &str) -> bool {
        self.tags().contains(&tag)
    }
}
