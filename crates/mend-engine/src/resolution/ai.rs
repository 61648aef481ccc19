//! AI Resolver
//!
//! Last-resort healing through a hosted chat-completion model. The page is
//! reduced to its interactive elements before it leaves the process, and the
//! model's reply is sanitized down to a single selector.

use super::{HealRequest, SelectorOracle};
use crate::config::schema::AiConfig;
use async_trait::async_trait;
use mend_common::DomSnapshot;
use mend_common::dom::truncate_chars;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const INTERACTIVE_TAGS: &[&str] = &["button", "a", "input", "textarea", "select", "form"];
const MAX_CONTEXT_CHARS: usize = 500;

const SYSTEM_PROMPT: &str =
    "You are a CSS selector expert. Return only the selector, nothing else.";

#[derive(Debug, thiserror::Error)]
pub enum AiResolverError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Response had no choices")]
    EmptyResponse,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

pub struct AiResolver {
    client: reqwest::Client,
    config: AiConfig,
    api_key: Option<String>,
}

impl AiResolver {
    /// Build from config, reading the API key from `config.api_key_env`.
    pub fn from_config(config: &AiConfig) -> Result<Self, AiResolverError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(
        config: &AiConfig,
        api_key: Option<String>,
    ) -> Result<Self, AiResolverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Like [`SelectorOracle::suggest`], with every failure folded into `None`.
    pub async fn resolve(&self, req: &HealRequest<'_>) -> Option<String> {
        match self.suggest(req).await {
            Ok(selector) => selector,
            Err(e) => {
                warn!("AI selector resolution failed: {}", e);
                None
            }
        }
    }

    pub fn build_prompt(&self, req: &HealRequest<'_>) -> String {
        let snippet = reduce_dom(req.dom, self.config.max_elements);
        let snippet = truncate_chars(&snippet, self.config.max_snippet_chars);
        let or_unknown = |s: &str| if s.is_empty() { "Unknown".to_string() } else { s.to_string() };

        format!(
            "You generate CSS selectors for browser automation.\n\
             \n\
             CONTEXT:\n\
             - Page URL: {url}\n\
             - Page Title: {title}\n\
             - Failed Selector: {failed}\n\
             - Intended Action: {hint}\n\
             \n\
             HTML (interactive elements and their parents):\n\
             {snippet}\n\
             \n\
             TASK:\n\
             Find the element the intended action refers to and return the most stable selector for it.\n\
             \n\
             PREFERENCE ORDER:\n\
             1. id (e.g. #submit-button)\n\
             2. unique data attribute (e.g. [data-testid='login'])\n\
             3. unique name (e.g. input[name='email'])\n\
             4. unique class combination (e.g. .btn.btn-primary.submit)\n\
             5. text (e.g. button:has-text('Login'))\n\
             6. structure (e.g. form > button[type='submit'])\n\
             \n\
             RULES:\n\
             - Return exactly one selector and nothing else\n\
             - Prefer short selectors that match a single element\n\
             - Avoid nth-child unless nothing else is unique\n\
             \n\
             SELECTOR:",
            url = or_unknown(req.page_url),
            title = or_unknown(req.page_title),
            failed = req.failed_selector,
            hint = req.action_hint,
            snippet = snippet,
        )
    }
}

#[async_trait]
impl SelectorOracle for AiResolver {
    async fn suggest(&self, req: &HealRequest<'_>) -> Result<Option<String>, AiResolverError> {
        let Some(api_key) = self.api_key.as_deref() else {
            debug!("No API key in {}, skipping AI resolution", self.config.api_key_env);
            return Ok(None);
        };

        let prompt = self.build_prompt(req);
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: self.config.temperature,
        };

        let response: ChatResponse = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiResolverError::EmptyResponse)?;

        let selector = sanitize_selector(&content);
        debug!("AI suggested {:?} for {}", selector, req.failed_selector);
        Ok(selector)
    }
}

/// Interactive elements plus their immediate parents, one fragment per line.
///
/// Takes the first `max_elements` interactive elements in document order;
/// siblings that share a parent contribute that parent once.
pub fn reduce_dom(dom: &DomSnapshot, max_elements: usize) -> String {
    let mut seen = HashSet::new();
    let mut fragments = Vec::new();

    for (index, node) in dom
        .iter()
        .filter(|(_, n)| INTERACTIVE_TAGS.contains(&n.tag.as_str()))
        .take(max_elements)
    {
        let context = node.parent.unwrap_or(index);
        if seen.insert(context) {
            fragments.push(dom.outer_html(context, MAX_CONTEXT_CHARS));
        }
    }

    fragments.join("\n")
}

/// Reduce a model reply to one selector.
///
/// Prefers the contents of a fenced code block (dropping a language tag),
/// keeps only the first line, strips wrapping quotes or backticks and
/// normalizes double quotes to single quotes. Blank results are `None`.
pub fn sanitize_selector(raw: &str) -> Option<String> {
    let mut text = raw.trim();

    if text.contains("```") {
        let parts: Vec<&str> = text.split("```").collect();
        let fenced = parts
            .iter()
            .copied()
            .skip(1)
            .step_by(2)
            .map(strip_language_tag)
            .find(|p| !p.is_empty());
        text = match fenced {
            Some(inner) => inner,
            None => parts.iter().copied().map(str::trim).find(|p| !p.is_empty())?,
        };
    }

    let first_line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted = first_line
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();

    if unquoted.is_empty() {
        return None;
    }
    Some(unquoted.replace('"', "'"))
}

fn strip_language_tag(block: &str) -> &str {
    let block = block.trim_matches(|c| c == '\n' || c == '\r');
    match block.split_once('\n') {
        Some((first, rest)) if is_language_tag(first.trim()) => rest.trim(),
        _ => block.trim(),
    }
}

fn is_language_tag(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_selector() {
        assert_eq!(sanitize_selector("  #submit-btn \n"), Some("#submit-btn".into()));
    }

    #[test]
    fn test_sanitize_fenced_with_language() {
        assert_eq!(
            sanitize_selector("```css\n#submit-btn\n```"),
            Some("#submit-btn".into())
        );
    }

    #[test]
    fn test_sanitize_prefers_fenced_block_over_chatter() {
        assert_eq!(
            sanitize_selector("Here you go:\n```\n.btn.primary\n```\nHope it helps"),
            Some(".btn.primary".into())
        );
    }

    #[test]
    fn test_sanitize_strips_quotes_and_normalizes() {
        assert_eq!(
            sanitize_selector(r#""button[type="submit"]""#),
            Some("button[type='submit']".into())
        );
        assert_eq!(sanitize_selector("`#login`"), Some("#login".into()));
    }

    #[test]
    fn test_sanitize_takes_first_line_only() {
        assert_eq!(
            sanitize_selector("#login\nThis targets the login button."),
            Some("#login".into())
        );
    }

    #[test]
    fn test_sanitize_blank_is_none() {
        assert_eq!(sanitize_selector("   "), None);
        assert_eq!(sanitize_selector("``````"), None);
        assert_eq!(sanitize_selector("\"\""), None);
    }

    #[test]
    fn test_reduce_dom_keeps_parents_once() {
        let dom = DomSnapshot::from_html(
            r#"<html><body><form id="f"><input name="u"><input name="p"></form><p>noise</p><button id="b">Go</button></body></html>"#,
        );
        let reduced = reduce_dom(&dom, 50);
        let lines: Vec<_> = reduced.lines().collect();
        // body is the form's and the button's parent, form is both inputs' parent
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("<body>"));
        assert!(lines[1].starts_with("<form id=\"f\">"));
    }

    #[test]
    fn test_reduce_dom_limits_elements() {
        let html: String = (0..10)
            .map(|i| format!("<div><button id=\"b{}\">x</button></div>", i))
            .collect();
        let reduced = reduce_dom(&DomSnapshot::from_html(&html), 3);
        assert_eq!(reduced.lines().count(), 3);
        assert!(reduced.contains("b2"));
        assert!(!reduced.contains("b3"));
    }

    #[test]
    fn test_reduce_dom_on_deeply_nested_page() {
        let mut html = String::from(r#"<body><button id="go">Go</button>"#);
        for _ in 0..30_000 {
            html.push_str("<div>level");
        }
        html.push_str(r#"<button id="deep">Deep</button>"#);

        let reduced = reduce_dom(&DomSnapshot::from_html(&html), 50);
        let lines: Vec<_> = reduced.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.chars().count() <= MAX_CONTEXT_CHARS));
        assert!(lines[0].starts_with(r#"<body><button id="go">Go</button>"#));
        assert_eq!(lines[1], r#"<div><button id="deep">Deep</button></div>"#);
    }

    #[test]
    fn test_reduce_dom_on_long_list_without_end_tags() {
        let mut html = String::from("<ul>");
        for i in 0..8_000 {
            html.push_str(&format!("<li><a href='/item/{i}'>Item {i}</a>"));
        }
        html.push_str("</ul>");

        let reduced = reduce_dom(&DomSnapshot::from_html(&html), 50);
        let lines: Vec<_> = reduced.lines().collect();
        assert_eq!(lines.len(), 50);
        assert_eq!(lines[0], r#"<li><a href="/item/0">Item 0</a></li>"#);
        assert!(!reduced.contains("/item/50\""));
    }

    #[test]
    fn test_prompt_contains_context() {
        let resolver = AiResolver::with_api_key(&AiConfig::default(), None).unwrap();
        let dom = DomSnapshot::from_html(r#"<div><button id="go">Go</button></div>"#);
        let req = HealRequest {
            dom: &dom,
            failed_selector: "#old",
            action_hint: "click go",
            page_url: "",
            page_title: "Checkout",
        };
        let prompt = resolver.build_prompt(&req);
        assert!(prompt.contains("Failed Selector: #old"));
        assert!(prompt.contains("Intended Action: click go"));
        assert!(prompt.contains("Page URL: Unknown"));
        assert!(prompt.contains("Page Title: Checkout"));
        assert!(prompt.contains(r#"<button id="go">Go</button>"#));
    }
}
