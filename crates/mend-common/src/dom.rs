//! DOM Snapshot
//!
//! A flat, document-ordered view of a page's elements. Snapshots arrive either
//! as JSON from an in-page scanner script or from raw page HTML via
//! [`DomSnapshot::from_html`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Elements that never have children or an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose contents are dropped entirely.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Start tags that close an open `<p>`.
const P_CLOSERS: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol",
    "p", "pre", "section", "table", "ul",
];

/// How far down the open-element stack an implied end tag is looked for.
const IMPLIED_END_SEARCH: usize = 16;

/// Text kept per element, in bytes.
pub const MAX_TEXT_BYTES: usize = 256;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|</\s*([A-Za-z][A-Za-z0-9:-]*)\s*>|<([A-Za-z][A-Za-z0-9:-]*)((?:\s+[^\s"'>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'>]+))?)*)\s*(/?)\s*>"#,
    )
    .unwrap()
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

/// One element of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomNode {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in document order.
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
    /// Text content of the element and its descendants, whitespace collapsed
    /// and capped at [`MAX_TEXT_BYTES`].
    #[serde(default)]
    pub text: String,
    /// Index of the parent element within the snapshot. Always lower than the
    /// node's own index.
    #[serde(default)]
    pub parent: Option<usize>,
}

impl DomNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Class names in declaration order.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    /// The first `data-*` attribute, if any.
    pub fn first_data_attribute(&self) -> Option<(&str, &str)> {
        self.attributes
            .iter()
            .find(|(k, _)| k.starts_with("data-"))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

/// Nodes in document (pre-order) order, so every subtree is a contiguous run
/// starting at its root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SnapshotRepr")]
pub struct DomSnapshot {
    pub nodes: Vec<DomNode>,
}

#[derive(Deserialize)]
struct SnapshotRepr {
    nodes: Vec<DomNode>,
}

impl From<SnapshotRepr> for DomSnapshot {
    fn from(repr: SnapshotRepr) -> Self {
        Self::new(repr.nodes)
    }
}

impl DomSnapshot {
    /// Wrap a node list, dropping parent links that do not point backwards.
    pub fn new(mut nodes: Vec<DomNode>) -> Self {
        for (index, node) in nodes.iter_mut().enumerate() {
            if node.parent.is_some_and(|p| p >= index) {
                node.parent = None;
            }
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DomNode> {
        self.nodes.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &DomNode)> {
        self.nodes.iter().enumerate()
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = (usize, &DomNode)> {
        self.iter()
            .skip(index + 1)
            .filter(move |(_, n)| n.parent == Some(index))
    }

    /// Render an element back to markup, truncated to `max_chars` characters.
    ///
    /// Leaf elements render their text; elements with children render the
    /// children only, so mixed content loses its loose text. Rendering stops
    /// as soon as the budget is spent, so cost is bounded by `max_chars`
    /// rather than by the size of the subtree.
    pub fn outer_html(&self, index: usize, max_chars: usize) -> String {
        let mut out = Markup::new(max_chars);
        if self.get(index).is_none() {
            return out.buf;
        }

        // (node, has rendered a child)
        let mut open: Vec<(usize, bool)> = Vec::new();

        for (i, node) in self.iter().skip(index) {
            if i > index {
                let Some(parent) = node.parent.filter(|&p| p >= index && p < i) else {
                    break;
                };
                while let Some(&(top, has_children)) = open.last() {
                    if top == parent {
                        break;
                    }
                    open.pop();
                    self.close_tag(top, has_children, &mut out);
                }
                match open.last_mut() {
                    Some(top) => top.1 = true,
                    None => break,
                }
            }

            out.open_tag(node);
            if out.is_full() {
                return out.buf;
            }
            if !node.is_void() {
                open.push((i, false));
            }
        }

        while let Some((top, has_children)) = open.pop() {
            self.close_tag(top, has_children, &mut out);
        }
        out.buf
    }

    fn close_tag(&self, index: usize, has_children: bool, out: &mut Markup) {
        let node = &self.nodes[index];
        if !has_children {
            out.push(&node.text);
        }
        out.push("</");
        out.push(&node.tag);
        out.push(">");
    }

    /// Build a snapshot from page markup.
    ///
    /// The tokenizer is forgiving: stray end tags are ignored, unclosed elements
    /// are closed at end of input, optional end tags (`li`, `p`, `option`,
    /// table rows and cells, `dt`/`dd`) are implied, and comments, doctypes and
    /// the bodies of `script`/`style`/`noscript` are dropped.
    pub fn from_html(html: &str) -> Self {
        let mut nodes: Vec<DomNode> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut pos = 0;

        while let Some(caps) = TOKEN_RE.captures_at(html, pos) {
            let Some(whole) = caps.get(0) else {
                break;
            };
            push_text(&mut nodes, &open, &html[pos..whole.start()]);
            pos = whole.end();

            if let Some(end_tag) = caps.get(1) {
                let tag = end_tag.as_str().to_ascii_lowercase();
                if let Some(depth) = open.iter().rposition(|&i| nodes[i].tag == tag) {
                    open.truncate(depth);
                }
                continue;
            }

            let Some(start_tag) = caps.get(2) else {
                // comment, doctype or processing instruction
                continue;
            };
            let tag = start_tag.as_str().to_ascii_lowercase();
            let self_closing = caps.get(4).is_some_and(|m| !m.as_str().is_empty());

            if SKIPPED_ELEMENTS.contains(&tag.as_str()) {
                if !self_closing {
                    pos = skip_raw_text(html, pos, &tag);
                }
                continue;
            }

            close_implied(&nodes, &mut open, &tag);

            let attributes = caps
                .get(3)
                .map(|m| parse_attributes(m.as_str()))
                .unwrap_or_default();

            nodes.push(DomNode {
                tag: tag.clone(),
                attributes,
                text: String::new(),
                parent: open.last().copied(),
            });

            if !self_closing && !VOID_ELEMENTS.contains(&tag.as_str()) {
                open.push(nodes.len() - 1);
            }
        }
        push_text(&mut nodes, &open, &html[pos..]);

        Self { nodes }
    }
}

/// Character-budgeted output buffer.
struct Markup {
    buf: String,
    chars: usize,
    max: usize,
}

impl Markup {
    fn new(max: usize) -> Self {
        Self {
            buf: String::new(),
            chars: 0,
            max,
        }
    }

    fn is_full(&self) -> bool {
        self.chars >= self.max
    }

    fn push(&mut self, s: &str) {
        if self.is_full() {
            return;
        }
        let taken = truncate_chars(s, self.max - self.chars);
        self.buf.push_str(taken);
        self.chars += taken.chars().count();
    }

    fn open_tag(&mut self, node: &DomNode) {
        self.push("<");
        self.push(&node.tag);
        for (name, value) in &node.attributes {
            self.push(" ");
            self.push(name);
            self.push("=\"");
            self.push(&value.replace('"', "&quot;"));
            self.push("\"");
        }
        self.push(">");
    }
}

/// Elements a start tag closes implicitly, and the elements that stop the search.
fn implied_end(tag: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    let rule: (&'static [&'static str], &'static [&'static str]) = match tag {
        "li" => (&["li"], &["ul", "ol", "menu"]),
        "dt" | "dd" => (&["dt", "dd"], &["dl"]),
        "option" => (&["option"], &["select", "datalist", "optgroup"]),
        "optgroup" => (&["optgroup", "option"], &["select"]),
        "tr" => (&["tr", "td", "th"], &["table", "thead", "tbody", "tfoot"]),
        "td" | "th" => (&["td", "th"], &["tr", "table"]),
        "thead" | "tbody" | "tfoot" => (&["thead", "tbody", "tfoot", "tr", "td", "th"], &["table"]),
        t if P_CLOSERS.contains(&t) => (&["p"], &["button", "table", "td", "th", "caption"]),
        _ => return None,
    };
    Some(rule)
}

/// Pop the outermost element the new start tag implicitly ends, along with
/// everything opened inside it.
fn close_implied(nodes: &[DomNode], open: &mut Vec<usize>, tag: &str) {
    let Some((closes, boundary)) = implied_end(tag) else {
        return;
    };

    let mut cut = None;
    for (depth, &i) in open.iter().enumerate().rev().take(IMPLIED_END_SEARCH) {
        let open_tag = nodes[i].tag.as_str();
        if boundary.contains(&open_tag) {
            break;
        }
        if closes.contains(&open_tag) {
            cut = Some(depth);
        }
    }

    if let Some(depth) = cut {
        open.truncate(depth);
    }
}

/// Append a text run to the open elements, innermost first.
///
/// An ancestor always holds at least as much text as its descendants, so the
/// walk stops at the first element that is already full.
fn push_text(nodes: &mut [DomNode], open: &[usize], raw: &str) {
    if open.is_empty() || raw.trim().is_empty() {
        return;
    }
    let text = collapse_whitespace(&decode_entities(raw));

    for &i in open.iter().rev() {
        let buf = &mut nodes[i].text;
        if buf.len() + 4 > MAX_TEXT_BYTES {
            break;
        }
        if !buf.is_empty() {
            buf.push(' ');
        }
        let room = MAX_TEXT_BYTES.saturating_sub(buf.len());
        buf.push_str(truncate_bytes(&text, room));
    }
}

fn skip_raw_text(html: &str, from: usize, tag: &str) -> usize {
    let needle = format!("</{}", tag);
    let rest = html[from..].to_ascii_lowercase();
    match rest.find(&needle) {
        Some(close) => match rest[close..].find('>') {
            Some(gt) => from + close + gt + 1,
            None => html.len(),
        },
        None => html.len(),
    }
}

fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(raw)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| decode_entities(m.as_str()))
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
