//! Minimal HTML element index with a small CSS selector subset.
//!
//! Supported selectors: tag names, `.class`, `#id`, `[attr]`,
//! `[attr="value"]`, compounds of those, descendant combinators
//! (whitespace) and comma-separated groups.

use std::sync::LazyLock;

use regex::Regex;

use super::PageDocument;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<(/?)([a-zA-Z][a-zA-Z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .unwrap()
});

static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .unwrap()
});

static NON_CONTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>|<noscript\b.*?</noscript\s*>")
        .unwrap()
});

static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

#[derive(Debug, Clone)]
struct Element {
    tag: String,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, String)>,
    parent: Option<usize>,
    content_start: usize,
    content_end: usize,
}

/// A parsed page. Malformed markup is tolerated: unclosed elements run to
/// the end of their parent.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    source: String,
    elements: Vec<Element>,
}

impl HtmlDocument {
    pub fn parse(html: &str) -> Self {
        let source = NON_CONTENT.replace_all(html, "").into_owned();
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();

        for caps in TAG.captures_iter(&source) {
            let Some(whole) = caps.get(0) else { continue };
            let Some(name) = caps.get(2) else { continue };
            let tag = name.as_str().to_ascii_lowercase();
            let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());

            if closing {
                if let Some(pos) = open.iter().rposition(|&i| elements[i].tag == tag) {
                    for &idx in &open[pos..] {
                        elements[idx].content_end = whole.start();
                    }
                    open.truncate(pos);
                }
                continue;
            }

            let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            let attrs = parse_attrs(raw_attrs);
            let id = attrs
                .iter()
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.clone());
            let classes = attrs
                .iter()
                .find(|(k, _)| k == "class")
                .map(|(_, v)| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();

            let self_closing =
                VOID_TAGS.contains(&tag.as_str()) || raw_attrs.trim_end().ends_with('/');
            let index = elements.len();
            elements.push(Element {
                tag,
                id,
                classes,
                attrs,
                parent: open.last().copied(),
                content_start: whole.end(),
                content_end: if self_closing { whole.end() } else { source.len() },
            });
            if !self_closing {
                open.push(index);
            }
        }

        Self { source, elements }
    }

    fn text_of(&self, element: &Element) -> String {
        let inner = &self.source[element.content_start..element.content_end];
        clean_text(inner)
    }

    fn matches(&self, index: usize, selector: &[Compound]) -> bool {
        let Some((last, ancestors)) = selector.split_last() else {
            return false;
        };
        if !last.matches(&self.elements[index]) {
            return false;
        }

        let mut remaining = ancestors.iter().rev().peekable();
        let mut current = self.elements[index].parent;
        while let Some(wanted) = remaining.peek() {
            let Some(idx) = current else { return false };
            if wanted.matches(&self.elements[idx]) {
                remaining.next();
            }
            current = self.elements[idx].parent;
        }
        true
    }
}

impl PageDocument for HtmlDocument {
    fn select_text(&self, selector: &str) -> Option<String> {
        let groups: Vec<Vec<Compound>> = selector
            .split(',')
            .map(|group| group.split_whitespace().map(Compound::parse).collect())
            .filter(|group: &Vec<Compound>| !group.is_empty())
            .collect();

        self.elements
            .iter()
            .enumerate()
            .filter(|(i, _)| groups.iter().any(|g| self.matches(*i, g)))
            .map(|(_, element)| self.text_of(element))
            .find(|text| !text.is_empty())
    }

    fn body_text(&self) -> String {
        match self.elements.iter().find(|e| e.tag == "body") {
            Some(body) => self.text_of(body),
            None => clean_text(&self.source),
        }
    }
}

/// One compound selector such as `h1.entry-title` or `[rel="author"]`.
#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn parse(raw: &str) -> Self {
        let mut compound = Compound::default();
        let mut chars = raw.chars().peekable();

        let tag: String = std::iter::from_fn(|| chars.next_if(|c| is_ident(*c))).collect();
        if !tag.is_empty() && tag != "*" {
            compound.tag = Some(tag.to_ascii_lowercase());
        }

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    let class: String =
                        std::iter::from_fn(|| chars.next_if(|c| is_ident(*c))).collect();
                    compound.classes.push(class);
                }
                '#' => {
                    let id: String =
                        std::iter::from_fn(|| chars.next_if(|c| is_ident(*c))).collect();
                    compound.id = Some(id);
                }
                '[' => {
                    let body: String = std::iter::from_fn(|| chars.next_if(|c| *c != ']')).collect();
                    chars.next();
                    let (name, value) = match body.split_once('=') {
                        Some((name, value)) => (
                            name.trim().to_ascii_lowercase(),
                            Some(value.trim().trim_matches(['"', '\'']).to_string()),
                        ),
                        None => (body.trim().to_ascii_lowercase(), None),
                    };
                    compound.attrs.push((name, value));
                }
                _ => {}
            }
        }

        compound
    }

    fn matches(&self, element: &Element) -> bool {
        if let Some(tag) = &self.tag {
            if &element.tag != tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id.as_ref() != Some(id) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.classes.contains(c)) {
            return false;
        }
        self.attrs.iter().all(|(name, value)| {
            element
                .attrs
                .iter()
                .any(|(k, v)| k == name && value.as_ref().map_or(true, |want| want == v))
        })
    }
}

fn is_ident(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*'
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    ATTR.captures_iter(raw)
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

fn clean_text(fragment: &str) -> String {
    let without_tags = ANY_TAG.replace_all(fragment, " ");
    let decoded = decode_entities(&without_tags);
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&rsquo;", "'")
        .replace("&amp;", "&")
}
