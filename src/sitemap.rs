//! Declarative, sitemap-driven extraction of structured records from HTML.
//!
//! A sitemap is a JSON document produced by point-and-click scraper tooling:
//! a list of selector rules, each naming its parent rule, plus one or more
//! start URLs with a `{query}` placeholder. This module resolves that flat
//! list into a tree of [`SelectorNode`]s once, at load time, and then
//! interprets the tree against rendered HTML documents to produce nested
//! JSON records.
//!
//! # Tree shape
//!
//! The synthetic id `_root` represents the whole document. The first rule
//! parented at `_root` is the *record* rule: each element it matches yields
//! one record, and its child rules extract the record's fields from within
//! that element's subtree only. Unknown parent ids, invalid CSS selectors,
//! and a missing record rule are all rejected at load time: the tree is
//! static and reused across many pages, so deferring those errors to first
//! use would just move a configuration bug into the crawl.

use crate::error::{IngestError, Result};
use crate::utils::normalize_ws;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Synthetic parent id representing the whole document.
const ROOT_ID: &str = "_root";

/// Raw sitemap document as exported by the scraper tooling.
#[derive(Debug, Deserialize)]
struct SitemapDoc {
    #[serde(rename = "startUrl")]
    start_url: Vec<String>,
    selectors: Vec<SelectorSpec>,
}

/// One selector rule in the raw sitemap.
#[derive(Debug, Deserialize)]
struct SelectorSpec {
    id: String,
    selector: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    multiple: bool,
    #[serde(rename = "parentSelectors")]
    parents: Vec<String>,
}

/// What a leaf rule extracts from its matched elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    /// Trimmed visible text.
    Text,
    /// The `href` attribute.
    Link,
}

/// One compiled extraction rule and its sub-field rules.
#[derive(Debug)]
pub struct SelectorNode {
    pub id: String,
    selector: Selector,
    kind: SelectorKind,
    multiple: bool,
    children: Vec<SelectorNode>,
}

/// A compiled sitemap: the record rule tree plus its start URLs.
///
/// Built once, immutable, reused across every `extract` call.
#[derive(Debug)]
pub struct Sitemap {
    start_urls: Vec<String>,
    record: SelectorNode,
}

impl Sitemap {
    /// Parse and compile a sitemap from its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Sitemap`] if the JSON is malformed, a rule
    /// references an unknown parent id, a CSS selector does not parse, the
    /// parent graph contains a cycle, there is no rule parented at `_root`,
    /// or `startUrl` is empty.
    pub fn from_json(text: &str) -> Result<Self> {
        let doc: SitemapDoc = serde_json::from_str(text)
            .map_err(|e| IngestError::Sitemap(format!("invalid sitemap JSON: {e}")))?;
        Self::compile(doc)
    }

    /// Load and compile a sitemap from a file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn compile(doc: SitemapDoc) -> Result<Self> {
        if doc.start_url.is_empty() {
            return Err(IngestError::Sitemap("sitemap has no startUrl".into()));
        }

        let known: HashSet<&str> = doc.selectors.iter().map(|s| s.id.as_str()).collect();
        for spec in &doc.selectors {
            let parent = spec
                .parents
                .first()
                .ok_or_else(|| IngestError::Sitemap(format!("rule '{}' has no parent", spec.id)))?;
            if parent != ROOT_ID && !known.contains(parent.as_str()) {
                return Err(IngestError::Sitemap(format!(
                    "rule '{}' references unknown parent '{}'",
                    spec.id, parent
                )));
            }
        }

        // Children of each id, preserving sitemap order.
        let mut children_of: HashMap<&str, Vec<&SelectorSpec>> = HashMap::new();
        for spec in &doc.selectors {
            children_of
                .entry(spec.parents[0].as_str())
                .or_default()
                .push(spec);
        }

        let record_spec = children_of
            .get(ROOT_ID)
            .and_then(|roots| roots.first().copied())
            .ok_or_else(|| IngestError::Sitemap("no rule parented at _root".into()))?;

        let mut visiting = HashSet::new();
        let record = build_node(record_spec, &children_of, &mut visiting)?;

        Ok(Self {
            start_urls: doc.start_url,
            record,
        })
    }

    /// Substitute the URL-escaped query into the first start URL.
    pub fn search_url(&self, query: &str) -> String {
        self.start_urls[0].replace("{query}", &urlencoding::encode(query))
    }

    /// Interpret the rule tree against one HTML document.
    ///
    /// Returns one JSON object per element matched by the record rule, each
    /// keyed by child rule id. Field values follow each child's shape: a
    /// string or `null` for single leaves, an array for repeated ones, and
    /// nested objects/arrays for rules with their own children. Never
    /// panics for a tree that compiled.
    pub fn extract(&self, html: &str) -> Vec<Value> {
        let doc = Html::parse_document(html);
        let value = evaluate(&self.record, doc.root_element());
        let records = match value {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        debug!(count = records.len(), rule = %self.record.id, "Extracted records");
        records
    }
}

fn build_node(
    spec: &SelectorSpec,
    children_of: &HashMap<&str, Vec<&SelectorSpec>>,
    visiting: &mut HashSet<String>,
) -> Result<SelectorNode> {
    if !visiting.insert(spec.id.clone()) {
        return Err(IngestError::Sitemap(format!(
            "cycle through rule '{}'",
            spec.id
        )));
    }

    let selector = Selector::parse(&spec.selector).map_err(|e| {
        IngestError::Sitemap(format!("rule '{}': bad selector: {e}", spec.id))
    })?;

    // Anything that is not a link rule extracts text, matching the tooling's
    // own fallback for exotic rule types.
    let kind = if spec.kind == "SelectorLink" {
        SelectorKind::Link
    } else {
        SelectorKind::Text
    };

    let mut children = Vec::new();
    if let Some(specs) = children_of.get(spec.id.as_str()) {
        for child in specs {
            children.push(build_node(child, children_of, visiting)?);
        }
    }
    visiting.remove(&spec.id);

    Ok(SelectorNode {
        id: spec.id.clone(),
        selector,
        kind,
        multiple: spec.multiple,
        children,
    })
}

/// Depth-first interpretation of one rule within one element's subtree.
fn evaluate(node: &SelectorNode, ctx: ElementRef<'_>) -> Value {
    let matches: Vec<ElementRef<'_>> = ctx.select(&node.selector).collect();

    let mut results: Vec<Value> = Vec::with_capacity(matches.len());
    if node.children.is_empty() {
        for el in matches {
            results.push(match node.kind {
                SelectorKind::Text => {
                    Value::String(normalize_ws(&el.text().collect::<String>()))
                }
                SelectorKind::Link => el
                    .value()
                    .attr("href")
                    .map(|href| Value::String(href.to_string()))
                    .unwrap_or(Value::Null),
            });
        }
    } else {
        for el in matches {
            let mut record = Map::new();
            for child in &node.children {
                record.insert(child.id.clone(), evaluate(child, el));
            }
            results.push(Value::Object(record));
        }
    }

    if node.multiple {
        Value::Array(results)
    } else {
        results.into_iter().next().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARDS_SITEMAP: &str = r#"{
        "startUrl": ["https://news.example/search?q={query}"],
        "selectors": [
            {"id": "card", "selector": "div.card", "type": "SelectorElement",
             "multiple": true, "parentSelectors": ["_root"]},
            {"id": "title", "selector": "h3", "type": "SelectorText",
             "multiple": false, "parentSelectors": ["card"]},
            {"id": "url", "selector": "a.story", "type": "SelectorLink",
             "multiple": false, "parentSelectors": ["card"]},
            {"id": "tags", "selector": "span.tag", "type": "SelectorText",
             "multiple": true, "parentSelectors": ["card"]}
        ]
    }"#;

    const CARDS_HTML: &str = r#"
        <html><body>
          <div class="card">
            <h3>  First   story </h3>
            <a class="story" href="/a/1">read</a>
            <span class="tag">world</span>
            <span class="tag">politics</span>
          </div>
          <div class="card">
            <h3>Second story</h3>
            <span class="tag">tech</span>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_extracts_one_record_per_card() {
        let sitemap = Sitemap::from_json(CARDS_SITEMAP).unwrap();
        let records = sitemap.extract(CARDS_HTML);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0]["title"], "First story");
        assert_eq!(records[0]["url"], "/a/1");
        assert_eq!(
            records[0]["tags"],
            serde_json::json!(["world", "politics"])
        );
    }

    #[test]
    fn test_context_narrowing_keeps_fields_per_card() {
        let sitemap = Sitemap::from_json(CARDS_SITEMAP).unwrap();
        let records = sitemap.extract(CARDS_HTML);
        // The second card has no link; its sibling's href must not leak in.
        assert_eq!(records[1]["title"], "Second story");
        assert_eq!(records[1]["url"], Value::Null);
        assert_eq!(records[1]["tags"], serde_json::json!(["tech"]));
    }

    #[test]
    fn test_empty_match_is_null_or_empty_list() {
        let sitemap = Sitemap::from_json(CARDS_SITEMAP).unwrap();
        let records = sitemap.extract("<html><body><p>nothing here</p></body></html>");
        assert!(records.is_empty());
    }

    #[test]
    fn test_repeated_leaf_with_no_matches_is_empty_array() {
        let sitemap = Sitemap::from_json(CARDS_SITEMAP).unwrap();
        let records =
            sitemap.extract(r#"<div class="card"><h3>Untagged story</h3></div>"#);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["title"], "Untagged story");
        assert_eq!(records[0]["tags"], serde_json::json!([]));
        assert_eq!(records[0]["url"], Value::Null);
    }

    #[test]
    fn test_unknown_parent_fails_at_load() {
        let bad = r#"{
            "startUrl": ["https://x.example/?q={query}"],
            "selectors": [
                {"id": "title", "selector": "h3", "type": "SelectorText",
                 "multiple": false, "parentSelectors": ["no_such_rule"]}
            ]
        }"#;
        let err = Sitemap::from_json(bad).unwrap_err();
        assert!(matches!(err, IngestError::Sitemap(_)));
        assert!(err.to_string().contains("no_such_rule"));
    }

    #[test]
    fn test_invalid_selector_fails_at_load() {
        let bad = r#"{
            "startUrl": ["https://x.example/?q={query}"],
            "selectors": [
                {"id": "card", "selector": ":::nope", "type": "SelectorText",
                 "multiple": true, "parentSelectors": ["_root"]}
            ]
        }"#;
        assert!(matches!(
            Sitemap::from_json(bad),
            Err(IngestError::Sitemap(_))
        ));
    }

    #[test]
    fn test_missing_record_rule_fails_at_load() {
        let bad = r#"{"startUrl": ["https://x.example/?q={query}"], "selectors": []}"#;
        assert!(matches!(
            Sitemap::from_json(bad),
            Err(IngestError::Sitemap(_))
        ));
    }

    #[test]
    fn test_missing_start_url_fails_at_load() {
        let bad = r#"{"startUrl": [], "selectors": []}"#;
        assert!(matches!(
            Sitemap::from_json(bad),
            Err(IngestError::Sitemap(_))
        ));
    }

    #[test]
    fn test_search_url_escapes_query() {
        let sitemap = Sitemap::from_json(CARDS_SITEMAP).unwrap();
        assert_eq!(
            sitemap.search_url("climate change"),
            "https://news.example/search?q=climate%20change"
        );
    }

    #[test]
    fn test_single_record_rule_yields_one_record() {
        let sitemap_json = r#"{
            "startUrl": ["https://x.example/?q={query}"],
            "selectors": [
                {"id": "main", "selector": "article", "type": "SelectorElement",
                 "multiple": false, "parentSelectors": ["_root"]},
                {"id": "headline", "selector": "h1", "type": "SelectorText",
                 "multiple": false, "parentSelectors": ["main"]}
            ]
        }"#;
        let sitemap = Sitemap::from_json(sitemap_json).unwrap();
        let records =
            sitemap.extract("<article><h1>Only one</h1></article><article><h1>Ignored</h1></article>");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["headline"], "Only one");
    }
}
