//! Citation resolution and bibliography rendering.
//!
//! The drafter cites sources as bracketed reference numbers: `[3]`, or
//! `[2, 5]` for several at once. This pass rewrites resolvable numbers into
//! inline markdown links and renders the bibliography. Markers are never
//! deleted: a number with no registry entry stays in place, bracketed and
//! bare, so a bad citation is visible instead of silently vanishing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::registry::SourceRegistry;

/// `[n]` or `[n, m, ...]`. Already-resolved markers are excluded by the
/// resolver itself (a marker immediately followed by `(` is a link label),
/// which keeps resolution idempotent.
static MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation marker regex"));

/// Placeholder when a source reported no title.
const UNTITLED: &str = "Untitled";

/// One bibliography line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BibliographyEntry {
    pub reference: u32,
    pub title: String,
    pub url: String,
}

impl BibliographyEntry {
    pub fn render(&self) -> String {
        format!("{}. {}({})", self.reference, self.title, self.url)
    }
}

/// Resolved report text plus its bibliography.
#[derive(Debug, Clone)]
pub struct ResolvedReport {
    pub text: String,
    pub bibliography: Vec<BibliographyEntry>,
}

/// Rewrite reference markers into inline links and derive the bibliography.
///
/// Pure and idempotent: re-running on already-resolved text with the same
/// registry state produces the same output.
pub fn resolve(draft: &str, registry: &SourceRegistry) -> ResolvedReport {
    let mut text = String::with_capacity(draft.len());
    let mut last_end = 0;

    for caps in MARKER_RE.captures_iter(draft) {
        let whole = caps.get(0).expect("match group 0");

        // Skip markers that are already link labels: `[1](https://...)`.
        if draft[whole.end()..].starts_with('(') {
            continue;
        }

        text.push_str(&draft[last_end..whole.start()]);
        text.push_str(&rewrite_marker(&caps[1], registry));
        last_end = whole.end();
    }
    text.push_str(&draft[last_end..]);

    ResolvedReport {
        text,
        bibliography: bibliography(registry),
    }
}

/// Rewrite one marker group. Each resolved number becomes a markdown link
/// labeled with the number; each unresolved number keeps its bracket.
fn rewrite_marker(group: &str, registry: &SourceRegistry) -> String {
    let parts: Vec<String> = group
        .split(',')
        .map(|raw| {
            let number: u32 = raw.trim().parse().unwrap_or(0);
            match registry.lookup(number) {
                Some(source) => format!("[{}]({})", number, source.url),
                None => format!("[{}]", raw.trim()),
            }
        })
        .collect();
    parts.join(", ")
}

/// All registered sources ascending by reference number, no duplicates.
pub fn bibliography(registry: &SourceRegistry) -> Vec<BibliographyEntry> {
    registry
        .entries()
        .iter()
        .map(|source| BibliographyEntry {
            reference: source.reference,
            title: source
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            url: source.url.clone(),
        })
        .collect()
}

/// Render the bibliography as one line per source.
pub fn render_bibliography(entries: &[BibliographyEntry]) -> String {
    entries
        .iter()
        .map(BibliographyEntry::render)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SourceDoc;

    fn registry_with(urls: &[(&str, Option<&str>)]) -> SourceRegistry {
        let mut registry = SourceRegistry::new();
        let docs: Vec<SourceDoc> = urls
            .iter()
            .map(|(url, title)| {
                let mut doc = SourceDoc::new(*url);
                if let Some(t) = title {
                    doc = doc.title(*t);
                }
                doc
            })
            .collect();
        registry.register(&docs);
        registry
    }

    #[test]
    fn test_resolve_single_and_grouped_markers() {
        let registry = registry_with(&[("https://url1", Some("One")), ("https://url2", Some("Two"))]);
        let resolved = resolve("Result A [1]. Result B [2, 3].", &registry);
        assert_eq!(
            resolved.text,
            "Result A [1](https://url1). Result B [2](https://url2), [3]."
        );
        assert_eq!(resolved.bibliography.len(), 2);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let registry = registry_with(&[("https://url1", Some("One"))]);
        let once = resolve("See [1] and [7].", &registry);
        let twice = resolve(&once.text, &registry);
        assert_eq!(once.text, twice.text);
    }

    #[test]
    fn test_unresolved_marker_survives() {
        let registry = SourceRegistry::new();
        let resolved = resolve("Claim [4].", &registry);
        assert_eq!(resolved.text, "Claim [4].");
    }

    #[test]
    fn test_non_numeric_brackets_untouched() {
        let registry = registry_with(&[("https://url1", Some("One"))]);
        let resolved = resolve("See [TODO] and [a, b] and [1].", &registry);
        assert_eq!(
            resolved.text,
            "See [TODO] and [a, b] and [1](https://url1)."
        );
    }

    #[test]
    fn test_bibliography_ordering_and_placeholder() {
        let registry = registry_with(&[
            ("https://url1", Some("One")),
            ("https://url2", None),
            ("https://url3", Some("  ")),
        ]);
        let entries = bibliography(&registry);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].render(), "1. One(https://url1)");
        assert_eq!(entries[1].render(), "2. Untitled(https://url2)");
        assert_eq!(entries[2].render(), "3. Untitled(https://url3)");
    }

    #[test]
    fn test_render_bibliography_lines() {
        let registry = registry_with(&[("https://url1", Some("One"))]);
        let rendered = render_bibliography(&bibliography(&registry));
        assert_eq!(rendered, "1. One(https://url1)");
    }
}
