//! Cross-iteration source registry.
//!
//! The registry owns every evidence document gathered during a session and
//! assigns each distinct URL a stable reference number, `1..=N` in
//! first-seen order. Reference numbers are what the drafter cites and what
//! the citation resolver links, so they are never reassigned or reused
//! within a session. The registry is mutated only by the research loop's
//! control thread, after each concurrent search batch has joined.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::search::SourceDoc;

/// A registered evidence document with its stable reference number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// Stable per-session reference number, 1-based.
    pub reference: u32,
    pub url: String,
    pub title: Option<String>,
    pub domain: Option<String>,
    pub content: Option<String>,
    pub snippets: Vec<String>,
}

impl Source {
    fn from_doc(reference: u32, doc: &SourceDoc) -> Self {
        Self {
            reference,
            url: doc.url.clone(),
            title: doc.title.clone(),
            domain: doc.domain.clone(),
            content: doc.content.clone(),
            snippets: doc.snippets.clone(),
        }
    }
}

/// The sources one query produced, post-registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEvidence {
    pub query: String,
    pub sources: Vec<Source>,
}

/// Ordered, append-only evidence accumulated across iterations:
/// one entry per issued query.
pub type EvidenceSet = Vec<QueryEvidence>;

/// URL → reference number registry for a single research session.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    numbers: HashMap<String, u32>,
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign or reuse reference numbers for each doc by URL, returning the
    /// docs annotated with their number.
    ///
    /// Idempotent: a URL seen before returns its existing number and the
    /// registry is not mutated for it. A missing URL collapses onto the
    /// empty-string key (degenerate but non-fatal).
    pub fn register(&mut self, docs: &[SourceDoc]) -> Vec<Source> {
        docs.iter()
            .map(|doc| match self.numbers.get(&doc.url) {
                Some(&reference) => Source::from_doc(reference, doc),
                None => {
                    let reference = self.sources.len() as u32 + 1;
                    self.numbers.insert(doc.url.clone(), reference);
                    let source = Source::from_doc(reference, doc);
                    self.sources.push(source.clone());
                    source
                }
            })
            .collect()
    }

    /// Remove sources whose URL already appeared earlier in the set,
    /// scanning in encounter order and keeping only the first occurrence.
    ///
    /// Query entries are kept (possibly with an empty source list) so the
    /// evidence set stays one entry per issued query. Idempotent.
    pub fn dedupe(evidence: &[QueryEvidence]) -> EvidenceSet {
        let mut seen = HashSet::new();
        Self::dedupe_against(&mut seen, evidence)
    }

    /// Like [`Self::dedupe`], but also drops sources whose URL is in `seen`.
    /// Used by the research loop to dedupe a fresh batch against all prior
    /// evidence; `seen` is extended with every URL that survives.
    pub(crate) fn dedupe_against(
        seen: &mut HashSet<String>,
        evidence: &[QueryEvidence],
    ) -> EvidenceSet {
        evidence
            .iter()
            .map(|entry| QueryEvidence {
                query: entry.query.clone(),
                sources: entry
                    .sources
                    .iter()
                    .filter(|s| seen.insert(s.url.clone()))
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    /// Look up a registered source by reference number.
    pub fn lookup(&self, reference: u32) -> Option<&Source> {
        if reference == 0 {
            return None;
        }
        self.sources.get(reference as usize - 1)
    }

    /// All registered sources, ascending by reference number.
    pub fn entries(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str) -> SourceDoc {
        SourceDoc::new(url).title(format!("Title for {url}"))
    }

    #[test]
    fn test_register_assigns_first_seen_order() {
        let mut registry = SourceRegistry::new();
        let sources = registry.register(&[doc("https://a.com"), doc("https://b.com")]);
        assert_eq!(sources[0].reference, 1);
        assert_eq!(sources[1].reference, 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = SourceRegistry::new();
        registry.register(&[doc("https://a.com")]);
        let again = registry.register(&[doc("https://a.com"), doc("https://c.com")]);
        assert_eq!(again[0].reference, 1);
        assert_eq!(again[1].reference, 2);
        // Re-registration performed no mutation for the known URL.
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reference_numbers_never_reassigned() {
        let mut registry = SourceRegistry::new();
        registry.register(&[doc("https://x.com")]);
        registry.register(&[doc("https://y.com")]);
        registry.register(&[doc("https://x.com")]);
        assert_eq!(registry.lookup(1).unwrap().url, "https://x.com");
        assert_eq!(registry.lookup(2).unwrap().url, "https://y.com");
        assert!(registry.lookup(3).is_none());
        assert!(registry.lookup(0).is_none());
    }

    #[test]
    fn test_register_missing_url_uses_empty_key() {
        let mut registry = SourceRegistry::new();
        let sources = registry.register(&[doc(""), doc("")]);
        assert_eq!(sources[0].reference, 1);
        assert_eq!(sources[1].reference, 1);
        assert_eq!(registry.len(), 1);
    }

    fn evidence(entries: &[(&str, &[&str])]) -> EvidenceSet {
        let mut registry = SourceRegistry::new();
        entries
            .iter()
            .map(|(query, urls)| {
                let docs: Vec<SourceDoc> = urls.iter().map(|u| doc(u)).collect();
                QueryEvidence {
                    query: (*query).to_string(),
                    sources: registry.register(&docs),
                }
            })
            .collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let set = evidence(&[
            ("q1", &["https://x.com", "https://a.com"]),
            ("q2", &["https://x.com", "https://b.com"]),
        ]);
        let deduped = SourceRegistry::dedupe(&set);
        assert_eq!(deduped[0].sources.len(), 2);
        assert_eq!(deduped[1].sources.len(), 1);
        assert_eq!(deduped[1].sources[0].url, "https://b.com");
    }

    #[test]
    fn test_dedupe_is_idempotent() {
        let set = evidence(&[
            ("q1", &["https://x.com", "https://a.com"]),
            ("q2", &["https://x.com", "https://a.com", "https://b.com"]),
        ]);
        let once = SourceRegistry::dedupe(&set);
        let twice = SourceRegistry::dedupe(&once);
        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.query, b.query);
            let urls_a: Vec<&str> = a.sources.iter().map(|s| s.url.as_str()).collect();
            let urls_b: Vec<&str> = b.sources.iter().map(|s| s.url.as_str()).collect();
            assert_eq!(urls_a, urls_b);
        }
    }

    #[test]
    fn test_dedupe_preserves_query_entries() {
        let set = evidence(&[("q1", &["https://x.com"]), ("q2", &["https://x.com"])]);
        let deduped = SourceRegistry::dedupe(&set);
        assert_eq!(deduped.len(), 2);
        assert!(deduped[1].sources.is_empty());
    }
}
