//! Regular-expression search with context snippets and highlighting.
//!
//! # Windowing
//!
//! 1. Find every case-insensitive match of the pattern in a document.
//! 2. For each match (ascending offset) take `context_length` characters on
//!    both sides of the match start, clamped to the text and shifted to keep a
//!    width of `2 * context_length` where the document is long enough.
//! 3. Emit the match only if it is the first of its document or starts
//!    strictly after the previous emitted window's end.
//!
//! Documents are scanned independently, in parallel, and results keep corpus
//! order.

use rayon::prelude::*;
use regex::{Captures, Regex, RegexBuilder};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SearchError;
use crate::models::SearchMatch;

/// Default number of characters shown on each side of a match.
pub const DEFAULT_CONTEXT_LENGTH: usize = 100;

/// Read access to extracted document texts, in a stable iteration order.
pub trait Corpus {
    /// `(key, text)` pairs in corpus order.
    fn entries(&self) -> Vec<(&str, &str)>;
    fn text(&self, key: &str) -> Option<&str>;
}

impl Corpus for Vec<(String, String)> {
    fn entries(&self) -> Vec<(&str, &str)> {
        self.iter().map(|(k, t)| (k.as_str(), t.as_str())).collect()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k == key)
            .map(|(_, t)| t.as_str())
    }
}

/// Markers wrapped around each highlighted occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub open: String,
    pub close: String,
}

impl Default for Highlight {
    fn default() -> Self {
        Self {
            open: "<b>".to_string(),
            close: "</b>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchEngine {
    context_length: usize,
    highlight: Highlight,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_LENGTH)
    }
}

impl SearchEngine {
    pub fn new(context_length: usize) -> Self {
        Self {
            context_length,
            highlight: Highlight::default(),
        }
    }

    pub fn with_highlight(mut self, highlight: Highlight) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn context_length(&self) -> usize {
        self.context_length
    }

    /// Searches every document of `corpus` for `pattern` (case-insensitive regex).
    ///
    /// A blank pattern matches nothing.
    pub fn search<C: Corpus + ?Sized>(
        &self,
        corpus: &C,
        pattern: &str,
    ) -> Result<SearchResults, SearchError> {
        self.run(corpus, pattern, None)
    }

    /// Like [`search`](Self::search), but stops with [`SearchError::Cancelled`]
    /// once `token` is cancelled.
    pub fn search_cancellable<C: Corpus + ?Sized>(
        &self,
        corpus: &C,
        pattern: &str,
        token: &CancellationToken,
    ) -> Result<SearchResults, SearchError> {
        self.run(corpus, pattern, Some(token))
    }

    fn run<C: Corpus + ?Sized>(
        &self,
        corpus: &C,
        pattern: &str,
        token: Option<&CancellationToken>,
    ) -> Result<SearchResults, SearchError> {
        let regex = compile(pattern)?;
        let mut results = SearchResults {
            pattern: pattern.to_string(),
            regex: regex.clone(),
            highlight: self.highlight.clone(),
            matches: Vec::new(),
            views: HashMap::new(),
        };
        let Some(regex) = regex else {
            return Ok(results);
        };

        let per_doc: Option<Vec<Vec<SearchMatch>>> = corpus
            .entries()
            .into_par_iter()
            .map(|(key, text)| {
                if token.is_some_and(|t| t.is_cancelled()) {
                    return None;
                }
                Some(scan_document(key, text, &regex, pattern, self.context_length))
            })
            .collect();

        results.matches = per_doc.ok_or(SearchError::Cancelled)?.concat();
        tracing::debug!(
            pattern,
            matches = results.matches.len(),
            "search finished"
        );
        Ok(results)
    }
}

fn compile(pattern: &str) -> Result<Option<Regex>, SearchError> {
    if pattern.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(
        RegexBuilder::new(pattern).case_insensitive(true).build()?,
    ))
}

/// Emitted matches of one document.
fn scan_document(
    key: &str,
    text: &str,
    regex: &Regex,
    pattern: &str,
    context_length: usize,
) -> Vec<SearchMatch> {
    let mut out: Vec<SearchMatch> = Vec::new();
    for found in regex.find_iter(text) {
        if let Some(prev) = out.last() {
            if found.start() <= prev.snippet_end {
                continue;
            }
        }
        let (snippet_start, snippet_end) = window(text, found.start(), context_length);
        out.push(SearchMatch {
            key: key.to_string(),
            match_index: found.start(),
            match_end: found.end(),
            snippet_start,
            snippet_end,
            pattern: pattern.to_string(),
            match_id: Uuid::new_v4().to_string(),
        });
    }
    out
}

/// Byte bounds of the `2 * context` character window around `at`.
pub fn window(text: &str, at: usize, context: usize) -> (usize, usize) {
    let (start, before) = retreat(text, at, context);
    let wanted_after = context.saturating_mul(2) - before;
    let (end, after) = advance(text, at, wanted_after);
    if after < wanted_after {
        let (shifted, _) = retreat(text, start, wanted_after - after);
        return (shifted, end);
    }
    (start, end)
}

/// Moves back up to `n` chars from `pos`; returns the new offset and chars moved.
fn retreat(text: &str, pos: usize, n: usize) -> (usize, usize) {
    let mut at = pos;
    let mut moved = 0;
    for (i, _) in text[..pos].char_indices().rev().take(n) {
        at = i;
        moved += 1;
    }
    (at, moved)
}

/// Moves forward up to `n` chars from `pos`; returns the new offset and chars moved.
fn advance(text: &str, pos: usize, n: usize) -> (usize, usize) {
    let mut chars = text[pos..].char_indices();
    let mut moved = 0;
    while moved < n && chars.next().is_some() {
        moved += 1;
    }
    let at = chars.next().map_or(text.len(), |(i, _)| pos + i);
    (at, moved)
}

/// Matches of one search, with snippet and document highlighting.
#[derive(Debug)]
pub struct SearchResults {
    pattern: String,
    regex: Option<Regex>,
    highlight: Highlight,
    matches: Vec<SearchMatch>,
    views: HashMap<String, String>,
}

impl SearchResults {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self) -> &[SearchMatch] {
        &self.matches
    }

    pub fn matches_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a SearchMatch> + 'a {
        self.matches.iter().filter(move |m| m.key == key)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// The match's window with every occurrence of the pattern highlighted.
    pub fn snippet<C: Corpus + ?Sized>(&self, corpus: &C, m: &SearchMatch) -> Option<String> {
        let text = corpus.text(&m.key)?;
        let slice = text.get(m.snippet_start..m.snippet_end)?;
        Some(self.highlight_text(slice))
    }

    /// Whole document with each snippet highlighted and wrapped in an element
    /// whose id is the match id. Built on first request, then cached.
    pub fn document_view<C: Corpus + ?Sized>(&mut self, corpus: &C, key: &str) -> Option<&str> {
        if !self.views.contains_key(key) {
            let view = self.render_view(corpus.text(key)?, key);
            self.views.insert(key.to_string(), view);
        }
        self.views.get(key).map(String::as_str)
    }

    fn render_view(&self, text: &str, key: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for m in self.matches_for(key) {
            // Windows may overlap the previous one; never repeat rendered text.
            let start = m.snippet_start.max(cursor);
            out.push_str(&text[cursor..start]);
            out.push_str(&format!("<span id=\"{}\">", m.match_id));
            out.push_str(&self.highlight_text(&text[start..m.snippet_end]));
            out.push_str("</span>");
            cursor = m.snippet_end;
        }
        out.push_str(&text[cursor..]);
        out
    }

    fn highlight_text(&self, slice: &str) -> String {
        let Some(regex) = &self.regex else {
            return slice.to_string();
        };
        regex
            .replace_all(slice, |caps: &Captures<'_>| {
                let hit = &caps[0];
                if hit.is_empty() {
                    String::new()
                } else {
                    format!("{}{}{}", self.highlight.open, hit, self.highlight.close)
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(docs: &[(&str, &str)]) -> Vec<(String, String)> {
        docs.iter()
            .map(|(k, t)| (k.to_string(), t.to_string()))
            .collect()
    }

    fn offsets(results: &SearchResults) -> Vec<usize> {
        results.matches().iter().map(|m| m.match_index).collect()
    }

    #[test]
    fn small_windows_keep_every_match() {
        let c = corpus(&[("a.txt", "foo bar foo baz foo")]);
        let results = SearchEngine::new(2).search(&c, "foo").unwrap();
        assert_eq!(offsets(&results), [0, 8, 16]);
        let m = &results.matches()[1];
        assert_eq!((m.snippet_start, m.snippet_end), (6, 10));
    }

    #[test]
    fn wide_window_suppresses_covered_matches() {
        let c = corpus(&[("a.txt", "foo bar foo baz foo")]);
        let results = SearchEngine::new(100).search(&c, "foo").unwrap();
        assert_eq!(offsets(&results), [0]);
        let m = &results.matches()[0];
        assert_eq!((m.snippet_start, m.snippet_end), (0, 19));
    }

    #[test]
    fn emitted_matches_start_beyond_previous_window() {
        let text = "needle ".repeat(200);
        let c = corpus(&[("long.txt", text.as_str())]);
        let results = SearchEngine::new(10).search(&c, "needle").unwrap();
        assert!(results.len() > 1);
        for pair in results.matches().windows(2) {
            assert!(pair[1].match_index > pair[0].snippet_end);
        }
    }

    #[test]
    fn window_keeps_full_width_near_edges() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(window(text, 1, 5), (0, 10));
        assert_eq!(window(text, 24, 5), (16, 26));
        assert_eq!(window(text, 13, 5), (8, 18));
    }

    #[test]
    fn huge_context_covers_the_whole_text() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        assert_eq!(window(text, 1, usize::MAX), (0, text.len()));

        let c = corpus(&[("a.txt", "one needle here"), ("b.txt", "needle")]);
        let results = SearchEngine::new(usize::MAX).search(&c, "needle").unwrap();
        assert_eq!(offsets(&results), [4, 0]);
        let m = &results.matches()[0];
        assert_eq!((m.snippet_start, m.snippet_end), (0, 15));
    }

    #[test]
    fn window_respects_char_boundaries() {
        let text = "ééééé match ééééé";
        let at = text.find("match").unwrap();
        let (start, end) = window(text, at, 3);
        assert!(text.is_char_boundary(start));
        assert!(text.is_char_boundary(end));
        assert_eq!(text[start..end].chars().count(), 6);
    }

    #[test]
    fn search_is_case_insensitive_regex() {
        let c = corpus(&[("a.txt", "Invoice 2023-001 and INVOICE 2024-17")]);
        let results = SearchEngine::new(3).search(&c, r"invoice \d{4}").unwrap();
        assert_eq!(offsets(&results), [0, 21]);
    }

    #[test]
    fn invalid_and_blank_patterns() {
        let c = corpus(&[("a.txt", "text")]);
        let engine = SearchEngine::default();
        assert!(matches!(
            engine.search(&c, "(unclosed").unwrap_err(),
            SearchError::InvalidPattern(_)
        ));
        assert!(engine.search(&c, "   ").unwrap().is_empty());
    }

    #[test]
    fn results_follow_corpus_order() {
        let c = corpus(&[("z.txt", "alpha"), ("a.txt", "alpha"), ("m.txt", "beta")]);
        let results = SearchEngine::default().search(&c, "alpha").unwrap();
        let keys: Vec<&str> = results.matches().iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, ["z.txt", "a.txt"]);
    }

    #[test]
    fn snippet_highlights_every_occurrence_in_window() {
        let c = corpus(&[("a.txt", "Foo bar foo baz foo")]);
        let results = SearchEngine::new(100).search(&c, "foo").unwrap();
        let snippet = results.snippet(&c, &results.matches()[0]).unwrap();
        assert_eq!(snippet, "<b>Foo</b> bar <b>foo</b> baz <b>foo</b>");
    }

    #[test]
    fn custom_highlight_markers() {
        let c = corpus(&[("a.txt", "x foo y")]);
        let engine = SearchEngine::new(100).with_highlight(Highlight {
            open: "[".into(),
            close: "]".into(),
        });
        let results = engine.search(&c, "foo").unwrap();
        assert_eq!(results.snippet(&c, &results.matches()[0]).unwrap(), "x [foo] y");
    }

    #[test]
    fn document_view_wraps_snippets_with_match_ids() {
        let text = format!("{}target{}target{}", "a".repeat(10), "b".repeat(10), "c".repeat(10));
        let c = corpus(&[("doc.txt", text.as_str())]);
        let mut results = SearchEngine::new(8).search(&c, "target").unwrap();
        assert_eq!(results.len(), 2);
        let ids: Vec<String> = results.matches().iter().map(|m| m.match_id.clone()).collect();

        let view = results.document_view(&c, "doc.txt").unwrap().to_string();
        assert!(view.starts_with("aa<span id="));
        assert!(view.contains("aaaaaaaa<b>target</b>bb</span>"));
        assert!(view.ends_with("bbbbbbbb<b>target</b>cc</span>cccccccc"));
        for id in &ids {
            assert!(view.contains(&format!("<span id=\"{}\">", id)));
        }
        let plain = view
            .replace("<b>", "")
            .replace("</b>", "")
            .replace("</span>", "");
        let plain = ids
            .iter()
            .fold(plain, |acc, id| acc.replace(&format!("<span id=\"{}\">", id), ""));
        assert_eq!(plain, text);

        // Second call is served from the cache.
        assert_eq!(results.document_view(&c, "doc.txt").unwrap(), view);
        assert!(results.document_view(&c, "missing.txt").is_none());
    }

    #[test]
    fn cancelled_search_stops() {
        let c = corpus(&[("a.txt", "foo")]);
        let token = CancellationToken::new();
        token.cancel();
        let err = SearchEngine::default()
            .search_cancellable(&c, "foo", &token)
            .unwrap_err();
        assert!(matches!(err, SearchError::Cancelled));
    }
}
