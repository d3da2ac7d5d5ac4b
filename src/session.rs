//! Per-session corpus state.
//!
//! A [`Session`] owns every document ingested since it was created (or last
//! cleared) and the base-name index used for duplicate detection. It is passed
//! explicitly to the pipeline and to search; there is no process-wide state.

use std::collections::HashMap;

use crate::models::{base_name, Document};
use crate::search::Corpus;

/// Base file name → keys of every document stored under that base name, oldest first.
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    by_base_name: HashMap<String, Vec<String>>,
}

impl DedupIndex {
    pub fn get(&self, base_name: &str) -> &[String] {
        self.by_base_name
            .get(base_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn record(&mut self, base_name: &str, key: &str) {
        let keys = self.by_base_name.entry(base_name.to_string()).or_default();
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }

    /// Number of distinct base names.
    pub fn len(&self) -> usize {
        self.by_base_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_base_name.is_empty()
    }
}

/// Documents in first-insertion order plus the dedup index.
#[derive(Debug, Default)]
pub struct Session {
    documents: Vec<Document>,
    positions: HashMap<String, usize>,
    dedup: DedupIndex,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `doc`, replacing any document with the same key in place.
    pub fn upsert(&mut self, doc: Document) {
        match self.positions.get(&doc.key) {
            Some(&pos) => self.documents[pos] = doc,
            None => {
                self.positions.insert(doc.key.clone(), self.documents.len());
                self.documents.push(doc);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        self.positions.get(key).map(|&pos| &self.documents[pos])
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn dedup_index(&self) -> &DedupIndex {
        &self.dedup
    }

    /// Key of the earliest stored success with the same base name and identical text.
    pub fn find_duplicate(&self, key: &str, text: &str, hash: &str) -> Option<&str> {
        self.dedup
            .get(base_name(key))
            .iter()
            .filter_map(|prior| self.get(prior))
            .find(|doc| doc.outcome.is_success() && doc.content_hash == hash && doc.text == text)
            .map(|doc| doc.key.as_str())
    }

    /// Stores a successful document and records it under its base name.
    pub fn store_success(&mut self, doc: Document) {
        self.dedup.record(base_name(&doc.key), &doc.key);
        self.upsert(doc);
    }

    /// Ends the session: drops every document and the dedup index.
    pub fn clear(&mut self) {
        self.documents.clear();
        self.positions.clear();
        self.dedup = DedupIndex::default();
    }
}

impl Corpus for Session {
    fn entries(&self) -> Vec<(&str, &str)> {
        self.documents
            .iter()
            .map(|d| (d.key.as_str(), d.text.as_str()))
            .collect()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).map(|d| d.text.as_str())
    }
}
