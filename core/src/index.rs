use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tokenizer::NormalizerKind;

pub type DocId = u32;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    /// Occurrences of the term in the document.
    pub freq: u32,
}

/// The four index structures: documents, doc lengths, postings and document frequency.
///
/// Used both as the staging area of a rebuild and as the body of a committed snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTables {
    pub documents: BTreeMap<DocId, String>,
    pub doc_lengths: BTreeMap<DocId, u32>,
    pub postings: BTreeMap<String, Vec<Posting>>, // postings sorted by doc_id
    pub doc_freq: BTreeMap<String, u32>,
}

impl IndexTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_document(&mut self, doc_id: DocId, path: &str) {
        self.documents.insert(doc_id, path.to_string());
    }

    pub fn put_doc_length(&mut self, doc_id: DocId, length: u32) {
        self.doc_lengths.insert(doc_id, length);
    }

    /// Overwrites an existing posting for the same (term, doc_id).
    pub fn put_posting(&mut self, term: &str, doc_id: DocId, freq: u32) {
        let list = self.postings.entry(term.to_string()).or_default();
        match list.binary_search_by_key(&doc_id, |p| p.doc_id) {
            Ok(i) => list[i].freq = freq,
            Err(i) => list.insert(i, Posting { doc_id, freq }),
        }
    }

    pub fn put_doc_freq(&mut self, term: &str, df: u32) {
        self.doc_freq.insert(term.to_string(), df);
    }

    pub fn total_length(&self) -> u64 {
        self.doc_lengths.values().map(|&l| u64::from(l)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub version: u32,
    pub created_at: String,
    pub num_docs: u32,
    pub total_length: u64,
    pub normalizer: NormalizerKind,
}

impl SnapshotMeta {
    pub fn new(num_docs: u32, total_length: u64, normalizer: NormalizerKind) -> Self {
        let created_at = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self { version: SNAPSHOT_VERSION, created_at, num_docs, total_length, normalizer }
    }

    pub fn avg_doc_length(&self) -> f64 {
        if self.num_docs == 0 {
            return 0.0;
        }
        self.total_length as f64 / f64::from(self.num_docs)
    }
}

/// A complete, committed index: tables plus the metadata they were built with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub meta: SnapshotMeta,
    pub tables: IndexTables,
}

impl IndexSnapshot {
    pub fn new(tables: IndexTables, normalizer: NormalizerKind) -> Self {
        let meta = SnapshotMeta::new(tables.documents.len() as u32, tables.total_length(), normalizer);
        Self { meta, tables }
    }
}
