use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::{Result, SearchError};
use crate::index::{DocId, IndexSnapshot, IndexTables, Posting};
use crate::source::SourceDocument;
use crate::tokenizer::{tokenize, Normalizer, NormalizerKind};

/// What a build does with a document its source could not read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreadablePolicy {
    /// Log it and leave it out; it gets no doc id.
    #[default]
    Skip,
    /// Fail the whole build.
    Abort,
}

impl UnreadablePolicy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" | "fail" => Ok(Self::Abort),
            other => Err(SearchError::Config(format!(
                "unknown unreadable-document policy: {other} (expected skip|abort)"
            ))),
        }
    }
}

/// Per-document analysis result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentStats {
    /// Token count, repeats included.
    pub length: u32,
    pub term_counts: HashMap<String, u32>,
}

/// Tokenize and normalize one document. Pure: safe to run on any thread.
pub fn analyze(text: &str, normalizer: &dyn Normalizer) -> DocumentStats {
    let mut stats = DocumentStats::default();
    for token in tokenize(text) {
        *stats.term_counts.entry(normalizer.normalize(token)).or_insert(0) += 1;
        stats.length += 1;
    }
    stats
}

#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub num_docs: u32,
    pub num_terms: usize,
    pub num_postings: usize,
    pub skipped: usize,
    pub elapsed: Duration,
}

pub struct IndexBuilder {
    normalizer: Box<dyn Normalizer>,
    policy: UnreadablePolicy,
}

impl IndexBuilder {
    pub fn new(normalizer: NormalizerKind, policy: UnreadablePolicy) -> Self {
        Self { normalizer: normalizer.build(), policy }
    }

    /// Build a snapshot from documents in traversal order.
    ///
    /// Doc ids are assigned 0..N-1 to the documents that were read. Analysis
    /// runs on the rayon pool; the merge afterwards is sequential.
    pub fn build<I>(&self, documents: I) -> Result<(IndexSnapshot, BuildReport)>
    where
        I: IntoIterator<Item = Result<SourceDocument>>,
    {
        let start = Instant::now();
        let mut docs = Vec::new();
        let mut skipped = 0usize;
        for item in documents {
            match item {
                Ok(doc) => docs.push(doc),
                Err(err @ SearchError::UnreadableDocument { .. }) => match self.policy {
                    UnreadablePolicy::Skip => {
                        tracing::warn!(error = %err, "skipping unreadable document");
                        skipped += 1;
                    }
                    UnreadablePolicy::Abort => return Err(err),
                },
                Err(err) => return Err(err),
            }
        }

        let normalizer = self.normalizer.as_ref();
        let stats: Vec<DocumentStats> = docs.par_iter().map(|d| analyze(&d.text, normalizer)).collect();

        let tables = merge(docs.iter().map(|d| d.path.as_str()).zip(stats));
        let snapshot = IndexSnapshot::new(tables, normalizer.kind());
        let report = BuildReport {
            num_docs: snapshot.meta.num_docs,
            num_terms: snapshot.tables.doc_freq.len(),
            num_postings: snapshot.tables.postings.values().map(Vec::len).sum(),
            skipped,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            num_docs = report.num_docs,
            num_terms = report.num_terms,
            num_postings = report.num_postings,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "index build complete"
        );
        Ok((snapshot, report))
    }
}

/// Fold per-document stats into the four index tables. Doc ids follow iteration order.
pub fn merge<'a, I>(analyzed: I) -> IndexTables
where
    I: IntoIterator<Item = (&'a str, DocumentStats)>,
{
    let mut tables = IndexTables::new();
    for (i, (path, stats)) in analyzed.into_iter().enumerate() {
        let doc_id = i as DocId;
        tables.put_document(doc_id, path);
        tables.put_doc_length(doc_id, stats.length);
        for (term, freq) in stats.term_counts {
            if freq == 0 {
                continue;
            }
            *tables.doc_freq.entry(term.clone()).or_insert(0) += 1;
            tables.postings.entry(term).or_default().push(Posting { doc_id, freq });
        }
    }
    tables
}
