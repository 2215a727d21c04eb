//! BM25 and TF-IDF scoring of candidate documents.

use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, SearchError, StoreResult};
use crate::index::DocId;
use crate::query::{query_terms, QueryToken};
use crate::store::IndexReader;

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMethod {
    #[default]
    Bm25,
    TfIdf,
}

impl ScoringMethod {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bm25" => Ok(Self::Bm25),
            "tfidf" | "tf-idf" => Ok(Self::TfIdf),
            other => Err(SearchError::Config(format!(
                "unknown scoring method: {other} (expected bm25|tfidf)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: DEFAULT_K1, b: DEFAULT_B }
    }
}

/// Corpus-wide numbers every contribution needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorpusStats {
    /// Size of the full corpus, regardless of the query's filters.
    pub num_docs: f64,
    pub avg_doc_length: f64,
}

/// BM25 contribution of one term to one document. Zero when the term is absent.
///
/// `idf = ln(1 + (N - df + 0.5) / (df + 0.5))` is always positive, so a
/// present term never lowers a score.
pub fn bm25(tf: u32, df: u32, doc_len: u32, corpus: &CorpusStats, params: &Bm25Params) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let tf = f64::from(tf);
    let df = f64::from(df);
    let n = corpus.num_docs;
    let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
    let len_ratio = if corpus.avg_doc_length > 0.0 { f64::from(doc_len) / corpus.avg_doc_length } else { 1.0 };
    idf * (tf * (params.k1 + 1.0)) / (tf + params.k1 * (1.0 - params.b + params.b * len_ratio))
}

/// TF-IDF contribution with smoothed idf: `tf * (ln((N + 1) / (df + 1)) + 1)`.
pub fn tf_idf(tf: u32, df: u32, corpus: &CorpusStats) -> f64 {
    if tf == 0 {
        return 0.0;
    }
    let idf = ((corpus.num_docs + 1.0) / (f64::from(df) + 1.0)).ln() + 1.0;
    f64::from(tf) * idf
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scorer {
    Bm25(Bm25Params),
    TfIdf,
}

impl Scorer {
    pub fn new(method: ScoringMethod, params: Bm25Params) -> Self {
        match method {
            ScoringMethod::Bm25 => Self::Bm25(params),
            ScoringMethod::TfIdf => Self::TfIdf,
        }
    }

    pub fn contribution(&self, tf: u32, df: u32, doc_len: u32, corpus: &CorpusStats) -> f64 {
        match self {
            Self::Bm25(params) => bm25(tf, df, doc_len, corpus, params),
            Self::TfIdf => tf_idf(tf, df, corpus),
        }
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::Bm25(Bm25Params::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

struct TermStats {
    df: u32,
    tf: HashMap<DocId, u32>,
}

/// Score `candidates` against the query's terms and keep the best `top_k`.
///
/// A document's score is the sum of per-term contributions over every term
/// token of the query (operators skipped, repeated terms counted again).
/// Documents scoring `<= 0` are dropped. Ordering is by descending score,
/// then ascending doc id.
pub fn rank<R: IndexReader + ?Sized>(
    reader: &R,
    tokens: &[QueryToken],
    candidates: &RoaringBitmap,
    scorer: Scorer,
    top_k: usize,
) -> StoreResult<Vec<ScoredDoc>> {
    if candidates.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }
    let corpus = CorpusStats {
        num_docs: f64::from(reader.get_doc_count()?),
        avg_doc_length: reader.meta().avg_doc_length(),
    };

    let mut stats: HashMap<&str, TermStats> = HashMap::new();
    for term in query_terms(tokens) {
        if stats.contains_key(term) {
            continue;
        }
        let tf = reader
            .get_postings(term)?
            .into_iter()
            .filter(|p| candidates.contains(p.doc_id))
            .map(|p| (p.doc_id, p.freq))
            .collect();
        stats.insert(term, TermStats { df: reader.get_doc_freq(term)?, tf });
    }

    let mut scored = Vec::new();
    for doc_id in candidates.iter() {
        let doc_len = reader.get_doc_length(doc_id)?;
        let score: f64 = query_terms(tokens)
            .filter_map(|term| stats.get(term))
            .map(|s| {
                let tf = s.tf.get(&doc_id).copied().unwrap_or(0);
                scorer.contribution(tf, s.df, doc_len, &corpus)
            })
            .sum();
        if score > 0.0 {
            scored.push(ScoredDoc { doc_id, score });
        }
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
    scored.truncate(top_k);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: CorpusStats = CorpusStats { num_docs: 10.0, avg_doc_length: 5.0 };

    #[test]
    fn absent_term_contributes_nothing() {
        assert_eq!(bm25(0, 3, 5, &CORPUS, &Bm25Params::default()), 0.0);
        assert_eq!(tf_idf(0, 3, &CORPUS), 0.0);
    }

    #[test]
    fn bm25_matches_reference_value() {
        // idf = ln(1 + 8.5/2.5) = ln 4.4; tf part = 2 * 2.5 / (2 + 1.5) with dl == avgdl
        let expected = 4.4f64.ln() * 5.0 / 3.5;
        let got = bm25(2, 2, 5, &CORPUS, &Bm25Params::default());
        assert!((got - expected).abs() < 1e-12, "{got} != {expected}");
    }

    #[test]
    fn tf_idf_matches_reference_value() {
        let expected = 3.0 * ((11.0f64 / 3.0).ln() + 1.0);
        assert!((tf_idf(3, 2, &CORPUS) - expected).abs() < 1e-12);
    }

    #[test]
    fn bm25_penalizes_longer_documents() {
        let p = Bm25Params::default();
        assert!(bm25(1, 2, 3, &CORPUS, &p) > bm25(1, 2, 8, &CORPUS, &p));
    }

    #[test]
    fn bm25_stays_positive_for_ubiquitous_terms() {
        assert!(bm25(1, 10, 5, &CORPUS, &Bm25Params::default()) > 0.0);
    }

    #[test]
    fn bm25_handles_empty_corpus_average() {
        let empty = CorpusStats { num_docs: 1.0, avg_doc_length: 0.0 };
        assert!(bm25(1, 1, 0, &empty, &Bm25Params::default()).is_finite());
    }

    #[test]
    fn parse_scoring_method() {
        assert_eq!(ScoringMethod::parse("TF-IDF").unwrap(), ScoringMethod::TfIdf);
        assert_eq!(ScoringMethod::parse("bm25").unwrap(), ScoringMethod::Bm25);
        assert!(ScoringMethod::parse("pagerank").is_err());
    }
}
