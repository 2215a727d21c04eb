//! Flat boolean queries: parsing and candidate-set evaluation.
//!
//! A query is a whitespace-separated sequence of terms and the operators
//! `AND`, `OR` and `NOT` (matched case-insensitively). There is no nesting
//! and no phrase syntax; evaluation is a strict left-to-right fold.

use roaring::RoaringBitmap;
use std::fmt;

use crate::error::StoreResult;
use crate::store::IndexReader;
use crate::tokenizer::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    And,
    Or,
    Not,
}

impl Operator {
    fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("AND") {
            Some(Self::And)
        } else if raw.eq_ignore_ascii_case("OR") {
            Some(Self::Or)
        } else if raw.eq_ignore_ascii_case("NOT") {
            Some(Self::Not)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryToken {
    Operator(Operator),
    /// Already normalized.
    Term(String),
}

impl QueryToken {
    pub fn term(&self) -> Option<&str> {
        match self {
            Self::Term(t) => Some(t),
            Self::Operator(_) => None,
        }
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator(Operator::And) => f.write_str("AND"),
            Self::Operator(Operator::Or) => f.write_str("OR"),
            Self::Operator(Operator::Not) => f.write_str("NOT"),
            Self::Term(t) => f.write_str(t),
        }
    }
}

/// Split on whitespace; operator keywords become operators, everything else
/// goes through the index's normalizer as a whole token.
pub fn parse_query(query: &str, normalizer: &dyn Normalizer) -> Vec<QueryToken> {
    query
        .split_whitespace()
        .map(|raw| match Operator::parse(raw) {
            Some(op) => QueryToken::Operator(op),
            None => QueryToken::Term(normalizer.normalize(raw)),
        })
        .collect()
}

/// Term tokens in query order, duplicates and negated terms included.
pub fn query_terms(tokens: &[QueryToken]) -> impl Iterator<Item = &str> {
    tokens.iter().filter_map(QueryToken::term)
}

fn docs_for_term<R: IndexReader + ?Sized>(reader: &R, term: &str) -> StoreResult<RoaringBitmap> {
    Ok(reader.get_postings(term)?.into_iter().map(|p| p.doc_id).collect())
}

/// Resolve a token sequence to the set of matching doc ids.
///
/// * `NOT` negates the next term against the full document set.
/// * `AND`/`OR` set the operator applied when the next term arrives.
/// * A term with no pending operator replaces the running result instead of
///   combining with it. Operators are cleared after every term.
/// * Unknown terms match nothing; dangling operators are ignored.
pub fn evaluate<R: IndexReader + ?Sized>(reader: &R, tokens: &[QueryToken]) -> StoreResult<RoaringBitmap> {
    let mut result: Option<RoaringBitmap> = None;
    let mut pending: Option<Operator> = None;
    let mut negate_next = false;
    let mut all_docs: Option<RoaringBitmap> = None;

    for token in tokens {
        match token {
            QueryToken::Operator(Operator::Not) => negate_next = true,
            QueryToken::Operator(op) => pending = Some(*op),
            QueryToken::Term(term) => {
                let mut docs = docs_for_term(reader, term)?;
                if negate_next {
                    if all_docs.is_none() {
                        all_docs = Some(reader.get_all_documents()?.into_keys().collect());
                    }
                    if let Some(all) = &all_docs {
                        docs = all - &docs;
                    }
                    negate_next = false;
                }
                result = Some(match (result.take(), pending) {
                    (None, _) => docs,
                    (Some(acc), Some(Operator::And)) => acc & docs,
                    (Some(acc), Some(Operator::Or)) => acc | docs,
                    (Some(_), _) => docs,
                });
                pending = None;
            }
        }
    }
    Ok(result.unwrap_or_default())
}
