use parking_lot::Mutex;
use roaring::RoaringBitmap;
use serde::Serialize;

use crate::builder::{BuildReport, IndexBuilder};
use crate::config::EngineConfig;
use crate::error::{Result, StoreError};
use crate::index::DocId;
use crate::query::{evaluate, parse_query, QueryToken};
use crate::rank::{rank, Scorer};
use crate::source::DocumentSource;
use crate::store::{self, IndexReader, IndexStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub path: String,
    pub score: f64,
}

/// Builds indexes into a store and answers queries against its committed snapshot.
///
/// Any number of threads may search while one thread reindexes; a search
/// runs entirely against the snapshot that was current when it started.
pub struct SearchEngine<S: IndexStore> {
    store: S,
    config: EngineConfig,
    rebuild: Mutex<()>,
}

impl<S: IndexStore> SearchEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config, rebuild: Mutex::new(()) }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rebuild the whole index from `source` and swap it in.
    ///
    /// Nothing is written if the build fails; a failed store write leaves
    /// the previous snapshot in place.
    pub fn reindex(&self, source: &dyn DocumentSource) -> Result<BuildReport> {
        let _guard = self.rebuild.lock();
        let builder = IndexBuilder::new(self.config.normalizer, self.config.on_unreadable);
        let (snapshot, report) = builder.build(source.documents())?;
        store::install(&self.store, &snapshot)?;
        Ok(report)
    }

    fn prepare(&self, query: &str) -> Result<Option<(S::Reader, Vec<QueryToken>)>> {
        let Some(reader) = self.store.reader()? else {
            tracing::warn!("search against an empty index; reindex first");
            return Ok(None);
        };
        let normalizer = reader.meta().normalizer.build();
        let tokens = parse_query(query, normalizer.as_ref());
        tracing::debug!(
            query,
            tokens = %tokens.iter().map(ToString::to_string).collect::<Vec<_>>().join(" "),
            "parsed query"
        );
        Ok(Some((reader, tokens)))
    }

    /// Boolean filtering only: the doc ids matching `query`.
    pub fn evaluate(&self, query: &str) -> Result<RoaringBitmap> {
        match self.prepare(query)? {
            Some((reader, tokens)) => Ok(evaluate(&reader, &tokens)?),
            None => Ok(RoaringBitmap::new()),
        }
    }

    pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        self.search_with(query, top_k, self.config.scorer())
    }

    pub fn search_with(&self, query: &str, top_k: usize, scorer: Scorer) -> Result<Vec<SearchHit>> {
        let Some((reader, tokens)) = self.prepare(query)? else {
            return Ok(Vec::new());
        };
        let candidates = evaluate(&reader, &tokens)?;
        let ranked = rank(&reader, &tokens, &candidates, scorer, top_k)?;
        tracing::debug!(candidates = candidates.len(), hits = ranked.len(), "query ranked");

        ranked
            .into_iter()
            .map(|s| -> Result<SearchHit> {
                let path = reader
                    .get_document(s.doc_id)?
                    .ok_or_else(|| StoreError::Corrupt(format!("posting references missing document {}", s.doc_id)))?;
                Ok(SearchHit { doc_id: s.doc_id, path, score: s.score })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::ScoringMethod;
    use crate::source::SourceDocument;
    use crate::store::MemoryStore;
    use crate::tokenizer::NormalizerKind;

    fn engine(config: EngineConfig) -> SearchEngine<MemoryStore> {
        let engine = SearchEngine::new(MemoryStore::new(), config);
        let docs = vec![
            SourceDocument::new("doc1.txt", "hello world hello"),
            SourceDocument::new("doc2.txt", "world of search engines"),
        ];
        engine.reindex(&docs).unwrap();
        engine
    }

    #[test]
    fn empty_store_yields_nothing() {
        let engine = SearchEngine::new(MemoryStore::new(), EngineConfig::default());
        assert!(engine.search("hello", 10).unwrap().is_empty());
        assert!(engine.evaluate("NOT hello").unwrap().is_empty());
    }

    #[test]
    fn hits_carry_paths() {
        let engine = engine(EngineConfig::default());
        let hits = engine.search("hello", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "doc1.txt");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn queries_use_the_snapshot_normalizer() {
        let engine = engine(EngineConfig { normalizer: NormalizerKind::Lowercase, ..EngineConfig::default() });
        // no stemming in the index, so "engine" must not match "engines"
        assert!(engine.search("engine", 10).unwrap().is_empty());
        assert_eq!(engine.search("engines", 10).unwrap().len(), 1);
    }

    #[test]
    fn tfidf_scoring_can_be_selected() {
        let engine = engine(EngineConfig { scoring: ScoringMethod::TfIdf, ..EngineConfig::default() });
        let hits = engine.search("hello", 10).unwrap();
        // tf = 2, idf = ln(3/2) + 1
        let expected = 2.0 * ((3.0f64 / 2.0).ln() + 1.0);
        assert!((hits[0].score - expected).abs() < 1e-12);
    }
}
