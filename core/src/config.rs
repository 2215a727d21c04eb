use serde::{Deserialize, Serialize};

use crate::builder::UnreadablePolicy;
use crate::error::Result;
use crate::rank::{Bm25Params, Scorer, ScoringMethod};
use crate::tokenizer::NormalizerKind;

const ENV_SCORING: &str = "SIFT_SCORING";
const ENV_BM25_K1: &str = "SIFT_BM25_K1";
const ENV_BM25_B: &str = "SIFT_BM25_B";
const ENV_STEMMER: &str = "SIFT_STEMMER";
const ENV_ON_UNREADABLE: &str = "SIFT_ON_UNREADABLE";
const ENV_EXTENSIONS: &str = "SIFT_EXTENSIONS";
const ENV_TOP_K: &str = "SIFT_TOP_K";

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub scoring: ScoringMethod,
    pub bm25: Bm25Params,
    /// Normalization used when building; queries follow the snapshot's own.
    pub normalizer: NormalizerKind,
    pub on_unreadable: UnreadablePolicy,
    pub extensions: Vec<String>,
    pub top_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringMethod::default(),
            bm25: Bm25Params::default(),
            normalizer: NormalizerKind::default(),
            on_unreadable: UnreadablePolicy::default(),
            extensions: vec!["txt".to_string()],
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with `SIFT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Bad enum values are errors; bad numbers keep the default.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(raw) = read(ENV_SCORING) {
            self.scoring = ScoringMethod::parse(&raw)?;
        }
        if let Some(k1) = read(ENV_BM25_K1).and_then(|v| v.parse::<f64>().ok()).filter(|v| *v >= 0.0) {
            self.bm25.k1 = k1;
        }
        if let Some(b) = read(ENV_BM25_B).and_then(|v| v.parse::<f64>().ok()).filter(|v| (0.0..=1.0).contains(v)) {
            self.bm25.b = b;
        }
        if let Some(raw) = read(ENV_STEMMER) {
            self.normalizer = NormalizerKind::parse(&raw)?;
        }
        if let Some(raw) = read(ENV_ON_UNREADABLE) {
            self.on_unreadable = UnreadablePolicy::parse(&raw)?;
        }
        if let Some(raw) = read(ENV_EXTENSIONS) {
            let exts: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !exts.is_empty() {
                self.extensions = exts;
            }
        }
        if let Some(k) = read(ENV_TOP_K).and_then(|v| v.parse::<usize>().ok()).filter(|v| *v >= 1) {
            self.top_k = k;
        }
        Ok(self)
    }

    pub fn scorer(&self) -> Scorer {
        Scorer::new(self.scoring, self.bm25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::StemLanguage;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.scoring, ScoringMethod::Bm25);
        assert_eq!(c.bm25, Bm25Params { k1: 1.5, b: 0.75 });
        assert_eq!(c.normalizer, NormalizerKind::Snowball(StemLanguage::English));
        assert_eq!(c.extensions, vec!["txt"]);
        assert_eq!(c.top_k, 10);
    }

    #[test]
    fn env_overrides_apply() {
        let c = EngineConfig::default()
            .with_env(env(&[
                ("SIFT_SCORING", "tfidf"),
                ("SIFT_BM25_K1", "1.2"),
                ("SIFT_STEMMER", "off"),
                ("SIFT_ON_UNREADABLE", "abort"),
                ("SIFT_EXTENSIONS", ".txt, HTML"),
                ("SIFT_TOP_K", "3"),
            ]))
            .unwrap();
        assert_eq!(c.scoring, ScoringMethod::TfIdf);
        assert_eq!(c.bm25.k1, 1.2);
        assert_eq!(c.normalizer, NormalizerKind::Lowercase);
        assert_eq!(c.on_unreadable, UnreadablePolicy::Abort);
        assert_eq!(c.extensions, vec!["txt", "html"]);
        assert_eq!(c.top_k, 3);
    }

    #[test]
    fn bad_numbers_keep_defaults() {
        let c = EngineConfig::default()
            .with_env(env(&[("SIFT_BM25_B", "2.0"), ("SIFT_TOP_K", "zero")]))
            .unwrap();
        assert_eq!(c.bm25.b, 0.75);
        assert_eq!(c.top_k, 10);
    }

    #[test]
    fn bad_enum_is_an_error() {
        assert!(EngineConfig::default().with_env(env(&[("SIFT_SCORING", "magic")])).is_err());
    }
}
