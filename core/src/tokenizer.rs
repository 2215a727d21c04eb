use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, SearchError};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
}

/// Split text into raw word tokens (runs of Unicode word characters, `_` included).
/// Tokens keep their surface form; see [`Normalizer`] for the canonical term.
pub fn tokenize(text: &str) -> Vec<&str> {
    WORD.find_iter(text).map(|m| m.as_str()).collect()
}

/// Snowball languages a stemming normalizer can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemLanguage {
    English,
    French,
    German,
    Spanish,
    Italian,
    Portuguese,
    Russian,
    Dutch,
    Swedish,
}

impl StemLanguage {
    fn algorithm(self) -> Algorithm {
        match self {
            Self::English => Algorithm::English,
            Self::French => Algorithm::French,
            Self::German => Algorithm::German,
            Self::Spanish => Algorithm::Spanish,
            Self::Italian => Algorithm::Italian,
            Self::Portuguese => Algorithm::Portuguese,
            Self::Russian => Algorithm::Russian,
            Self::Dutch => Algorithm::Dutch,
            Self::Swedish => Algorithm::Swedish,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::English => "english",
            Self::French => "french",
            Self::German => "german",
            Self::Spanish => "spanish",
            Self::Italian => "italian",
            Self::Portuguese => "portuguese",
            Self::Russian => "russian",
            Self::Dutch => "dutch",
            Self::Swedish => "swedish",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let lang = match raw.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Self::English,
            "french" | "fr" => Self::French,
            "german" | "de" => Self::German,
            "spanish" | "es" => Self::Spanish,
            "italian" | "it" => Self::Italian,
            "portuguese" | "pt" => Self::Portuguese,
            "russian" | "ru" => Self::Russian,
            "dutch" | "nl" => Self::Dutch,
            "swedish" | "sv" => Self::Swedish,
            _ => return None,
        };
        Some(lang)
    }
}

/// Which normalization produced the terms of an index snapshot.
///
/// Recorded alongside every committed snapshot so queries are normalized
/// exactly like the documents they run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizerKind {
    Lowercase,
    Snowball(StemLanguage),
}

impl Default for NormalizerKind {
    fn default() -> Self {
        Self::Snowball(StemLanguage::English)
    }
}

impl NormalizerKind {
    /// `none`/`off`/`lowercase` disable stemming; anything else must name a language.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "off" | "lowercase" | "0" | "false" => Ok(Self::Lowercase),
            other => StemLanguage::parse(other)
                .map(Self::Snowball)
                .ok_or_else(|| SearchError::Config(format!("unknown stemmer language: {other}"))),
        }
    }

    pub fn build(self) -> Box<dyn Normalizer> {
        match self {
            Self::Lowercase => Box::new(Lowercase),
            Self::Snowball(lang) => Box::new(SnowballStemmer::new(lang)),
        }
    }
}

impl fmt::Display for NormalizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowercase => f.write_str("lowercase"),
            Self::Snowball(lang) => write!(f, "snowball/{}", lang.as_str()),
        }
    }
}

/// Maps a raw token to its canonical term. Must be deterministic and side-effect free.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, token: &str) -> String;

    fn kind(&self) -> NormalizerKind;
}

fn fold_case(token: &str) -> String {
    token.nfkc().collect::<String>().to_lowercase()
}

/// Case folding only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lowercase;

impl Normalizer for Lowercase {
    fn normalize(&self, token: &str) -> String {
        fold_case(token)
    }

    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Lowercase
    }
}

/// Case folding followed by a Snowball stemmer.
pub struct SnowballStemmer {
    language: StemLanguage,
    stemmer: Stemmer,
}

impl SnowballStemmer {
    pub fn new(language: StemLanguage) -> Self {
        Self { language, stemmer: Stemmer::create(language.algorithm()) }
    }
}

impl Normalizer for SnowballStemmer {
    fn normalize(&self, token: &str) -> String {
        let folded = fold_case(token);
        self.stemmer.stem(&folded).into_owned()
    }

    fn kind(&self) -> NormalizerKind {
        NormalizerKind::Snowball(self.language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_tokenize() {
        let t = tokenize("Running, runner's run!");
        assert_eq!(t, vec!["Running", "runner", "s", "run"]);
    }

    #[test]
    fn underscore_is_part_of_a_word() {
        assert_eq!(tokenize("snake_case  x-y"), vec!["snake_case", "x", "y"]);
    }

    #[test]
    fn stemmer_reduces_inflections() {
        let s = SnowballStemmer::new(StemLanguage::English);
        assert_eq!(s.normalize("Running"), "run");
        assert_eq!(s.normalize("RUNS"), "run");
    }

    #[test]
    fn lowercase_keeps_surface_form() {
        assert_eq!(Lowercase.normalize("Running"), "running");
    }

    #[test]
    fn parse_normalizer_kind() {
        assert_eq!(NormalizerKind::parse("off").unwrap(), NormalizerKind::Lowercase);
        assert_eq!(
            NormalizerKind::parse("German").unwrap(),
            NormalizerKind::Snowball(StemLanguage::German)
        );
        assert!(NormalizerKind::parse("klingon").is_err());
    }
}
