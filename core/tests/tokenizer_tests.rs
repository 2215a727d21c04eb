use sift_core::tokenizer::{tokenize, Lowercase, Normalizer, NormalizerKind, SnowballStemmer, StemLanguage};

#[test]
fn it_normalizes_and_stems() {
    let stemmer = SnowballStemmer::new(StemLanguage::English);
    let words: Vec<String> = tokenize("Running Runners RUN! The café's menu.")
        .into_iter()
        .map(|t| stemmer.normalize(t))
        .collect();
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"menu".to_string()));
    // stopwords are kept: every token counts toward document length
    assert!(words.contains(&"the".to_string()));
}

#[test]
fn it_splits_on_unicode_word_boundaries() {
    let toks = tokenize("naïve—coöperation, 東京 x_y 42!");
    assert_eq!(toks, vec!["naïve", "coöperation", "東京", "x_y", "42"]);
}

#[test]
fn compatibility_forms_fold_together() {
    // full-width letters and the "ﬁ" ligature fold to their plain forms
    assert_eq!(Lowercase.normalize("ＲＵＳＴ"), "rust");
    assert_eq!(Lowercase.normalize("ﬁle"), "file");
}

#[test]
fn normalization_is_deterministic() {
    let a = NormalizerKind::default().build();
    let b = NormalizerKind::default().build();
    for token in tokenize("Searching indexes quickly, searched INDEXED quicker") {
        assert_eq!(a.normalize(token), b.normalize(token));
    }
}

#[test]
fn kind_round_trips_through_build() {
    for kind in [NormalizerKind::Lowercase, NormalizerKind::Snowball(StemLanguage::Russian)] {
        assert_eq!(kind.build().kind(), kind);
    }
}
