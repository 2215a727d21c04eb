use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sift_core::builder::analyze;
use sift_core::tokenizer::tokenize;
use sift_core::{IndexBuilder, NormalizerKind, SourceDocument, UnreadablePolicy};

const TEXT: &str = "Searching indexes quickly requires a tokenizer that splits words, \
    a normalizer that folds case and stems, and an inverted index mapping every term \
    to the documents containing it. Rankers then weigh rare terms above common ones.";

fn corpus(n: usize) -> Vec<SourceDocument> {
    (0..n).map(|i| SourceDocument::new(format!("doc{i}.txt"), TEXT.repeat(1 + i % 4))).collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = TEXT.repeat(50);
    c.bench_function("tokenize", |b| b.iter(|| tokenize(black_box(&text))));

    let stemmer = NormalizerKind::default().build();
    c.bench_function("analyze_stemmed", |b| b.iter(|| analyze(black_box(&text), stemmer.as_ref())));
}

fn bench_build(c: &mut Criterion) {
    let docs = corpus(500);
    let builder = IndexBuilder::new(NormalizerKind::default(), UnreadablePolicy::Skip);
    c.bench_function("build_500_docs", |b| {
        b.iter(|| builder.build(docs.iter().cloned().map(Ok)).map(|(snap, _)| snap.meta.num_docs))
    });
}

criterion_group!(benches, bench_tokenize, bench_build);
criterion_main!(benches);
