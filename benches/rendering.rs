//! Benchmarks for highlighting and page rendering.

use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use codeblock::app::{App, Sample};
use codeblock::highlight::{HighlightPipeline, HighlighterCache, LanguageTag, escape_code};

const RUST_SAMPLE: &str = r#"use std::collections::HashMap;

fn main() {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in "a b a c b a".split_whitespace() {
        *counts.entry(word).or_default() += 1;
    }
    println!("{counts:?}");
}
"#;

fn bench_highlight(c: &mut Criterion) {
    let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None)));
    let rust = LanguageTag::new("rust");
    // Build the engine outside the measured loop.
    let _ = pipeline.highlight("", &rust);

    c.bench_function("highlight_rust", |b| {
        b.iter(|| pipeline.highlight(black_box(RUST_SAMPLE), &rust));
    });
}

fn bench_escape(c: &mut Criterion) {
    let html = "<div class=\"x\">a & b</div>\n".repeat(200);
    c.bench_function("escape_code", |b| b.iter(|| escape_code(black_box(&html))));
}

fn bench_render_page(c: &mut Criterion) {
    let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None)));
    let samples = (0..10)
        .map(|_| Sample::new(RUST_SAMPLE, "rust"))
        .collect::<Vec<_>>();
    let app = App::new(samples).with_pipeline(pipeline);

    c.bench_function("render_page_10_blocks", |b| {
        b.iter(|| app.render_to_string());
    });
}

criterion_group!(benches, bench_highlight, bench_escape, bench_render_page);
criterion_main!(benches);
