use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use codeblock::app::{App, Sample};
use codeblock::error::EngineInitError;
use codeblock::highlight::{
    HighlightPipeline, HighlightResult, HighlighterCache, LanguageTag, SyntectEngine, ThemeId,
};

fn counting_syntect_cache(count: &Arc<AtomicUsize>) -> Arc<HighlighterCache> {
    let count = Arc::clone(count);
    Arc::new(HighlighterCache::new(Box::new(move || {
        count.fetch_add(1, Ordering::SeqCst);
        SyntectEngine::load(None).map(codeblock::highlight::HighlighterHandle::new)
    })))
}

#[test]
fn test_pipelines_sharing_a_cache_build_one_engine() {
    let count = Arc::new(AtomicUsize::new(0));
    let cache = counting_syntect_cache(&count);

    let handles = (0..8)
        .map(|i| {
            let pipeline = HighlightPipeline::new(Arc::clone(&cache));
            thread::spawn(move || pipeline.highlight(&format!("x = {i}\n"), &"python".into()))
        })
        .collect::<Vec<_>>();

    for handle in handles {
        let result = handle.join().unwrap();
        assert!(!result.is_fallback(), "unexpected fallback: {result:?}");
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(cache.is_ready());
}

#[test]
fn test_unknown_language_is_escaped_text() {
    let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None)));
    let result = pipeline.highlight("<script>alert(1)</script>", &LanguageTag::new("nonexistent-lang"));
    assert_eq!(
        result,
        HighlightResult::Fallback("&lt;script&gt;alert(1)&lt;/script&gt;".to_string())
    );
}

#[test]
fn test_failed_engine_recovers_on_next_request() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let cache = Arc::new(HighlighterCache::new(Box::new(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(10));
            return Err(EngineInitError::Unavailable("first load failed".to_string()));
        }
        SyntectEngine::load(None).map(codeblock::highlight::HighlighterHandle::new)
    })));
    let pipeline = HighlightPipeline::new(cache).with_theme(ThemeId::new("github-light"));

    let first = pipeline.highlight("fn main() {}", &"rust".into());
    assert_eq!(first, HighlightResult::Fallback("fn main() {}".to_string()));

    let second = pipeline.highlight("fn main() {}", &"rust".into());
    assert!(!second.is_fallback());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_app_renders_files_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let rust = dir.path().join("main.rs");
    let text = dir.path().join("notes");
    std::fs::write(&rust, "fn main() { println!(\"hi\"); }\n").unwrap();
    std::fs::write(&text, "a < b && c > d\n").unwrap();

    let samples = vec![
        Sample::from_file(&rust, None).unwrap(),
        Sample::from_file(&text, None).unwrap(),
    ];
    let page = App::new(samples).render_to_string().unwrap();

    assert!(page.starts_with("<section class=\"code-samples\">"));
    assert!(page.contains("data-language=\"rs\""));
    assert!(page.contains("data-language=\"text\""));
    assert_eq!(page.matches("data-state=\"ready\"").count(), 2);
    assert!(!page.contains("a < b"));
    assert!(!page.contains("<pre><code>"), "a block fell back:\n{page}");
}

#[test]
fn test_extensionless_file_is_highlighted_as_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("LICENSE");
    std::fs::write(&path, "a < b && c > d\n").unwrap();

    let sample = Sample::from_file(&path, None).unwrap();
    let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None)));
    let result = pipeline.highlight(&sample.code, &sample.language);

    let HighlightResult::Markup(html) = result else {
        panic!("expected markup, got {result:?}");
    };
    assert!(html.contains("a &lt; b &amp;&amp; c &gt; d"));
}
