//! Turns one code sample into display-ready markup.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use super::{HighlighterCache, LanguageTag, ThemeId};
use crate::error::{EngineInitError, RenderError};
use crate::perf::Event;

/// Outcome of highlighting one sample. Never partially rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HighlightResult {
    /// Highlighted HTML from the engine.
    Markup(String),
    /// The original code, HTML-escaped, with no highlighting.
    Fallback(String),
}

impl HighlightResult {
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    /// HTML safe to embed directly into a page.
    pub fn to_html(&self) -> String {
        match self {
            Self::Markup(html) => html.clone(),
            Self::Fallback(escaped) => format!("<pre><code>{escaped}</code></pre>"),
        }
    }
}

/// Escape code for use as HTML text content.
pub fn escape_code(code: &str) -> String {
    html_escape::encode_text(code).into_owned()
}

/// Highlights samples through a shared [`HighlighterCache`].
///
/// Every failure path degrades to [`HighlightResult::Fallback`]; nothing is
/// returned as an error.
#[derive(Clone)]
pub struct HighlightPipeline {
    cache: Arc<HighlighterCache>,
    theme: ThemeId,
}

impl HighlightPipeline {
    pub fn new(cache: Arc<HighlighterCache>) -> Self {
        Self {
            cache,
            theme: ThemeId::default(),
        }
    }

    #[must_use]
    pub fn with_theme(mut self, theme: ThemeId) -> Self {
        self.theme = theme;
        self
    }

    pub const fn theme(&self) -> &ThemeId {
        &self.theme
    }

    pub fn cache(&self) -> &Arc<HighlighterCache> {
        &self.cache
    }

    pub fn highlight(&self, code: &str, language: &LanguageTag) -> HighlightResult {
        let _scope = crate::perf::scope("highlight.pipeline");
        // A panicking factory resolves its waiters itself; the leader sees it here.
        let acquired = catch_unwind(AssertUnwindSafe(|| self.cache.acquire()))
            .unwrap_or(Err(EngineInitError::Aborted));
        let handle = match acquired {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(%err, %language, "highlighter unavailable, rendering plain text");
                crate::perf::record(&Event::Fallback {
                    language: language.as_str(),
                    reason: &err,
                });
                return HighlightResult::Fallback(escape_code(code));
            }
        };

        let rendered = catch_unwind(AssertUnwindSafe(|| {
            handle.render(code, language, &self.theme)
        }))
        .unwrap_or(Err(RenderError::Panicked));

        match rendered {
            Ok(html) => HighlightResult::Markup(html),
            Err(err) => {
                tracing::warn!(%err, %language, "highlighting failed, rendering plain text");
                crate::perf::record(&Event::Fallback {
                    language: language.as_str(),
                    reason: &err,
                });
                HighlightResult::Fallback(escape_code(code))
            }
        }
    }
}

impl std::fmt::Debug for HighlightPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HighlightPipeline")
            .field("theme", &self.theme)
            .field("ready", &self.cache.is_ready())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use proptest::prelude::*;

    use super::*;
    use crate::highlight::{HighlightEngine, HighlighterHandle};

    fn syntect_pipeline() -> &'static HighlightPipeline {
        static PIPELINE: OnceLock<HighlightPipeline> = OnceLock::new();
        PIPELINE.get_or_init(|| HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None))))
    }

    fn pipeline_with(engine: impl HighlightEngine + 'static) -> HighlightPipeline {
        let handle = HighlighterHandle::new(engine);
        HighlightPipeline::new(Arc::new(HighlighterCache::new(Box::new(move || {
            Ok(handle.clone())
        }))))
    }

    struct Panicky;

    impl HighlightEngine for Panicky {
        fn render(&self, _: &str, _: &LanguageTag, _: &ThemeId) -> Result<String, RenderError> {
            panic!("grammar blew up");
        }
    }

    struct ThemeEcho;

    impl HighlightEngine for ThemeEcho {
        fn render(&self, _: &str, _: &LanguageTag, theme: &ThemeId) -> Result<String, RenderError> {
            Ok(theme.to_string())
        }
    }

    #[test]
    fn test_known_language_produces_markup() {
        let result = syntect_pipeline().highlight("fn main() {}\n", &"rust".into());
        let HighlightResult::Markup(html) = result else {
            panic!("expected markup, got {result:?}");
        };
        assert!(html.contains("<span"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_escaped_code() {
        let code = "<script>alert('x')</script>";
        let result = syntect_pipeline().highlight(code, &"nonexistent-lang".into());
        assert_eq!(
            result,
            HighlightResult::Fallback(
                "&lt;script&gt;alert('x')&lt;/script&gt;".to_string()
            )
        );
        assert!(!result.to_html().contains("<script>"));
    }

    #[test]
    fn test_engine_init_failure_falls_back() {
        let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::new(Box::new(|| {
            Err(EngineInitError::Unavailable("offline".to_string()))
        }))));
        let result = pipeline.highlight("a < b && c", &"python".into());
        assert_eq!(
            result,
            HighlightResult::Fallback("a &lt; b &amp;&amp; c".to_string())
        );
    }

    #[test]
    fn test_panicking_render_falls_back() {
        let result = pipeline_with(Panicky).highlight("x = 1", &"python".into());
        assert_eq!(result, HighlightResult::Fallback("x = 1".to_string()));
    }

    #[test]
    fn test_panicking_factory_falls_back_then_retries() {
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let pipeline = HighlightPipeline::new(Arc::new(HighlighterCache::new(Box::new(move || {
            assert!(
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0,
                "first load panics"
            );
            Ok(HighlighterHandle::new(ThemeEcho))
        }))));

        let first = pipeline.highlight("x", &"python".into());
        assert_eq!(first, HighlightResult::Fallback("x".to_string()));
        let second = pipeline.highlight("x", &"python".into());
        assert_eq!(second, HighlightResult::Markup("github-dark".to_string()));
        assert_eq!(pipeline.cache().construction_count(), 2);
    }

    #[test]
    fn test_default_theme_is_github_dark() {
        let result = pipeline_with(ThemeEcho).highlight("x", &"python".into());
        assert_eq!(result, HighlightResult::Markup("github-dark".to_string()));
    }

    #[test]
    fn test_configured_theme_is_passed_to_engine() {
        let pipeline = pipeline_with(ThemeEcho).with_theme(ThemeId::new("solarized-light"));
        let result = pipeline.highlight("x", &"python".into());
        assert_eq!(result, HighlightResult::Markup("solarized-light".to_string()));
    }

    #[test]
    fn test_fallback_html_wraps_in_pre_code() {
        let result = HighlightResult::Fallback("a &lt; b".to_string());
        assert_eq!(result.to_html(), "<pre><code>a &lt; b</code></pre>");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_highlight_never_fails_and_fallback_is_escaped(
            code in ".{0,200}",
            language in prop_oneof![
                Just("rust".to_string()),
                Just("python".to_string()),
                Just("bash".to_string()),
                Just("nonexistent-lang".to_string()),
                "[a-z]{0,8}",
            ],
        ) {
            let result = syntect_pipeline().highlight(&code, &LanguageTag::new(language));
            if let HighlightResult::Fallback(escaped) = &result {
                prop_assert_eq!(escaped, &escape_code(&code));
                prop_assert!(!escaped.contains('<'));
                prop_assert!(!escaped.contains('>'));
            }
        }

        #[test]
        fn prop_escape_code_is_lossless(code in "[a-z<>&\"' \n]{0,120}") {
            let escaped = escape_code(&code);
            prop_assert!(!escaped.contains('<'));
            prop_assert!(!escaped.contains('>'));
            prop_assert_eq!(
                escaped.matches('&').count(),
                escaped.matches("&amp;").count()
                    + escaped.matches("&lt;").count()
                    + escaped.matches("&gt;").count()
            );
            prop_assert_eq!(html_escape::decode_html_entities(&escaped), code.as_str());
        }
    }
}
