//! Syntax highlighting for code samples.
//!
//! The engine is expensive to build, so it lives behind a
//! [`HighlighterCache`] that constructs it once and shares the handle with
//! every [`HighlightPipeline`] invocation.

mod cache;
mod pipeline;

pub use cache::{EngineFactory, HighlighterCache};
pub use pipeline::{HighlightPipeline, HighlightResult, escape_code};

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::{SyntaxReference, SyntaxSet};

use crate::error::{EngineInitError, RenderError};

/// Theme used when none is configured.
pub const DEFAULT_THEME: &str = "github-dark";

/// Free-form language identifier, e.g. `"python"` or `"bash"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LanguageTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Highlight theme identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThemeId(String);

impl ThemeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThemeId {
    fn default() -> Self {
        Self::new(DEFAULT_THEME)
    }
}

impl fmt::Display for ThemeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A highlighting engine: turns source text into HTML markup.
pub trait HighlightEngine: Send + Sync {
    /// Render `code` as highlighted HTML.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the language is unknown or the engine
    /// cannot process the input.
    fn render(
        &self,
        code: &str,
        language: &LanguageTag,
        theme: &ThemeId,
    ) -> Result<String, RenderError>;
}

/// Shared reference to a constructed engine.
#[derive(Clone)]
pub struct HighlighterHandle(Arc<dyn HighlightEngine>);

impl HighlighterHandle {
    pub fn new(engine: impl HighlightEngine + 'static) -> Self {
        Self(Arc::new(engine))
    }

    /// # Errors
    ///
    /// Propagates the engine's [`RenderError`].
    pub fn render(
        &self,
        code: &str,
        language: &LanguageTag,
        theme: &ThemeId,
    ) -> Result<String, RenderError> {
        self.0.render(code, language, theme)
    }

    /// Whether both handles point at the same engine instance.
    pub fn same_engine(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HighlighterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HighlighterHandle")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Engine backed by syntect's Sublime Text syntaxes and themes.
pub struct SyntectEngine {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
}

impl SyntectEngine {
    /// Load the bundled syntaxes and themes, plus any `.sublime-syntax`
    /// files found under `extra_syntax_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineInitError::Syntaxes`] if the extra directory cannot
    /// be read or contains an invalid definition.
    pub fn load(extra_syntax_dir: Option<&Path>) -> Result<Self, EngineInitError> {
        let _scope = crate::perf::scope("highlight.engine.load");
        let syntax_set = match extra_syntax_dir {
            None => SyntaxSet::load_defaults_newlines(),
            Some(dir) => {
                let mut builder = SyntaxSet::load_defaults_newlines().into_builder();
                builder
                    .add_from_folder(dir, true)
                    .map_err(|err| EngineInitError::Syntaxes {
                        path: dir.display().to_string(),
                        reason: err.to_string(),
                    })?;
                builder.build()
            }
        };
        let theme_set = ThemeSet::load_defaults();
        tracing::debug!(
            syntaxes = syntax_set.syntaxes().len(),
            themes = theme_set.themes.len(),
            "syntect engine loaded"
        );
        Ok(Self {
            syntax_set,
            theme_set,
        })
    }

    fn find_syntax(&self, language: &LanguageTag) -> Option<&SyntaxReference> {
        let tag = language.as_str().trim();
        if tag.is_empty() {
            return None;
        }
        if PLAIN_TEXT_TAGS.iter().any(|plain| plain.eq_ignore_ascii_case(tag)) {
            return Some(self.syntax_set.find_syntax_plain_text());
        }
        self.syntax_set
            .find_syntax_by_token(tag)
            .or_else(|| self.syntax_set.find_syntax_by_name(tag))
    }

    fn resolve_theme(&self, theme: &ThemeId) -> Option<&Theme> {
        let themes = &self.theme_set.themes;
        if let Some(found) = themes.get(theme.as_str()) {
            return Some(found);
        }
        if let Some(alias) = theme_alias(theme.as_str())
            && let Some(found) = themes.get(alias)
        {
            return Some(found);
        }

        let preferred = if theme.as_str().contains("light") {
            LIGHT_THEMES
        } else {
            DARK_THEMES
        };
        preferred
            .iter()
            .find_map(|name| themes.get(*name))
            .or_else(|| themes.values().next())
    }
}

/// Tags that mean "no grammar". syntect only knows plain text as `txt` or
/// by its display name.
const PLAIN_TEXT_TAGS: &[&str] = &["text", "plain", "plaintext", "txt"];

const DARK_THEMES: &[&str] = &[
    "base16-ocean.dark",
    "base16-eighties.dark",
    "base16-mocha.dark",
    "Solarized (dark)",
];

const LIGHT_THEMES: &[&str] = &["InspiredGitHub", "Solarized (light)", "base16-ocean.light"];

fn theme_alias(id: &str) -> Option<&'static str> {
    match id {
        "github-dark" | "github-dark-default" | "dark" => Some("base16-ocean.dark"),
        "github-light" | "github-light-default" | "light" => Some("InspiredGitHub"),
        "solarized-dark" => Some("Solarized (dark)"),
        "solarized-light" => Some("Solarized (light)"),
        _ => None,
    }
}

impl HighlightEngine for SyntectEngine {
    fn render(
        &self,
        code: &str,
        language: &LanguageTag,
        theme: &ThemeId,
    ) -> Result<String, RenderError> {
        let syntax = self
            .find_syntax(language)
            .ok_or_else(|| RenderError::UnsupportedLanguage(language.to_string()))?;
        let theme = self
            .resolve_theme(theme)
            .ok_or_else(|| RenderError::Engine("no themes loaded".to_string()))?;
        highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
            .map_err(|err| RenderError::Engine(err.to_string()))
    }
}
