//! Error types for the highlighting core.
//!
//! None of these ever reach the reader of a rendered page: engine and
//! render failures degrade to escaped plain text, clipboard failures to a
//! no-op.

use thiserror::Error;

/// Constructing the shared highlighting engine failed.
///
/// Cloneable so a single failed attempt can be handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineInitError {
    /// Extra syntax definitions could not be loaded.
    #[error("failed to load syntax definitions from {path}: {reason}")]
    Syntaxes { path: String, reason: String },
    /// The construction routine panicked before producing an engine.
    #[error("highlighter construction aborted")]
    Aborted,
    /// The engine reported itself unavailable (used by injected engines).
    #[error("highlighter unavailable: {0}")]
    Unavailable(String),
}

/// Highlighting one specific sample failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("highlighting engine error: {0}")]
    Engine(String),
    #[error("highlighting engine panicked")]
    Panicked,
}

/// Writing to the system clipboard failed.
#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("no clipboard available")]
    Unsupported,
}
