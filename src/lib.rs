// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. highlight::HighlightResult)
    clippy::module_name_repetitions
)]

//! # Codeblock
//!
//! Syntax-highlighted code samples for documentation pages.
//!
//! Every sample on a page is highlighted through one shared engine:
//! - The engine is built lazily, at most once at a time, and reused forever
//!   once built; failed builds are retried by the next request
//! - Highlighting never fails outward: errors degrade to escaped plain text
//! - Results are applied in input-freshness order, so a slow stale request
//!   cannot overwrite a newer one
//! - Each block has its own transient "copied" feedback
//!
//! ## Architecture
//!
//! The page uses The Elm Architecture (TEA) pattern:
//! - **Model**: every code block and its state
//! - **Message**: mounts, input changes, highlight completions, copy requests
//! - **Update**: pure state transitions
//! - **View**: HTML fragments
//!
//! ## Modules
//!
//! - [`highlight`]: engine, single-flight cache, highlight pipeline
//! - [`copy`]: copy-to-clipboard feedback state
//! - [`clipboard`]: system clipboard access
//! - [`app`]: page model and event loop
//! - [`ui`]: HTML rendering
//! - [`watcher`]: file watching
//! - [`config`]: saved defaults

pub mod app;
pub mod clipboard;
pub mod config;
pub mod copy;
pub mod error;
pub mod highlight;
pub mod perf;
pub mod ui;
pub mod watcher;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{App, BlockId, Message, Model, Sample};
    pub use crate::copy::{ClipboardFailurePolicy, CopyFeedback, CopyState};
    pub use crate::highlight::{
        HighlightPipeline, HighlightResult, HighlighterCache, LanguageTag, ThemeId,
    };
}
