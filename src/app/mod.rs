//! Code blocks on a page and the loop that renders them.
//!
//! This module implements The Elm Architecture (TEA):
//! - [`Model`]: every code block and its state
//! - [`Message`]: mounts, input changes, highlight completions, copy requests
//! - [`update`]: pure state transitions
//! - [`App::run`]: event loop with side effects and page output

mod effects;
mod event_loop;
mod model;
mod update;

pub use model::{BlockId, CodeBlock, Display, Model, RequestId, Sample};
pub use update::{HighlightCompletion, Message, update};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::clipboard::{Clipboard, SystemClipboard};
use crate::copy::{COPY_FEEDBACK_WINDOW, ClipboardFailurePolicy};
use crate::highlight::{HighlightPipeline, HighlighterCache};

/// Owns the page's samples and the collaborators used to render them.
pub struct App {
    samples: Vec<Sample>,
    pipeline: HighlightPipeline,
    clipboard: Box<dyn Clipboard>,
    copy_window: Duration,
    clipboard_policy: ClipboardFailurePolicy,
    copy_on_start: Option<BlockId>,
    watch_enabled: bool,
    output: Option<PathBuf>,
}

impl App {
    /// Create an application rendering `samples` with the syntect engine.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            pipeline: HighlightPipeline::new(Arc::new(HighlighterCache::syntect(None))),
            clipboard: Box::new(SystemClipboard),
            copy_window: COPY_FEEDBACK_WINDOW,
            clipboard_policy: ClipboardFailurePolicy::default(),
            copy_on_start: None,
            watch_enabled: false,
            output: None,
        }
    }

    /// Use a specific pipeline (and with it, a specific shared cache).
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: HighlightPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    #[must_use]
    pub fn with_clipboard(mut self, clipboard: Box<dyn Clipboard>) -> Self {
        self.clipboard = clipboard;
        self
    }

    #[must_use]
    pub const fn with_copy_window(mut self, window: Duration) -> Self {
        self.copy_window = window;
        self
    }

    #[must_use]
    pub const fn with_clipboard_policy(mut self, policy: ClipboardFailurePolicy) -> Self {
        self.clipboard_policy = policy;
        self
    }

    /// Copy one block to the clipboard as soon as the page mounts.
    #[must_use]
    pub const fn with_copy_on_start(mut self, block: Option<BlockId>) -> Self {
        self.copy_on_start = block;
        self
    }

    /// Keep running and re-render when a sample's source file changes.
    #[must_use]
    pub const fn with_watch(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    /// Write the page to `path` instead of stdout.
    #[must_use]
    pub fn with_output(mut self, path: Option<PathBuf>) -> Self {
        self.output = path;
        self
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("samples", &self.samples.len())
            .field("pipeline", &self.pipeline)
            .field("watch_enabled", &self.watch_enabled)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}
