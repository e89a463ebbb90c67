use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::copy::{ClipboardFailurePolicy, CopyFeedback};
use crate::highlight::{HighlightResult, LanguageTag};

use super::update::HighlightCompletion;

/// Language used when a file has no extension and none was given.
const PLAIN_LANGUAGE: &str = "text";

/// Index of a code block on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub usize);

/// Identity of one highlight request for one block.
///
/// Monotonic per block; only the latest one may update what is displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Raw input for one code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub code: String,
    pub language: LanguageTag,
    /// File the code was read from, if any (used for watching).
    pub source: Option<PathBuf>,
}

impl Sample {
    pub fn new(code: impl Into<String>, language: impl Into<LanguageTag>) -> Self {
        Self {
            code: code.into(),
            language: language.into(),
            source: None,
        }
    }

    /// Read a sample from disk. The language defaults to the file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read as UTF-8 text.
    pub fn from_file(path: &Path, language: Option<&LanguageTag>) -> Result<Self> {
        let code = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sample {}", path.display()))?;
        let language = language.cloned().unwrap_or_else(|| language_for_path(path));
        Ok(Self {
            code,
            language,
            source: Some(path.to_path_buf()),
        })
    }
}

pub(super) fn language_for_path(path: &Path) -> LanguageTag {
    path.extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map_or_else(|| LanguageTag::new(PLAIN_LANGUAGE), LanguageTag::new)
}

/// What a block currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Display {
    /// A request for the current input is in flight.
    Pending,
    Rendered(HighlightResult),
}

/// One code sample on the page: inputs, highlight state, copy feedback.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub id: BlockId,
    pub code: String,
    pub language: LanguageTag,
    pub source: Option<PathBuf>,
    pub copy: CopyFeedback,
    request: RequestId,
    display: Display,
}

impl CodeBlock {
    fn new(id: BlockId, sample: Sample, copy: CopyFeedback) -> Self {
        Self {
            id,
            code: sample.code,
            language: sample.language,
            source: sample.source,
            copy,
            request: RequestId::default(),
            display: Display::Pending,
        }
    }

    /// Replace the inputs and start a new request generation.
    pub(super) fn set_input(&mut self, code: String, language: LanguageTag) -> RequestId {
        self.code = code;
        self.language = language;
        self.request = self.request.next();
        self.display = Display::Pending;
        self.request
    }

    /// Apply a completion if it answers the current request.
    ///
    /// Returns false (and changes nothing) for stale completions.
    pub(super) fn apply(&mut self, completion: HighlightCompletion) -> bool {
        if completion.request != self.request {
            return false;
        }
        self.display = Display::Rendered(completion.result);
        true
    }

    pub const fn request(&self) -> RequestId {
        self.request
    }

    pub const fn display(&self) -> &Display {
        &self.display
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self.display, Display::Pending)
    }
}

/// The page: every code block and whether it needs redrawing.
#[derive(Debug, Default)]
pub struct Model {
    pub blocks: Vec<CodeBlock>,
    /// Set when something visible changed since the page was last written.
    pub dirty: bool,
}

impl Model {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self::with_copy_feedback(samples, &CopyFeedback::default())
    }

    /// Build a model whose blocks each start from a copy of `feedback`.
    pub fn with_copy_feedback(samples: Vec<Sample>, feedback: &CopyFeedback) -> Self {
        let blocks = samples
            .into_iter()
            .enumerate()
            .map(|(idx, sample)| CodeBlock::new(BlockId(idx), sample, feedback.clone()))
            .collect();
        Self {
            blocks,
            dirty: true,
        }
    }

    /// Convenience for tests and callers that set their own copy window.
    pub fn with_copy_window(
        samples: Vec<Sample>,
        window: Duration,
        policy: ClipboardFailurePolicy,
    ) -> Self {
        Self::with_copy_feedback(samples, &CopyFeedback::new(window).with_policy(policy))
    }

    pub fn block(&self, id: BlockId) -> Option<&CodeBlock> {
        self.blocks.get(id.0)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut CodeBlock> {
        self.blocks.get_mut(id.0)
    }

    /// True when no block has a request in flight.
    pub fn is_settled(&self) -> bool {
        self.blocks.iter().all(|block| !block.is_pending())
    }

    pub fn pending_count(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_pending()).count()
    }

    /// Expire elapsed copy feedback. Returns true if any block changed.
    pub(super) fn expire_copies(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for block in &mut self.blocks {
            changed |= block.copy.expire(now);
        }
        changed
    }

    /// Earliest pending copy-feedback expiry.
    pub fn next_copy_deadline(&self) -> Option<Instant> {
        self.blocks
            .iter()
            .filter_map(|block| block.copy.deadline())
            .min()
    }

    /// Blocks whose code was loaded from `path`.
    pub fn blocks_for_source(&self, path: &Path) -> Vec<BlockId> {
        self.blocks
            .iter()
            .filter(|block| block.source.as_deref() == Some(path))
            .map(|block| block.id)
            .collect()
    }
}
