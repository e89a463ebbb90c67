//! Transient "copied" feedback for one code block.

use std::time::{Duration, Instant};

use crate::clipboard::Clipboard;

/// How long the "copied" state lasts after a copy request.
pub const COPY_FEEDBACK_WINDOW: Duration = Duration::from_millis(2000);

/// What to show when the clipboard write itself fails.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardFailurePolicy {
    /// Report "copied" regardless of the write's outcome.
    #[default]
    Optimistic,
    /// Leave the state idle when the write fails.
    RevertToIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    Idle,
    Copied { expires_at: Instant },
}

/// Copy-feedback state for a single block. Never shared between blocks.
#[derive(Debug, Clone)]
pub struct CopyFeedback {
    state: CopyState,
    window: Duration,
    policy: ClipboardFailurePolicy,
}

impl Default for CopyFeedback {
    fn default() -> Self {
        Self::new(COPY_FEEDBACK_WINDOW)
    }
}

impl CopyFeedback {
    pub const fn new(window: Duration) -> Self {
        Self {
            state: CopyState::Idle,
            window,
            policy: ClipboardFailurePolicy::Optimistic,
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: ClipboardFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Put `text` on the clipboard and show "copied" until `now + window`.
    ///
    /// Clipboard errors are logged and swallowed. A repeat request restarts
    /// the window.
    pub fn on_copy_requested(&mut self, text: &str, clipboard: &dyn Clipboard, now: Instant) {
        if let Err(err) = clipboard.write_text(text) {
            tracing::warn!(%err, policy = ?self.policy, "clipboard write failed");
            crate::perf::record(&crate::perf::Event::ClipboardFailed { reason: &err });
            if self.policy == ClipboardFailurePolicy::RevertToIdle {
                self.state = CopyState::Idle;
                return;
            }
        }
        self.state = CopyState::Copied {
            expires_at: now + self.window,
        };
    }

    /// Return to idle once the window has elapsed. Returns true if the state
    /// changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        if let CopyState::Copied { expires_at } = self.state
            && expires_at <= now
        {
            self.state = CopyState::Idle;
            return true;
        }
        false
    }

    /// The state as it would be observed at `now`.
    pub fn state_at(&self, now: Instant) -> CopyState {
        match self.state {
            CopyState::Copied { expires_at } if expires_at <= now => CopyState::Idle,
            state => state,
        }
    }

    pub fn is_copied(&self, now: Instant) -> bool {
        matches!(self.state_at(now), CopyState::Copied { .. })
    }

    /// Next instant at which [`expire`](Self::expire) would change state.
    pub const fn deadline(&self) -> Option<Instant> {
        match self.state {
            CopyState::Copied { expires_at } => Some(expires_at),
            CopyState::Idle => None,
        }
    }

    /// Button label for the copy affordance.
    pub fn label(&self, now: Instant) -> &'static str {
        if self.is_copied(now) { "Copied!" } else { "Copy" }
    }
}
