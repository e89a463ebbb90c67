//! Render diagnostics: typed events, counters and timing scopes.
//!
//! Every noteworthy step of rendering (engine attempts, fallbacks, stale
//! drops, copies, page writes) is described by an [`Event`]. Events are
//! always counted; when a render debug log is open they are also written to
//! it, one line each. [`scope`] guards report elapsed time through `tracing`
//! when `--perf` is on.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

static ENABLED: AtomicBool = AtomicBool::new(false);
static EVENTS: LazyLock<EventLog> = LazyLock::new(EventLog::default);

/// Something that happened while rendering the page.
#[derive(Clone, Copy)]
pub enum Event<'a> {
    /// A highlighter construction attempt finished.
    EngineResolved { attempt: usize, ok: bool },
    /// A sample was shown as escaped text instead of markup.
    Fallback {
        language: &'a str,
        reason: &'a dyn fmt::Display,
    },
    /// A block started a new highlight request.
    Requested {
        block: usize,
        request: u64,
        mount: bool,
    },
    /// A completion for the current request was applied.
    Highlighted {
        block: usize,
        request: u64,
        fallback: bool,
    },
    /// A completion arrived for a superseded request and was dropped.
    StaleDropped {
        block: usize,
        request: u64,
        current: u64,
    },
    Copied {
        block: usize,
        bytes: usize,
        copied: bool,
    },
    ClipboardFailed { reason: &'a dyn fmt::Display },
    /// A message entered the update loop (sample text omitted).
    Message { summary: &'a str },
    /// Queued messages applied together with the first one.
    Drained { count: u32 },
    PageWritten {
        frame: u64,
        blocks: usize,
        draw_ms: f64,
    },
    ReloadFailed {
        path: &'a Path,
        reason: &'a dyn fmt::Display,
    },
    WatcherPolled { events: u32 },
    WatcherFailed { reason: &'a dyn fmt::Display },
    /// A file system event that matched no watched sample.
    WatcherIgnored { paths: usize },
    Timing { scope: &'static str, elapsed_ms: f64 },
}

impl Event<'_> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EngineResolved { .. } => "engine.resolved",
            Self::Fallback { .. } => "highlight.fallback",
            Self::Requested { mount: true, .. } => "block.mount",
            Self::Requested { mount: false, .. } => "block.input",
            Self::Highlighted { .. } => "block.highlighted",
            Self::StaleDropped { .. } => "block.stale",
            Self::Copied { .. } => "copy.requested",
            Self::ClipboardFailed { .. } => "copy.error",
            Self::Message { .. } => "event.message",
            Self::Drained { .. } => "event.drain",
            Self::PageWritten { .. } => "page.written",
            Self::ReloadFailed { .. } => "reload.error",
            Self::WatcherPolled { .. } => "watcher.poll",
            Self::WatcherFailed { .. } => "watcher.error",
            Self::WatcherIgnored { .. } => "watcher.ignored",
            Self::Timing { .. } => "timing",
        }
    }
}

impl fmt::Display for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EngineResolved { attempt, ok } => write!(f, "attempt={attempt} ok={ok}"),
            Self::Fallback { language, reason } => {
                write!(f, "language={language} reason={reason}")
            }
            Self::Requested { block, request, .. } => {
                write!(f, "block={block} request={request}")
            }
            Self::Highlighted {
                block,
                request,
                fallback,
            } => write!(f, "block={block} request={request} fallback={fallback}"),
            Self::StaleDropped {
                block,
                request,
                current,
            } => write!(f, "block={block} request={request} current={current}"),
            Self::Copied {
                block,
                bytes,
                copied,
            } => write!(f, "block={block} bytes={bytes} copied={copied}"),
            Self::ClipboardFailed { reason } | Self::WatcherFailed { reason } => {
                write!(f, "reason={reason}")
            }
            Self::Message { summary } => f.write_str(summary),
            Self::Drained { count } => write!(f, "count={count}"),
            Self::PageWritten {
                frame,
                blocks,
                draw_ms,
            } => write!(f, "frame={frame} blocks={blocks} draw_ms={draw_ms:.3}"),
            Self::ReloadFailed { path, reason } => {
                write!(f, "path={} reason={reason}", path.display())
            }
            Self::WatcherPolled { events } => write!(f, "events={events}"),
            Self::WatcherIgnored { paths } => write!(f, "paths={paths}"),
            Self::Timing { scope, elapsed_ms } => write!(f, "{scope} {elapsed_ms:.3}ms"),
        }
    }
}

/// Totals of the events that matter for a render's health.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub engine_attempts: u64,
    pub engine_failures: u64,
    pub fallbacks: u64,
    pub stale_drops: u64,
    pub copies: u64,
    pub clipboard_failures: u64,
    pub pages: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "engine_attempts={} engine_failures={} fallbacks={} stale_drops={} copies={} \
             clipboard_failures={} pages={}",
            self.engine_attempts,
            self.engine_failures,
            self.fallbacks,
            self.stale_drops,
            self.copies,
            self.clipboard_failures,
            self.pages
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    engine_attempts: AtomicU64,
    engine_failures: AtomicU64,
    fallbacks: AtomicU64,
    stale_drops: AtomicU64,
    copies: AtomicU64,
    clipboard_failures: AtomicU64,
    pages: AtomicU64,
}

impl Counters {
    fn count(&self, event: &Event<'_>) {
        let counter = match event {
            Event::EngineResolved { ok, .. } => {
                if !ok {
                    self.engine_failures.fetch_add(1, Ordering::Relaxed);
                }
                &self.engine_attempts
            }
            Event::Fallback { .. } => &self.fallbacks,
            Event::StaleDropped { .. } => &self.stale_drops,
            Event::Copied { .. } => &self.copies,
            Event::ClipboardFailed { .. } => &self.clipboard_failures,
            Event::PageWritten { .. } => &self.pages,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> Stats {
        Stats {
            engine_attempts: self.engine_attempts.load(Ordering::Relaxed),
            engine_failures: self.engine_failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            stale_drops: self.stale_drops.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            clipboard_failures: self.clipboard_failures.load(Ordering::Relaxed),
            pages: self.pages.load(Ordering::Relaxed),
        }
    }
}

struct Sink {
    start: Instant,
    writer: BufWriter<File>,
}

/// Counts events and, while a log file is open, appends them to it.
#[derive(Default)]
pub struct EventLog {
    counters: Counters,
    sink: Mutex<Option<Sink>>,
}

impl EventLog {
    /// Start writing to `path`, replacing any open log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn open(&self, path: &Path) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# codeblock render events")?;
        writer.flush()?;
        *self.sink() = Some(Sink {
            start: Instant::now(),
            writer,
        });
        Ok(())
    }

    pub fn close(&self) {
        *self.sink() = None;
    }

    pub fn is_open(&self) -> bool {
        self.sink().is_some()
    }

    pub fn record(&self, event: &Event<'_>) {
        self.counters.count(event);
        let mut sink = self.sink();
        let Some(sink) = sink.as_mut() else {
            return;
        };
        let elapsed_ms = sink.start.elapsed().as_secs_f64() * 1000.0;
        let _ = writeln!(sink.writer, "{elapsed_ms:>10.3}ms {} {event}", event.name());
        let _ = sink.writer.flush();
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    fn sink(&self) -> MutexGuard<'_, Option<Sink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard that reports how long a named section took.
#[derive(Debug)]
pub struct Scope {
    name: &'static str,
    start: Instant,
}

impl Drop for Scope {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::info!(target: "codeblock::perf", scope = self.name, elapsed_ms, "timing");
        record(&Event::Timing {
            scope: self.name,
            elapsed_ms,
        });
    }
}

pub fn scope(name: &'static str) -> Scope {
    Scope {
        name,
        start: Instant::now(),
    }
}

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Open (or close, with `None`) the process-wide render debug log.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or written.
pub fn set_debug_log_path(path: Option<&Path>) -> io::Result<()> {
    match path {
        Some(path) => EVENTS.open(path),
        None => {
            EVENTS.close();
            Ok(())
        }
    }
}

pub fn is_debug_log_enabled() -> bool {
    EVENTS.is_open()
}

/// Count `event` and write it to the render debug log if one is open.
pub fn record(event: &Event<'_>) {
    EVENTS.record(event);
}

/// Process-wide event totals so far.
pub fn stats() -> Stats {
    EVENTS.stats()
}
