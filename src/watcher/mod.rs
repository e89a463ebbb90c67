//! File watching for live re-rendering of samples.
//!
//! Uses notify crate for cross-platform file system events.
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

struct WatchTarget {
    /// Path as the caller gave it; reported back on change.
    path: PathBuf,
    canonical: PathBuf,
    root: PathBuf,
    name: Option<OsString>,
    pending_since: Option<Instant>,
}

impl WatchTarget {
    fn new(path: &Path) -> Self {
        // Canonicalize so event paths from the OS (which are always absolute
        // and canonical) match our stored paths.
        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let name = canonical.file_name().map(std::ffi::OsStr::to_os_string);
        let root = watch_root_for(&canonical);
        Self {
            path: path.to_path_buf(),
            canonical,
            root,
            name,
            pending_since: None,
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        event.paths.iter().any(|path| {
            path == &self.root
                || path == &self.canonical
                || (path.parent() == Some(self.root.as_path())
                    && self
                        .name
                        .as_ref()
                        .is_some_and(|name| path.file_name().is_some_and(|f| f == name)))
        })
    }
}

/// Watches the source files of a set of samples and reports debounced
/// changes per file.
pub struct SampleWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    targets: Vec<WatchTarget>,
    debounce: Duration,
}

impl SampleWatcher {
    /// Create a watcher for `paths`.
    ///
    /// # Errors
    /// Returns an error if the file watcher cannot be created or a directory
    /// cannot be watched.
    pub fn new(paths: &[PathBuf], debounce: Duration) -> notify::Result<Self> {
        let targets: Vec<WatchTarget> = paths.iter().map(|p| WatchTarget::new(p)).collect();
        let roots: BTreeSet<&Path> = targets.iter().map(|t| t.root.as_path()).collect();

        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        for root in roots {
            watcher.watch(root, RecursiveMode::NonRecursive)?;
        }

        Ok(Self {
            _watcher: watcher,
            rx,
            targets,
            debounce,
        })
    }

    /// Paths whose debounced change is ready, in the order they were given.
    pub fn take_changed(&mut self) -> Vec<PathBuf> {
        let mut total_events = 0u32;
        while let Ok(event) = self.rx.try_recv() {
            total_events += 1;
            match event {
                Ok(ev) => self.mark_relevant(&ev, Instant::now()),
                Err(err) => {
                    tracing::warn!(%err, "file watcher error");
                    crate::perf::record(&crate::perf::Event::WatcherFailed { reason: &err });
                }
            }
        }
        if total_events > 0 {
            crate::perf::record(&crate::perf::Event::WatcherPolled {
                events: total_events,
            });
        }
        self.take_ready(Instant::now())
    }

    fn mark_relevant(&mut self, event: &Event, now: Instant) {
        let mut matched = 0usize;
        for target in &mut self.targets {
            if target.is_relevant(event) {
                target.pending_since = Some(now);
                matched += 1;
            }
        }
        if matched == 0 {
            tracing::trace!(kind = ?event.kind, paths = ?event.paths, "ignoring file event");
            crate::perf::record(&crate::perf::Event::WatcherIgnored {
                paths: event.paths.len(),
            });
        }
    }

    fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready = Vec::new();
        for target in &mut self.targets {
            if target
                .pending_since
                .is_some_and(|since| now.saturating_duration_since(since) >= self.debounce)
            {
                target.pending_since = None;
                ready.push(target.path.clone());
            }
        }
        ready
    }
}

fn watch_root_for(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}
