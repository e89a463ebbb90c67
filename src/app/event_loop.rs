use std::fs;
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::app::{App, BlockId, Message, Model, update};
use crate::copy::CopyFeedback;
use crate::perf::Event;
use crate::watcher::SampleWatcher;

/// How long the loop waits for a message before re-checking timers.
const POLL_INTERVAL: Duration = Duration::from_millis(50);
const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

impl App {
    /// Run the event loop and write the page.
    ///
    /// Without watching, returns once every block has settled and the page
    /// has been written. With watching, writes a new page whenever a source
    /// file changes or a copy label expires, and runs until the process is
    /// interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be written or the file watcher
    /// cannot be created.
    pub fn run(&self) -> Result<()> {
        let _run_scope = crate::perf::scope("app.run.total");
        let mut watcher = if self.watch_enabled {
            let paths = self.source_paths();
            Some(SampleWatcher::new(&paths, WATCH_DEBOUNCE).context("Failed to watch samples")?)
        } else {
            None
        };
        let output = self.output.clone();
        let keep_running = self.watch_enabled;
        self.event_loop(watcher.as_mut(), keep_running, |page| write_page(output.as_deref(), page))?;
        if crate::perf::is_enabled() {
            let stats = crate::perf::stats();
            tracing::info!(target: "codeblock::perf", %stats, "render summary");
        }
        Ok(())
    }

    /// Render every sample once and return the page HTML.
    ///
    /// # Errors
    ///
    /// Never fails in practice; shares the loop with [`run`](Self::run).
    pub fn render_to_string(&self) -> Result<String> {
        let mut rendered = String::new();
        self.event_loop(None, false, |page| {
            page.clone_into(&mut rendered);
            Ok(())
        })?;
        Ok(rendered)
    }

    fn source_paths(&self) -> Vec<PathBuf> {
        self.samples
            .iter()
            .filter_map(|sample| sample.source.clone())
            .collect()
    }

    fn initial_model(&self) -> Model {
        let feedback = CopyFeedback::new(self.copy_window).with_policy(self.clipboard_policy);
        Model::with_copy_feedback(self.samples.clone(), &feedback)
    }

    fn event_loop(
        &self,
        mut watcher: Option<&mut SampleWatcher>,
        keep_running: bool,
        mut on_page: impl FnMut(&str) -> Result<()>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let mut model = self.initial_model();

        for idx in 0..model.blocks.len() {
            self.dispatch(&mut model, &tx, Message::Mount(BlockId(idx)));
        }
        if let Some(block) = self.copy_on_start {
            self.dispatch(&mut model, &tx, Message::CopyRequested(block));
        }

        let mut frame_idx: u64 = 0;
        loop {
            self.dispatch(&mut model, &tx, Message::Tick(Instant::now()));

            if let Some(watcher) = watcher.as_deref_mut() {
                for path in watcher.take_changed() {
                    self.reload_source(&mut model, &tx, &path);
                }
            }

            let timeout = model
                .next_copy_deadline()
                .map_or(POLL_INTERVAL, |deadline| {
                    deadline
                        .saturating_duration_since(Instant::now())
                        .min(POLL_INTERVAL)
                });
            self.drain_messages(&mut model, &tx, &rx, timeout);

            if model.dirty && model.is_settled() {
                frame_idx += 1;
                let draw_start = Instant::now();
                let page = crate::ui::render_page(&model, Instant::now());
                on_page(&page)?;
                model.dirty = false;
                crate::perf::record(&Event::PageWritten {
                    frame: frame_idx,
                    blocks: model.blocks.len(),
                    draw_ms: draw_start.elapsed().as_secs_f64() * 1000.0,
                });
                if !keep_running {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Wait up to `timeout` for one message, then apply everything queued.
    fn drain_messages(
        &self,
        model: &mut Model,
        tx: &Sender<Message>,
        rx: &Receiver<Message>,
        timeout: Duration,
    ) {
        let first = match rx.recv_timeout(timeout) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return,
        };
        self.dispatch(model, tx, first);

        // Coalesce completions that finished together into a single frame.
        let mut drained = 0_u32;
        while let Ok(msg) = rx.try_recv() {
            drained += 1;
            self.dispatch(model, tx, msg);
        }
        if drained > 0 {
            crate::perf::record(&Event::Drained { count: drained });
        }
    }

    pub(super) fn dispatch(&self, model: &mut Model, tx: &Sender<Message>, msg: Message) {
        if !matches!(msg, Message::Tick(_)) && crate::perf::is_debug_log_enabled() {
            crate::perf::record(&Event::Message {
                summary: &describe(&msg),
            });
        }
        let side_msg = msg.clone();
        *model = update(std::mem::take(model), msg);
        self.handle_message_side_effects(model, tx, &side_msg);
    }

    fn reload_source(&self, model: &mut Model, tx: &Sender<Message>, path: &Path) {
        let code = match fs::read_to_string(path) {
            Ok(code) => code,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to reload sample");
                crate::perf::record(&Event::ReloadFailed { path, reason: &err });
                return;
            }
        };
        for id in model.blocks_for_source(path) {
            let Some(block) = model.block(id) else {
                continue;
            };
            if block.code == code {
                continue;
            }
            let language = block.language.clone();
            self.dispatch(
                model,
                tx,
                Message::SetInput {
                    block: id,
                    code: code.clone(),
                    language,
                },
            );
        }
    }
}

/// Short message description for the debug log (omits sample text).
fn describe(msg: &Message) -> String {
    match msg {
        Message::Mount(id) => format!("Mount({})", id.0),
        Message::SetInput {
            block, language, ..
        } => format!("SetInput({}, {language})", block.0),
        Message::HighlightFinished(done) => format!(
            "HighlightFinished({}, request={}, fallback={})",
            done.block.0,
            done.request.0,
            done.result.is_fallback()
        ),
        Message::CopyRequested(id) => format!("CopyRequested({})", id.0),
        Message::Tick(_) => "Tick".to_string(),
    }
}

fn write_page(output: Option<&Path>, page: &str) -> Result<()> {
    match output {
        Some(path) => fs::write(path, page)
            .with_context(|| format!("Failed to write page {}", path.display())),
        None => {
            let mut out = stdout();
            out.write_all(page.as_bytes())?;
            out.flush()?;
            Ok(())
        }
    }
}
