use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::app::model::{BlockId, CodeBlock};
use crate::app::{App, HighlightCompletion, Message, Model};
use crate::highlight::{HighlightResult, escape_code};
use crate::perf::Event;

impl App {
    pub(super) fn handle_message_side_effects(
        &self,
        model: &mut Model,
        tx: &Sender<Message>,
        msg: &Message,
    ) {
        match msg {
            Message::Mount(id) | Message::SetInput { block: id, .. } => {
                if let Some(block) = model.block(*id) {
                    self.spawn_highlight(block, tx);
                }
            }
            Message::CopyRequested(id) => {
                self.copy_block(model, *id, Instant::now());
            }
            _ => {}
        }
    }

    /// Run the pipeline for the block's current input on a worker thread.
    ///
    /// The completion is posted back tagged with the request id it answers,
    /// so a newer input makes it stale.
    fn spawn_highlight(&self, block: &CodeBlock, tx: &Sender<Message>) {
        let pipeline = self.pipeline.clone();
        let code = block.code.clone();
        let language = block.language.clone();
        let id = block.id;
        let request = block.request();
        let worker_tx = tx.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("highlight-{}", id.0))
            .spawn(move || {
                let result = pipeline.highlight(&code, &language);
                let _ = worker_tx.send(Message::HighlightFinished(HighlightCompletion {
                    block: id,
                    request,
                    result,
                }));
            });

        if let Err(err) = spawned {
            tracing::warn!(block = id.0, %err, "failed to spawn highlight worker");
            let _ = tx.send(Message::HighlightFinished(HighlightCompletion {
                block: id,
                request,
                result: HighlightResult::Fallback(escape_code(&block.code)),
            }));
        }
    }

    pub(super) fn copy_block(&self, model: &mut Model, id: BlockId, now: Instant) {
        let Some(block) = model.block_mut(id) else {
            tracing::debug!(block = id.0, "copy requested for unknown block");
            return;
        };
        let code = block.code.clone();
        block
            .copy
            .on_copy_requested(&code, self.clipboard.as_ref(), now);
        crate::perf::record(&Event::Copied {
            block: id.0,
            bytes: code.len(),
            copied: block.copy.is_copied(now),
        });
        model.dirty = true;
    }
}
