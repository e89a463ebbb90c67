use std::time::Instant;

use crate::app::Model;
use crate::app::model::{BlockId, RequestId};
use crate::highlight::{HighlightResult, LanguageTag};
use crate::perf::Event;

/// A finished highlight request, tagged with the input it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightCompletion {
    pub block: BlockId,
    pub request: RequestId,
    pub result: HighlightResult,
}

/// All possible events and actions on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A block appeared on the page; highlight its current input
    Mount(BlockId),
    /// A block's code or language changed
    SetInput {
        block: BlockId,
        code: String,
        language: LanguageTag,
    },
    /// A highlight worker finished
    HighlightFinished(HighlightCompletion),
    /// The user asked to copy a block's code
    CopyRequested(BlockId),
    /// Clock tick; lets copy feedback expire
    Tick(Instant),
}

/// Pure function that updates the model based on a message.
///
/// Spawning highlight workers and touching the clipboard happen afterwards
/// in the side-effect handler.
pub fn update(mut model: Model, msg: Message) -> Model {
    match msg {
        Message::Mount(id) => {
            if let Some(block) = model.block_mut(id) {
                let code = std::mem::take(&mut block.code);
                let language = block.language.clone();
                let request = block.set_input(code, language);
                crate::perf::record(&Event::Requested {
                    block: id.0,
                    request: request.0,
                    mount: true,
                });
                model.dirty = true;
            }
        }
        Message::SetInput {
            block: id,
            code,
            language,
        } => {
            if let Some(block) = model.block_mut(id) {
                let request = block.set_input(code, language);
                crate::perf::record(&Event::Requested {
                    block: id.0,
                    request: request.0,
                    mount: false,
                });
                model.dirty = true;
            }
        }
        Message::HighlightFinished(completion) => {
            let id = completion.block;
            let request = completion.request;
            let fallback = completion.result.is_fallback();
            let Some(block) = model.block_mut(id) else {
                return model;
            };
            if block.apply(completion) {
                crate::perf::record(&Event::Highlighted {
                    block: id.0,
                    request: request.0,
                    fallback,
                });
                model.dirty = true;
            } else {
                let current = block.request().0;
                tracing::debug!(
                    block = id.0,
                    stale = request.0,
                    current,
                    "dropping stale highlight result"
                );
                crate::perf::record(&Event::StaleDropped {
                    block: id.0,
                    request: request.0,
                    current,
                });
            }
        }
        Message::CopyRequested(_) => {
            // Clipboard write and feedback state change happen in side effects.
        }
        Message::Tick(now) => {
            if model.expire_copies(now) {
                model.dirty = true;
            }
        }
    }
    model
}
