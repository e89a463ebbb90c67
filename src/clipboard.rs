//! System clipboard access.

use std::io::{Write, stderr};

use base64::Engine;

use crate::error::ClipboardError;

/// Something that can receive copied text.
pub trait Clipboard {
    /// # Errors
    ///
    /// Returns [`ClipboardError`] if the text could not be handed over.
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// The platform clipboard: `pbcopy` on macOS, OSC 52 everywhere else.
///
/// The OSC 52 sequence goes to stderr so it never mixes with page output
/// written to stdout. The terminal never acknowledges it, so that path only
/// reports an error when stderr itself rejects the write.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        #[cfg(target_os = "macos")]
        {
            if copy_to_pbcopy(text).is_ok() {
                return Ok(());
            }
        }
        copy_to_clipboard_osc52(text)
    }
}

#[cfg(target_os = "macos")]
fn copy_to_pbcopy(text: &str) -> Result<(), ClipboardError> {
    use std::process::{Command, Stdio};

    let mut child = Command::new("pbcopy").stdin(Stdio::piped()).spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(ClipboardError::Io(std::io::Error::other("pbcopy failed")))
    }
}

fn copy_to_clipboard_osc52(text: &str) -> Result<(), ClipboardError> {
    let osc = osc52_sequence(text);
    let mut out = stderr();
    out.write_all(osc.as_bytes())?;
    out.flush()?;
    Ok(())
}

fn osc52_sequence(text: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(text.as_bytes());
    format!("\x1b]52;c;{encoded}\x07")
}

/// Clipboard that drops everything. Used when no terminal is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoClipboard;

impl Clipboard for NoClipboard {
    fn write_text(&self, _text: &str) -> Result<(), ClipboardError> {
        Err(ClipboardError::Unsupported)
    }
}
