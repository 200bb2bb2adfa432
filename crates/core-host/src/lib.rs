//! Editor-host and clipboard ports.
//!
//! The engine talks to its surroundings through two small traits. A real
//! editor host supplies the current file, its unsaved buffer, and modal
//! dialogs; the console host degrades every dialog to stdout and answers
//! alerts with the neutral first button, so the patcher stays usable from a
//! plain terminal.

use std::io::{Read, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("clipboard unavailable: {0}")]
    ClipboardUnavailable(String),
    #[error("clipboard read failed: {0}")]
    ClipboardRead(String),
    #[error("clipboard write failed: {0}")]
    ClipboardWrite(String),
    #[error("stdin read failed: {0}")]
    StdinRead(#[from] std::io::Error),
}

/// What the surrounding editor offers the patcher.
pub trait Host {
    /// Absolute path of the file open in the editor, if any.
    fn current_file(&self) -> Option<PathBuf>;
    /// The editor's unsaved buffer for the current file, when the host can
    /// read it. Drives the dirty-buffer preflight check.
    fn buffer_text(&self) -> Option<String>;
    /// Modal alert; returns the 1-based index of the chosen button.
    fn alert(&self, title: &str, message: &str, buttons: &[&str]) -> usize;
    /// Transient notice, fire and forget.
    fn toast(&self, message: &str);
    /// List picker; `None` when the host has no picker or the user bailed.
    fn pick(&self, title: &str, items: &[String]) -> Option<usize>;
}

/// Bundle source and run-packet sink.
pub trait Clipboard {
    fn read_text(&mut self) -> Result<String, HostError>;
    fn write_text(&mut self, text: &str) -> Result<(), HostError>;
}

/// Terminal fallback host: prints instead of dialogs, answers alerts with
/// button 1, offers no picker.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    pub current: Option<PathBuf>,
}

impl ConsoleHost {
    pub fn new(current: Option<PathBuf>) -> Self {
        Self { current }
    }
}

impl Host for ConsoleHost {
    fn current_file(&self) -> Option<PathBuf> {
        self.current.clone()
    }

    fn buffer_text(&self) -> Option<String> {
        // A terminal has no unsaved editor buffer to compare against.
        None
    }

    fn alert(&self, title: &str, message: &str, buttons: &[&str]) -> usize {
        println!("{title}");
        println!("{message}");
        if !buttons.is_empty() {
            println!("[{}]", buttons.join(" / "));
        }
        1
    }

    fn toast(&self, message: &str) {
        println!("{message}");
    }

    fn pick(&self, title: &str, items: &[String]) -> Option<usize> {
        println!("{title}");
        for (i, item) in items.iter().enumerate() {
            println!("  {}. {item}", i + 1);
        }
        None
    }
}

/// System clipboard via `arboard`. Construction fails where no clipboard
/// exists (headless sessions); callers decide whether that is fatal.
pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn new() -> Result<Self, HostError> {
        arboard::Clipboard::new()
            .map(|inner| Self { inner })
            .map_err(|e| HostError::ClipboardUnavailable(e.to_string()))
    }
}

impl Clipboard for SystemClipboard {
    fn read_text(&mut self) -> Result<String, HostError> {
        self.inner
            .get_text()
            .map_err(|e| HostError::ClipboardRead(e.to_string()))
    }

    fn write_text(&mut self, text: &str) -> Result<(), HostError> {
        self.inner
            .set_text(text.to_string())
            .map_err(|e| HostError::ClipboardWrite(e.to_string()))
    }
}

/// Pipe fallback: reads the bundle from stdin, writes packets to stdout.
/// Used when the user passes `--bundle -` or no clipboard is available for
/// output.
#[derive(Debug, Default)]
pub struct StdioClipboard;

impl Clipboard for StdioClipboard {
    fn read_text(&mut self) -> Result<String, HostError> {
        let mut text = String::new();
        std::io::stdin().lock().read_to_string(&mut text)?;
        Ok(text)
    }

    fn write_text(&mut self, text: &str) -> Result<(), HostError> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        lock.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            lock.write_all(b"\n")?;
        }
        Ok(())
    }
}

/// Best clipboard for packet output: the system clipboard when present,
/// stdout otherwise.
pub fn packet_sink() -> Box<dyn Clipboard> {
    match SystemClipboard::new() {
        Ok(clipboard) => {
            debug!(target: "host", "system_clipboard_ready");
            Box::new(clipboard)
        }
        Err(e) => {
            warn!(target: "host", error = %e, "clipboard_missing_falling_back_to_stdout");
            Box::new(StdioClipboard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_host_answers_neutral_button() {
        let host = ConsoleHost::new(None);
        assert_eq!(host.alert("t", "m", &["Apply", "Cancel"]), 1);
        assert_eq!(host.pick("t", &["a".into()]), None);
        assert!(host.buffer_text().is_none());
    }

    #[test]
    fn console_host_reports_current_file() {
        let host = ConsoleHost::new(Some(PathBuf::from("/tmp/x.py")));
        assert_eq!(host.current_file(), Some(PathBuf::from("/tmp/x.py")));
    }
}
