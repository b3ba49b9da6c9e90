//! Where session input comes from and where replies go.
//!
//! Input sources are async (stdin is read through Tokio); output sinks are
//! plain synchronous writers.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::warn;

/// Prompt shown by [`StdinInput`] before each line.
pub const DEFAULT_PROMPT: &str = "Ask the agent > ";

/// Boxed future returned by [`InputSource::next_line`].
pub type InputFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// A stream of session inputs. `None` ends the session.
pub trait InputSource: Send {
    fn next_line(&mut self) -> InputFuture<'_>;
}

/// Writes session replies somewhere.
pub trait OutputSink: Send {
    fn emit(&mut self, text: &str) -> Result<(), String>;
}

// ── Input sources ──────────────────────────────────────────────────

/// Interactive input from stdin, one line per turn.
pub struct StdinInput {
    prompt: String,
    lines: Lines<BufReader<Stdin>>,
}

impl StdinInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT)
    }
}

impl InputSource for StdinInput {
    fn next_line(&mut self) -> InputFuture<'_> {
        Box::pin(async move {
            let mut stdout = tokio::io::stdout();
            if let Err(e) = stdout.write_all(self.prompt.as_bytes()).await {
                warn!("Failed to write prompt: {e}");
            }
            if let Err(e) = stdout.flush().await {
                warn!("Failed to flush prompt: {e}");
            }

            match self.lines.next_line().await {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    None
                }
            }
        })
    }
}

/// Lines read up front from a file (or supplied directly), one per turn.
#[derive(Debug, Default)]
pub struct FileInput {
    lines: VecDeque<String>,
}

impl FileInput {
    pub fn open(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read input file {}: {e}", path.display()))?;
        Ok(Self::from_lines(text.lines()))
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl InputSource for FileInput {
    fn next_line(&mut self) -> InputFuture<'_> {
        let line = self.lines.pop_front();
        Box::pin(async move { line })
    }
}

/// No input at all; a session with this source ends immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInput;

impl InputSource for NoInput {
    fn next_line(&mut self) -> InputFuture<'_> {
        Box::pin(async { None })
    }
}

// ── Output sinks ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn emit(&mut self, text: &str) -> Result<(), String> {
        println!("{text}");
        Ok(())
    }
}

/// Appends each reply, newline-terminated, to a file.
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    file: File,
}

impl FileOutput {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("failed to open output file {}: {e}", path.display()))?;
        Ok(Self { path, file })
    }
}

impl OutputSink for FileOutput {
    fn emit(&mut self, text: &str) -> Result<(), String> {
        writeln!(self.file, "{text}")
            .map_err(|e| format!("failed to write {}: {e}", self.path.display()))
    }
}

/// Discards every reply.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOutput;

impl OutputSink for NoOutput {
    fn emit(&mut self, _text: &str) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_input_yields_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "first\nsecond\n").unwrap();

        let mut input = FileInput::open(&path).unwrap();
        assert_eq!(input.remaining(), 2);
        assert_eq!(input.next_line().await.as_deref(), Some("first"));
        assert_eq!(input.next_line().await.as_deref(), Some("second"));
        assert_eq!(input.next_line().await, None);
    }

    #[test]
    fn missing_input_file_is_an_error() {
        let err = FileInput::open(Path::new("/nonexistent/handoff-input.txt")).unwrap_err();
        assert!(err.contains("failed to read input file"));
    }

    #[tokio::test]
    async fn no_input_ends_immediately() {
        assert_eq!(NoInput.next_line().await, None);
    }

    #[test]
    fn file_output_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "existing\n").unwrap();

        let mut out = FileOutput::append(&path).unwrap();
        out.emit("one").unwrap();
        out.emit("two").unwrap();
        drop(out);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\none\ntwo\n");
    }
}
