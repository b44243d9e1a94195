//! TaskContext - 実行中のメソッドに渡されるハンドル
//!
//! 出力はチャネル経由でログポンプに送られ、ポンプが行単位でストアに追記する。
//! キャンセルは CancellationToken で協調的に伝わる。

use std::io;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::domain::TaskId;

/// Returned by cancellation-aware helpers once the task has been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task was cancelled")]
pub struct Cancelled;

/// Sending half of a task's output channel. Each message is one or more
/// complete lines.
///
/// The channel is unbounded so that `println` and `io::Write` never block the
/// method. Output produced faster than the store can append it is buffered in
/// memory until the log pump catches up.
#[derive(Debug, Clone)]
pub struct TaskOutput {
    tx: UnboundedSender<String>,
}

impl TaskOutput {
    pub fn channel() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send `line` followed by a newline.
    pub fn println(&self, line: impl AsRef<str>) {
        let mut text = String::with_capacity(line.as_ref().len() + 1);
        text.push_str(line.as_ref());
        text.push('\n');
        self.send(text);
    }

    fn send(&self, text: String) {
        // The pump is gone once the task has finished; late output is dropped.
        let _ = self.tx.send(text);
    }

    pub fn writer(&self) -> OutputWriter {
        OutputWriter {
            output: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// `io::Write` adapter over [`TaskOutput`].
///
/// Bytes are buffered until a newline; each completed line is forwarded.
/// A trailing partial line is forwarded on drop.
#[derive(Debug)]
pub struct OutputWriter {
    output: TaskOutput,
    pending: Vec<u8>,
}

impl OutputWriter {
    fn forward_complete_lines(&mut self) {
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.output.send(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

impl io::Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        self.forward_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for OutputWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.output.send(String::from_utf8_lossy(&rest).into_owned());
        }
    }
}

/// Handle given to a target method for one run.
#[derive(Debug, Clone)]
pub struct TaskContext {
    id: TaskId,
    output: TaskOutput,
    cancel: CancellationToken,
}

impl TaskContext {
    pub fn new(id: TaskId, output: TaskOutput, cancel: CancellationToken) -> Self {
        Self { id, output, cancel }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Append one line to the task log.
    pub fn println(&self, line: impl AsRef<str>) {
        self.output.println(line);
    }

    pub fn output(&self) -> &TaskOutput {
        &self.output
    }

    pub fn writer(&self) -> OutputWriter {
        self.output.writer()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the task is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// `Err(Cancelled)` if the task has been cancelled. Meant for `?` inside
    /// long CPU-bound loops that never reach an await point.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep that returns early with `Err(Cancelled)` on cancellation.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
