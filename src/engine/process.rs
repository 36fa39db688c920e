//! Out-of-process engine driver.
//!
//! Each invocation owns one [`ProcessHandle`] that walks this state machine:
//!
//! ```text
//! Created ─► StreamsWired ─► Started ─► Running ─┬─► Completed ─┐
//!    │            │             │          │     └─► Failed ────┤
//!    └────────────┴─────────────┴──────────┴── cancel / error ──┴─► Closed
//! ```
//!
//! Once the engine starts, three tasks run concurrently until it exits:
//!
//! ```text
//!            ┌──────────────┐  stdin   ┌────────┐  stdout  ┌──────────────┐
//!  source ──►│ input writer │ ───────► │ engine │ ───────► │ output reader│──► raster bytes
//!            └──────────────┘          └───┬────┘          └──────────────┘
//!                                          │ stderr        ┌──────────────┐
//!                                          └─────────────► │  diag drain  │──► error detail
//!                                                          └──────────────┘
//! ```
//!
//! Reading stdout only after stdin is fully written deadlocks as soon as
//! either pipe buffer fills, so the three pumps are never sequential.
//!
//! Every handle is closed exactly once. The normal path closes it
//! explicitly (kill, reap, abort pumps, delete temp output); if the caller
//! drops the future mid-flight, `Drop` performs the same teardown
//! synchronously.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ExtractError;

use super::command::EngineCommand;

// =============================================================================
// Invocation
// =============================================================================

/// Where the engine's primary output ends up.
#[derive(Debug)]
pub enum OutputTarget {
    /// Engine writes to its standard output
    Stdout,

    /// Engine writes to this file; it is deleted when the handle closes
    File(TempPath),
}

/// One engine run: the command, optional standard input, and output target.
#[derive(Debug)]
pub struct Invocation {
    pub command: EngineCommand,
    pub stdin: Option<Bytes>,
    pub output: OutputTarget,
}

/// Lifecycle of a single engine invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Created,
    StreamsWired,
    Started,
    Running,
    Completed,
    Failed,
    Closed,
}

// =============================================================================
// Process Handle
// =============================================================================

type Pump<T> = JoinHandle<io::Result<T>>;

struct ProcessHandle {
    id: u64,
    state: HandleState,
    child: Option<Child>,
    writer: Option<Pump<()>>,
    reader: Option<Pump<Vec<u8>>>,
    drainer: Option<Pump<Vec<u8>>>,
    output_file: Option<TempPath>,
    open: Arc<AtomicUsize>,
}

impl ProcessHandle {
    fn new(id: u64, open: Arc<AtomicUsize>, output: OutputTarget) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        let output_file = match output {
            OutputTarget::Stdout => None,
            OutputTarget::File(path) => Some(path),
        };
        Self {
            id,
            state: HandleState::Created,
            child: None,
            writer: None,
            reader: None,
            drainer: None,
            output_file,
            open,
        }
    }

    fn transition(&mut self, next: HandleState) {
        debug!(handle = self.id, from = ?self.state, to = ?next, "Engine handle transition");
        self.state = next;
    }

    /// Drive the engine from `Created` to the point where output is collected.
    async fn execute(
        &mut self,
        command: &EngineCommand,
        stdin: Option<Bytes>,
        settle: Duration,
    ) -> Result<Bytes, ExtractError> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            process.current_dir(dir);
        }
        self.transition(HandleState::StreamsWired);

        debug!(handle = self.id, command = %command.command_line(), "Starting engine");
        let mut child = process.spawn().map_err(|e| spawn_error(command, e))?;
        self.transition(HandleState::Started);

        let (mut child_in, mut child_out, mut child_err) =
            match (child.stdin.take(), child.stdout.take(), child.stderr.take()) {
                (Some(i), Some(o), Some(e)) => (i, o, e),
                _ => {
                    self.child = Some(child);
                    return Err(ExtractError::Io {
                        context: "wire engine streams",
                        message: "engine standard streams were not captured".to_string(),
                    });
                }
            };
        self.child = Some(child);

        self.writer = Some(tokio::spawn(async move {
            if let Some(data) = stdin {
                match child_in.write_all(&data).await {
                    // The engine may stop reading once it has what it needs
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
                    other => other?,
                }
            }
            child_in.shutdown().await
        }));
        self.reader = Some(tokio::spawn(async move {
            let mut buf = Vec::new();
            child_out.read_to_end(&mut buf).await?;
            Ok(buf)
        }));
        self.drainer = Some(tokio::spawn(async move {
            let mut buf = Vec::new();
            child_err.read_to_end(&mut buf).await?;
            Ok(buf)
        }));
        self.transition(HandleState::Running);

        let status = self.wait().await?;
        let written = join(self.writer.take(), "write engine input").await;
        let stdout = join(self.reader.take(), "read engine output").await;
        let stderr = join(self.drainer.take(), "read engine diagnostics").await;

        let diagnostics = stderr
            .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
            .unwrap_or_default();

        if !status.success() {
            return Err(ExtractError::DecodeProcess {
                exit_code: status.code(),
                stderr: diagnostics,
            });
        }
        if !diagnostics.is_empty() {
            debug!(handle = self.id, stderr = %diagnostics, "Engine diagnostics");
        }

        written?;
        let stdout = stdout?;

        match &self.output_file {
            None => Ok(Bytes::from(stdout)),
            Some(path) => {
                tokio::time::sleep(settle).await;
                tokio::fs::read(path)
                    .await
                    .map(Bytes::from)
                    .map_err(|e| ExtractError::Io {
                        context: "read engine output file",
                        message: e.to_string(),
                    })
            }
        }
    }

    async fn wait(&mut self) -> Result<ExitStatus, ExtractError> {
        match self.child.as_mut() {
            Some(child) => child
                .wait()
                .await
                .map_err(|e| ExtractError::from_io("wait for engine", e)),
            None => Err(ExtractError::Io {
                context: "wait for engine",
                message: "engine was never started".to_string(),
            }),
        }
    }

    /// Record the outcome of `execute`.
    fn finish(&mut self, result: &Result<Bytes, ExtractError>) {
        match result {
            Ok(_) => self.transition(HandleState::Completed),
            Err(e) => {
                debug!(handle = self.id, error = %e, "Engine invocation failed");
                self.transition(HandleState::Failed);
            }
        }
    }

    /// Kill and reap the engine if it is still running, then release.
    async fn close(&mut self) {
        if self.state == HandleState::Closed {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!(handle = self.id, "Killing engine");
                if let Err(e) = child.kill().await {
                    warn!(handle = self.id, error = %e, "Failed to kill engine");
                }
            }
        }
        self.release();
    }

    /// Synchronous part of closing, shared with `Drop`.
    fn release(&mut self) {
        if self.state == HandleState::Closed {
            return;
        }
        if let Some(pump) = self.writer.take() {
            pump.abort();
        }
        if let Some(pump) = self.reader.take() {
            pump.abort();
        }
        if let Some(pump) = self.drainer.take() {
            pump.abort();
        }
        if let Some(path) = self.output_file.take() {
            if let Err(e) = path.close() {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(handle = self.id, error = %e, "Failed to remove engine output file");
                }
            }
        }
        self.child = None;
        self.transition(HandleState::Closed);
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.state != HandleState::Closed {
            if let Some(child) = self.child.as_mut() {
                let _ = child.start_kill();
            }
            self.release();
        }
    }
}

async fn join<T>(pump: Option<Pump<T>>, context: &'static str) -> Result<T, ExtractError> {
    let Some(pump) = pump else {
        return Err(ExtractError::Io {
            context,
            message: "stream task was not started".to_string(),
        });
    };
    match pump.await {
        Ok(result) => result.map_err(|e| ExtractError::from_io(context, e)),
        Err(e) => Err(ExtractError::Io {
            context,
            message: e.to_string(),
        }),
    }
}

fn spawn_error(command: &EngineCommand, err: io::Error) -> ExtractError {
    match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            ExtractError::Configuration(format!(
                "cannot execute engine '{}': {}",
                command.program.display(),
                err
            ))
        }
        _ => ExtractError::from_io("spawn engine", err),
    }
}

// =============================================================================
// Process Adapter
// =============================================================================

/// Runs engine invocations and accounts for their handles.
///
/// Cloning is cheap; clones share the open-handle counter.
#[derive(Clone)]
pub struct ProcessAdapter {
    settle: Duration,
    open: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl ProcessAdapter {
    /// `settle` is the pause between engine exit and reading a temp output file.
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            open: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Handles that have been created but not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Run one invocation to completion, failure, or cancellation.
    ///
    /// Returns the engine's primary output (stdout or the output file).
    pub async fn run(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<Bytes, ExtractError> {
        let Invocation {
            command,
            stdin,
            output,
        } = invocation;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut handle = ProcessHandle::new(id, self.open.clone(), output);

        if cancel.is_cancelled() {
            handle.transition(HandleState::Failed);
            handle.close().await;
            return Err(ExtractError::Cancelled);
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractError::Cancelled),
            result = handle.execute(&command, stdin, self.settle) => result,
        };

        handle.finish(&result);
        handle.close().await;
        result
    }
}

impl std::fmt::Debug for ProcessAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessAdapter")
            .field("settle", &self.settle)
            .field("open_handles", &self.open_handles())
            .finish()
    }
}
