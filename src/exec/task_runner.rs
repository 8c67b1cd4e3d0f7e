// src/exec/task_runner.rs

//! Individual task process runner.

use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::engine::RuntimeEvent;
use crate::errors::InputAcquisitionError;
use crate::types::{CapturedStream, ExecutionResult, ProcessHandle, StdinSource, Task};

use super::kill::kill_process_tree;

const STDIN_CHUNK_SIZE: usize = 64 * 1024;

/// Most bytes kept per output stream. A process writing more is killed.
pub const MAX_CAPTURE_BYTES: usize = 20_000 * 1024;

/// Build a shell command appropriate for the platform.
///
/// The process inherits the environment with the task's overrides applied,
/// gets a piped stdin only when there is input to feed, and leads its own
/// process group on unix so the whole tree can be killed at once.
pub fn build_command(task: &Task) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&task.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&task.cmd);
        c
    };

    cmd.envs(&task.env);

    let stdin = if task.input().is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };

    cmd.stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

/// Supervise a spawned task process until it exits, then send exactly one
/// `ProcessExited` event for `handle`.
///
/// stdout and stderr are captured up to [`MAX_CAPTURE_BYTES`] each; `input`
/// is fed to stdin concurrently. If the input cannot be acquired, or a stream
/// goes over the limit, the process tree is killed and the result says why.
pub async fn run_task(
    handle: ProcessHandle,
    child: Child,
    input: Option<StdinSource>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let result = match run_task_inner(child, input).await {
        Ok(result) => result,
        Err(err) => {
            error!(%handle, error = %err, "task supervision error");
            ExecutionResult::launch_failure(format!("{err:#}"))
        }
    };

    info!(
        %handle,
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        success = result.success(),
        "task process exited"
    );

    if runtime_tx
        .send(RuntimeEvent::ProcessExited { handle, result })
        .await
        .is_err()
    {
        debug!(%handle, "runtime gone; exit not delivered");
    }
}

async fn run_task_inner(mut child: Child, input: Option<StdinSource>) -> Result<ExecutionResult> {
    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (status, stdout, stderr, input_error) = tokio::join!(
        child.wait(),
        read_capped(stdout, CapturedStream::Stdout, pid),
        read_capped(stderr, CapturedStream::Stderr, pid),
        feed_stdin(stdin, input, pid),
    );
    let (stdout, stdout_overflow) = stdout;
    let (stderr, stderr_overflow) = stderr;
    let output_overflow = stdout_overflow.or(stderr_overflow);

    let status = status.context("waiting for task process")?;

    #[cfg(unix)]
    let signal = std::os::unix::process::ExitStatusExt::signal(&status);
    #[cfg(not(unix))]
    let signal = None;

    let stderr = stderr
        .or_else(|| input_error.as_ref().map(ToString::to_string))
        .or_else(|| {
            output_overflow.map(|stream| {
                format!("{stream} exceeded the capture limit of {MAX_CAPTURE_BYTES} bytes")
            })
        });

    Ok(ExecutionResult {
        exit_code: status.code(),
        signal,
        stdout,
        stderr,
        input_error,
        output_overflow,
    })
}

/// Read a pipe to the end as lossy UTF-8, keeping at most
/// [`MAX_CAPTURE_BYTES`]. Empty output is `None`.
///
/// Going over the limit kills the process tree and reports `stream` as the
/// overflowing one.
async fn read_capped<R>(
    pipe: Option<R>,
    stream: CapturedStream,
    pid: Option<u32>,
) -> (Option<String>, Option<CapturedStream>)
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return (None, None);
    };

    let mut buf = Vec::new();
    let limit = u64::try_from(MAX_CAPTURE_BYTES).unwrap_or(u64::MAX);
    let mut limited = pipe.take(limit.saturating_add(1));
    if let Err(err) = limited.read_to_end(&mut buf).await {
        debug!(%stream, error = %err, "error reading process output");
    }

    let mut overflow = None;
    if buf.len() > MAX_CAPTURE_BYTES {
        buf.truncate(MAX_CAPTURE_BYTES);
        overflow = Some(stream);
        warn!(
            %stream,
            limit = MAX_CAPTURE_BYTES,
            "output over capture limit; killing task process"
        );
        if let Some(pid) = pid {
            kill_process_tree(pid);
        }
    }

    let text = if buf.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&buf).into_owned())
    };
    (text, overflow)
}

/// Write the task input to the child's stdin, then close it.
///
/// Write failures (typically a closed pipe because the process doesn't read
/// its input) only stop the feeding. Failing to open or read an input file is
/// an input acquisition error: the process tree is killed and the error is
/// returned.
async fn feed_stdin(
    stdin: Option<ChildStdin>,
    input: Option<StdinSource>,
    pid: Option<u32>,
) -> Option<InputAcquisitionError> {
    let (mut stdin, input) = match (stdin, input) {
        (Some(stdin), Some(input)) => (stdin, input),
        _ => return None,
    };

    match input {
        StdinSource::Literal(text) => {
            if let Err(err) = stdin.write_all(text.as_bytes()).await {
                debug!(error = %err, "stdin closed before input was written");
            }
            None
        }
        StdinSource::File(path) => {
            let error = stream_file(&path, &mut stdin).await.err()?;
            warn!(%error, "input acquisition failed; killing task process");
            if let Some(pid) = pid {
                kill_process_tree(pid);
            }
            Some(error)
        }
    }
}

async fn stream_file(path: &Path, stdin: &mut ChildStdin) -> Result<(), InputAcquisitionError> {
    let acquisition_error = |operation: &str, err: std::io::Error| InputAcquisitionError {
        input: path.display().to_string(),
        operation: operation.to_string(),
        message: err.to_string(),
    };

    let mut file = File::open(path)
        .await
        .map_err(|err| acquisition_error("open", err))?;

    let mut chunk = vec![0u8; STDIN_CHUNK_SIZE];
    loop {
        let n = file
            .read(&mut chunk)
            .await
            .map_err(|err| acquisition_error("read", err))?;
        if n == 0 {
            break;
        }

        if let Err(err) = stdin.write_all(&chunk[..n]).await {
            debug!(error = %err, input = %path.display(), "stdin closed while streaming input");
            break;
        }
    }

    Ok(())
}
