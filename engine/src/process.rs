//! Subprocess management for toolkit invocations.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time;

use rallyd_utils::SecretRedactor;

use crate::error::RallyError;

/// Per-stream cap on captured output. Listings and detailed results stay far below this.
pub const MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

/// How long to wait for a killed child to be reaped.
const KILL_WAIT: Duration = Duration::from_secs(2);

/// RAII guard that kills a child process (and its process group on Unix) on drop.
///
/// Wrap a spawned child immediately after `spawn()` so that cancelling the
/// owning future (a request dropped mid-command, a background job aborted at
/// shutdown) takes the toolkit process down with it. Call `disarm()` once the
/// process has exited normally.
pub struct ChildGuard {
    child: Child,
    armed: bool,
}

impl ChildGuard {
    #[must_use]
    pub fn new(child: Child) -> Self {
        Self { child, armed: true }
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// Wait for exit, then disarm.
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.disarm();
        Ok(status)
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        #[cfg(unix)]
        {
            if let Some(pid) = self.child.id() {
                let killed = i32::try_from(pid)
                    .is_ok_and(|pgid| unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0);
                if !killed {
                    let _ = self.child.start_kill();
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }
        let _ = self.child.try_wait();
    }
}

/// Put the child process in its own session (Unix only) so the entire process
/// group can be killed via `killpg` in `ChildGuard::drop`.
#[cfg(unix)]
pub fn set_new_session(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    unsafe {
        cmd.as_std_mut().pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            // Linux-only: the toolkit dies with the server even on SIGKILL.
            #[cfg(target_os = "linux")]
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn set_new_session(_cmd: &mut Command) {}

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub command: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub truncated_stdout: bool,
    pub truncated_stderr: bool,
}

impl CommandOutput {
    /// Stdout when the command succeeded, otherwise `CommandFailed`.
    pub fn into_stdout(self) -> Result<String, RallyError> {
        if self.status.success() {
            return Ok(self.stdout);
        }
        Err(self.into_failure())
    }

    pub fn into_failure(self) -> RallyError {
        // The toolkit reports most errors on stdout.
        let detail = if self.stderr.trim().is_empty() {
            self.stdout
        } else {
            self.stderr
        };
        RallyError::CommandFailed {
            command: self.command,
            code: self.status.code(),
            stderr: tail(&SecretRedactor::global().redact(detail.trim()), 2_000),
        }
    }
}

/// Last `max_chars` characters of `text`.
#[must_use]
pub fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    text.chars().skip(count - max_chars).collect()
}

/// Run `cmd` to completion with captured output and a wall-clock limit.
///
/// `label` names the command in errors and logs; it must not contain secrets.
pub async fn run_captured(
    mut cmd: Command,
    label: &str,
    timeout: Duration,
) -> Result<CommandOutput, RallyError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    set_new_session(&mut cmd);

    tracing::debug!(command = label, "Running toolkit command");
    let child = cmd.spawn().map_err(|source| RallyError::Spawn {
        command: label.to_string(),
        source,
    })?;
    let mut guard = ChildGuard::new(child);

    let stdout = guard
        .child_mut()
        .stdout
        .take()
        .ok_or_else(|| RallyError::internal(format!("failed to capture stdout of `{label}`")))?;
    let stderr = guard
        .child_mut()
        .stderr
        .take()
        .ok_or_else(|| RallyError::internal(format!("failed to capture stderr of `{label}`")))?;

    let stdout_task = tokio::spawn(read_to_end_limited(stdout, MAX_OUTPUT_BYTES));
    let stderr_task = tokio::spawn(read_to_end_limited(stderr, MAX_OUTPUT_BYTES));

    let status = if let Ok(res) = time::timeout(timeout, guard.child_mut().wait()).await {
        res.map_err(|source| RallyError::Spawn {
            command: label.to_string(),
            source,
        })?
    } else {
        tracing::warn!(command = label, "Toolkit command timed out, killing it");
        drop(guard);
        stdout_task.abort();
        stderr_task.abort();
        return Err(RallyError::Timeout {
            command: label.to_string(),
            elapsed: timeout,
        });
    };
    guard.disarm();

    let (stdout_bytes, truncated_stdout) = match time::timeout(KILL_WAIT, stdout_task).await {
        Ok(Ok(out)) => out,
        _ => (Vec::new(), false),
    };
    let (stderr_bytes, truncated_stderr) = match time::timeout(KILL_WAIT, stderr_task).await {
        Ok(Ok(out)) => out,
        _ => (Vec::new(), false),
    };

    if truncated_stdout || truncated_stderr {
        tracing::warn!(command = label, "Toolkit output truncated");
    }

    Ok(CommandOutput {
        command: label.to_string(),
        status,
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        truncated_stdout,
        truncated_stderr,
    })
}

/// Spawn `cmd` with stdout and stderr appended to `log_path`.
///
/// The returned guard owns the child; dropping it kills the process group.
pub fn spawn_logged(mut cmd: Command, label: &str, log_path: &Path) -> Result<ChildGuard, RallyError> {
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| RallyError::io(log_path, e))?;
    let log_err = log.try_clone().map_err(|e| RallyError::io(log_path, e))?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err));
    set_new_session(&mut cmd);

    tracing::debug!(command = label, log = %log_path.display(), "Spawning toolkit command");
    let child = cmd.spawn().map_err(|source| RallyError::Spawn {
        command: label.to_string(),
        source,
    })?;
    Ok(ChildGuard::new(child))
}

/// Read up to `max_bytes`, then keep draining so the child never blocks on a full pipe.
pub async fn read_to_end_limited<R: tokio::io::AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    max_bytes: usize,
) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = match reader.read(&mut tmp).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let remaining = max_bytes.saturating_sub(buf.len());
        let take = remaining.min(n);
        buf.extend_from_slice(&tmp[..take]);
        if take < n {
            truncated = true;
        }
    }

    (buf, truncated)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_status() {
        let out = run_captured(sh("echo hello; echo oops >&2"), "sh", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "hello");
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn failure_prefers_stderr_detail() {
        let out = run_captured(sh("echo out; echo bad >&2; exit 3"), "sh", Duration::from_secs(10))
            .await
            .unwrap();
        match out.into_stdout().unwrap_err() {
            RallyError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failure_falls_back_to_stdout() {
        let out = run_captured(sh("echo 'Deployment x not found'; exit 1"), "sh", Duration::from_secs(10))
            .await
            .unwrap();
        let err = out.into_stdout().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let started = std::time::Instant::now();
        let err = run_captured(sh("sleep 30"), "sleepy", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RallyError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let cmd = Command::new("/nonexistent/rally-binary");
        let err = run_captured(cmd, "rally", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, RallyError::Spawn { .. }));
    }

    #[tokio::test]
    async fn spawn_logged_appends_output() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("task.log");
        std::fs::write(&log, "existing\n").unwrap();

        let mut guard = spawn_logged(sh("echo one; echo two >&2"), "sh", &log).unwrap();
        let status = guard.wait().await.unwrap();
        assert!(status.success());

        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.starts_with("existing\n"));
        assert!(content.contains("one"));
        assert!(content.contains("two"));
    }

    #[tokio::test]
    async fn dropping_guard_kills_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("bg.log");
        let marker = dir.path().join("marker");
        let script = format!("sleep 1; touch {}", marker.display());

        let guard = spawn_logged(sh(&script), "sh", &log).unwrap();
        drop(guard);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
    }

    #[tokio::test]
    async fn read_limit_truncates_but_drains() {
        let data = vec![b'x'; 100];
        let (buf, truncated) = read_to_end_limited(std::io::Cursor::new(data), 10).await;
        assert_eq!(buf.len(), 10);
        assert!(truncated);
    }
}
