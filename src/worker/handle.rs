//! Transcode worker handle
//!
//! Owns one external transcoder process. A supervisor task owns the child
//! itself and is the only place that waits on or kills it, so `terminate`
//! can be called from any number of paths without racing the exit status.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::registry::{OutputMode, SessionKey};

use super::config::WorkerConfig;
use super::diagnostic::{self, DiagnosticScanner};
use super::input::InputSink;
use super::output::OutputSource;

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,
    /// True when the exit was caused by [`WorkerHandle::terminate`]
    pub terminated: bool,
}

impl WorkerExit {
    fn from_status(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            terminated: false,
        }
    }

    fn terminated() -> Self {
        Self {
            code: None,
            terminated: true,
        }
    }

    /// True for a clean zero exit
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.terminated, self.code) {
            (true, _) => f.write_str("terminated"),
            (false, Some(code)) => write!(f, "exit code {code}"),
            (false, None) => f.write_str("killed by signal"),
        }
    }
}

/// Byte-stream endpoints of a freshly started worker
///
/// Split from [`WorkerHandle`] so the handle can be shared between tasks
/// while the endpoints move into the tasks that drive them.
pub struct WorkerIo {
    /// Worker's stdin
    pub input: InputSink,
    /// Worker's stdout, live mode only
    pub output: Option<OutputSource>,
}

/// Handle to one running transcoder
pub struct WorkerHandle {
    key: SessionKey,
    mode: OutputMode,
    pid: Option<u32>,
    output_dir: Option<PathBuf>,
    ready: Arc<watch::Sender<bool>>,
    exit: watch::Receiver<Option<WorkerExit>>,
    kill: CancellationToken,
}

impl WorkerHandle {
    /// Launch the worker for `key` in `mode`
    ///
    /// In segmented mode the per-session output directory is emptied (or
    /// created) first, so files left by an earlier session on the same key
    /// are never served as this session's output.
    pub async fn start(
        config: &WorkerConfig,
        mode: OutputMode,
        key: &SessionKey,
    ) -> Result<(Self, WorkerIo), WorkerError> {
        let output_dir = match mode {
            OutputMode::LiveStream => None,
            OutputMode::SegmentedFile => {
                let dir = config.output_dir(key);
                reset_output_dir(&dir)
                    .await
                    .map_err(|source| WorkerError::OutputDir {
                        path: dir.display().to_string(),
                        source,
                    })?;
                Some(dir)
            }
        };

        let args = config.args_for(mode, output_dir.as_deref());

        let mut cmd = Command::new(&config.program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if mode.is_live() {
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null());
        }

        let mut child = cmd.spawn().map_err(|source| WorkerError::Spawn {
            program: config.program.display().to_string(),
            source,
        })?;
        let pid = child.id();

        let (ready_tx, _) = watch::channel(false);
        let ready = Arc::new(ready_tx);

        let Some(stdin) = child.stdin.take() else {
            return Err(WorkerError::Spawn {
                program: config.program.display().to_string(),
                source: std::io::Error::other("worker stdin not captured"),
            });
        };
        let input = InputSink::spawn(stdin, config.input_high_water, key.clone());
        let output = child
            .stdout
            .take()
            .map(|stdout| OutputSource::new(stdout, config.read_chunk_size));

        if let Some(stderr) = child.stderr.take() {
            let scanner = (!mode.is_live()).then(|| {
                DiagnosticScanner::new(
                    &config.readiness_marker,
                    &config.manifest_name,
                    Arc::clone(&ready),
                )
            });
            tokio::spawn(diagnostic::watch_stderr(stderr, scanner, key.clone()));
        }

        let (exit_tx, exit) = watch::channel(None);
        let kill = CancellationToken::new();
        tokio::spawn(supervise(child, kill.clone(), exit_tx, key.clone()));

        tracing::info!(
            key = %key,
            mode = %mode,
            pid = ?pid,
            program = %config.program.display(),
            "Worker started"
        );

        let handle = Self {
            key: key.clone(),
            mode,
            pid,
            output_dir,
            ready,
            exit,
            kill,
        };

        Ok((handle, WorkerIo { input, output }))
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Session output directory (segmented mode only)
    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    /// Kill the worker. Idempotent.
    pub fn terminate(&self) {
        if !self.kill.is_cancelled() {
            tracing::debug!(key = %self.key, pid = ?self.pid, "Terminating worker");
            self.kill.cancel();
        }
    }

    /// True once the process has been reaped
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some()
    }

    /// Wait for the process to end
    pub async fn wait(&self) -> WorkerExit {
        let mut exit = self.exit.clone();
        let result = exit.wait_for(Option::is_some).await.map(|e| *e);

        match result {
            Ok(Some(status)) => status,
            // Supervisor gone without reporting; the child was dropped with kill_on_drop
            _ => WorkerExit::terminated(),
        }
    }

    /// Flag the worker's output as available
    pub(crate) fn mark_ready(&self) {
        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait up to `timeout` for the worker to announce its output
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let mut ready = self.ready.subscribe();
        let seen = matches!(
            tokio::time::timeout(timeout, ready.wait_for(|r| *r)).await,
            Ok(Ok(_))
        );
        seen
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("key", &self.key)
            .field("mode", &self.mode)
            .field("pid", &self.pid)
            .field("exit", &*self.exit.borrow())
            .finish()
    }
}

async fn reset_output_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

async fn supervise(
    mut child: Child,
    kill: CancellationToken,
    exit_tx: watch::Sender<Option<WorkerExit>>,
    key: SessionKey,
) {
    let exit = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => WorkerExit::from_status(status),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to wait on worker");
                WorkerExit::default()
            }
        },
        _ = kill.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!(key = %key, error = %e, "Failed to kill worker");
            }
            WorkerExit::terminated()
        }
    };

    tracing::info!(key = %key, exit = %exit, "Worker exited");
    exit_tx.send_replace(Some(exit));
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::ingest::ByteSink;

    fn cat_config() -> WorkerConfig {
        WorkerConfig::with_program("cat", Vec::<String>::new(), Vec::<String>::new())
    }

    fn key(name: &str) -> SessionKey {
        SessionKey::parse(name).unwrap()
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = WorkerConfig::with_program(
            "/nonexistent/transcoder_xyz",
            Vec::<String>::new(),
            Vec::<String>::new(),
        );
        let result = WorkerHandle::start(&config, OutputMode::LiveStream, &key("a")).await;
        assert!(matches!(result, Err(WorkerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn test_live_worker_round_trip() {
        let (worker, io) = WorkerHandle::start(&cat_config(), OutputMode::LiveStream, &key("rt"))
            .await
            .unwrap();

        let mut input = io.input;
        let mut output = io.output.unwrap();

        input.write(Bytes::from_static(b"payload")).unwrap();
        drop(input);

        let mut collected = Vec::new();
        while let Some(chunk) = output.next_chunk().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"payload");

        let exit = worker.wait().await;
        assert!(exit.success());
        assert!(!exit.terminated);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (worker, _io) = WorkerHandle::start(&cat_config(), OutputMode::LiveStream, &key("kill"))
            .await
            .unwrap();

        worker.terminate();
        worker.terminate();
        let exit = tokio::time::timeout(Duration::from_secs(5), worker.wait())
            .await
            .expect("worker should die");
        assert!(exit.terminated);
        assert!(worker.has_exited());

        worker.terminate();
        assert_eq!(worker.wait().await, exit);
    }

    #[tokio::test]
    async fn test_segmented_creates_dir_and_detects_ready() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig::with_program(
            "sh",
            Vec::<String>::new(),
            [
                "-c",
                "echo \"Opening '$0/index.m3u8.tmp' for writing\" >&2; cat > \"$0/index.m3u8\"",
                "{output_dir}",
            ],
        )
        .base_path(dir.path());

        let (worker, io) = WorkerHandle::start(&config, OutputMode::SegmentedFile, &key("seg"))
            .await
            .unwrap();
        assert_eq!(worker.output_dir(), Some(dir.path().join("seg").as_path()));
        assert!(io.output.is_none());

        assert!(worker.wait_ready(Duration::from_secs(5)).await);

        let mut input = io.input;
        input.write(Bytes::from_static(b"#EXTM3U\n")).unwrap();
        drop(input);
        worker.wait().await;

        let manifest = std::fs::read(dir.path().join("seg/index.m3u8")).unwrap();
        assert_eq!(manifest, b"#EXTM3U\n");
    }

    #[tokio::test]
    async fn test_segmented_start_clears_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let session_dir = dir.path().join("cam");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(session_dir.join("index.m3u8"), "#EXTM3U\n#OLD-SESSION\n").unwrap();
        std::fs::write(session_dir.join("segment_00000.ts"), [0u8; 16]).unwrap();

        let config = WorkerConfig::with_program(
            "sh",
            Vec::<String>::new(),
            ["-c", "cat > /dev/null", "{output_dir}"],
        )
        .base_path(dir.path());

        let (worker, io) = WorkerHandle::start(&config, OutputMode::SegmentedFile, &key("cam"))
            .await
            .unwrap();

        assert!(session_dir.is_dir());
        assert!(!session_dir.join("index.m3u8").exists());
        assert!(!session_dir.join("segment_00000.ts").exists());
        assert!(!worker.is_ready());

        drop(io);
        worker.wait().await;
    }

    #[tokio::test]
    async fn test_live_ready_is_explicit() {
        let (worker, _io) = WorkerHandle::start(&cat_config(), OutputMode::LiveStream, &key("ready"))
            .await
            .unwrap();
        assert!(!worker.is_ready());
        worker.mark_ready();
        worker.mark_ready();
        assert!(worker.wait_ready(Duration::from_millis(10)).await);
        worker.terminate();
    }
}
