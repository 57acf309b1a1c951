//! Worker process management for sandboxed script execution.
//!
//! Provides `WorkerHandle` for spawning and talking to the isolated
//! worker process, `StopHandle` for requesting a cooperative stop from
//! another thread, and `ScriptRunner` for the one-worker, one-run-at-a-
//! time session lifecycle.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::exec::{ExecError, ExecOutcome};

use super::protocol::{read_message, write_message, WorkerCommand, WorkerResponse};

/// Shared writer for the worker's stdin.
///
/// Shared so a `StopHandle` can inject a Stop command while the owner
/// of the handle is blocked waiting for the run's response.
type SharedStdin = Arc<Mutex<BufWriter<ChildStdin>>>;

/// Handle to a worker process.
pub struct WorkerHandle {
    /// The child process.
    child: Child,
    /// Buffered stdin writer, shared with stop handles.
    stdin: SharedStdin,
    /// Buffered stdout reader.
    stdout: BufReader<ChildStdout>,
    /// Whether the worker has been killed.
    killed: bool,
}

impl WorkerHandle {
    /// Spawn a new worker process.
    ///
    /// Looks for the `codelab-worker` binary in the following order:
    /// 1. `CODELAB_WORKER_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    /// 4. `target/debug` or `target/release` (development builds)
    pub fn spawn() -> Result<Self> {
        let worker_path = Self::find_worker_binary()?;

        let mut child = Command::new(&worker_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Worker logs go to our stderr
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "failed to spawn worker process '{}': {}",
                    worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("failed to get worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: Arc::new(Mutex::new(BufWriter::new(stdin))),
            stdout: BufReader::new(stdout),
            killed: false,
        };

        // Verify the worker is alive before handing it out.
        handle.send_command(&WorkerCommand::Ping)?;
        match handle.recv_response()? {
            WorkerResponse::Pong => Ok(handle),
            other => Err(Error::Ipc(format!(
                "unexpected response from worker: {:?}",
                other
            ))),
        }
    }

    /// Find the codelab-worker binary path.
    fn find_worker_binary() -> Result<PathBuf> {
        let worker_name = if cfg!(windows) {
            "codelab-worker.exe"
        } else {
            "codelab-worker"
        };

        // 1. Check environment variable
        if let Ok(path) = std::env::var("CODELAB_WORKER_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        // 2. Look next to current executable
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let worker_path = exe_dir.join(worker_name);
                if worker_path.exists() {
                    return Ok(worker_path);
                }
            }
        }

        // 3. Try system PATH
        if let Ok(path) = which::which(worker_name) {
            return Ok(path);
        }

        // 4. For development: try target/debug or target/release
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            for profile in &["debug", "release"] {
                let path = PathBuf::from(&manifest_dir)
                    .join("..")
                    .join("..")
                    .join("target")
                    .join(profile)
                    .join(worker_name);
                if path.exists() {
                    return Ok(path.canonicalize().unwrap_or(path));
                }
            }
        }

        Err(Error::Ipc(
            "could not find codelab-worker binary. Set CODELAB_WORKER_PATH or ensure it's in PATH."
                .to_string(),
        ))
    }

    /// Send a command to the worker.
    pub fn send_command(&mut self, cmd: &WorkerCommand) -> Result<()> {
        if self.killed {
            return Err(Error::Ipc("worker has been killed".to_string()));
        }
        let mut stdin = self
            .stdin
            .lock()
            .map_err(|_| Error::Ipc("worker stdin writer poisoned".to_string()))?;
        write_message(&mut *stdin, cmd)
    }

    /// Receive a response from the worker.
    pub fn recv_response(&mut self) -> Result<WorkerResponse> {
        if self.killed {
            return Err(Error::Ipc("worker has been killed".to_string()));
        }
        read_message(&mut self.stdout)
    }

    /// Execute source text in the worker, blocking until it responds.
    ///
    /// The outer error is a transport fault; the inner result is the
    /// run's own outcome.
    pub fn run(&mut self, source: &str) -> Result<ExecOutcome> {
        self.send_command(&WorkerCommand::Run {
            source: source.to_string(),
        })?;

        match self.recv_response()? {
            WorkerResponse::Completed { output } => Ok(Ok(output)),
            WorkerResponse::Failed { kind, message } => Ok(Err(ExecError { kind, message })),
            other => Err(Error::Ipc(format!(
                "unexpected response while running: {:?}",
                other
            ))),
        }
    }

    /// A clonable handle that can request a cooperative stop of the
    /// in-flight run from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stdin: self.stdin.clone(),
        }
    }

    /// Kill the worker process immediately.
    ///
    /// Last-resort teardown for a worker that stopped answering; the
    /// normal abort path is the cooperative `StopHandle`.
    pub fn kill(&mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        self.killed = true;

        // Try graceful shutdown first so the worker can flush.
        let _ = self.send_shutdown();
        std::thread::sleep(Duration::from_millis(10));

        if let Err(e) = self.child.kill() {
            if !e.to_string().contains("No such process") {
                tracing::warn!("Failed to kill worker: {}", e);
            }
        }

        // Wait to reap zombie
        let _ = self.child.wait();

        Ok(())
    }

    fn send_shutdown(&mut self) -> Result<()> {
        let mut stdin = self
            .stdin
            .lock()
            .map_err(|_| Error::Ipc("worker stdin writer poisoned".to_string()))?;
        write_message(&mut *stdin, &WorkerCommand::Shutdown)
    }

    /// Check if the worker process is still running.
    pub fn is_alive(&mut self) -> bool {
        if self.killed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Get the process ID of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Graceful shutdown - ask the worker to exit cleanly.
    pub fn shutdown(mut self) -> Result<()> {
        if self.killed {
            return Ok(());
        }

        let _ = self.send_shutdown();

        match self.child.wait() {
            Ok(status) => {
                if status.success() {
                    Ok(())
                } else {
                    Err(Error::Ipc(format!("worker exited with status: {}", status)))
                }
            }
            Err(e) => Err(Error::Ipc(format!("failed to wait for worker: {}", e))),
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        let _ = self.kill();
    }
}

/// Thread-safe handle for stopping the in-flight run.
///
/// Stop is advisory: the worker's line hook notices the flag at its
/// next poll point. This never preempts native work mid-step.
#[derive(Clone)]
pub struct StopHandle {
    stdin: SharedStdin,
}

impl StopHandle {
    /// Forward a stop request to the worker.
    ///
    /// Failures are logged and swallowed: if the pipe is gone the run
    /// is already over one way or another.
    pub fn stop(&self) {
        let mut stdin = match self.stdin.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if let Err(e) = write_message(&mut *stdin, &WorkerCommand::Stop) {
            tracing::warn!("Failed to forward stop to worker: {}", e);
        }
    }
}

/// Owns at most one worker process and dispatches one run at a time.
///
/// The worker is spawned lazily on first use and replaced automatically
/// after a transport fault, so a crashed worker costs one failed run
/// rather than a stuck session.
pub struct ScriptRunner {
    worker: Option<WorkerHandle>,
}

impl ScriptRunner {
    /// Create a runner with no worker yet.
    pub fn new() -> Self {
        Self { worker: None }
    }

    /// Get the live worker, spawning or respawning as needed.
    fn ensure_worker(&mut self) -> Result<&mut WorkerHandle> {
        let needs_spawn = match self.worker.as_mut() {
            Some(worker) => !worker.is_alive(),
            None => true,
        };

        if needs_spawn {
            if let Some(mut old) = self.worker.take() {
                let _ = old.kill();
            }
            self.worker = Some(WorkerHandle::spawn()?);
        }

        match self.worker.as_mut() {
            Some(worker) => Ok(worker),
            None => Err(Error::Ipc("worker unavailable after spawn".to_string())),
        }
    }

    /// A stop handle for the current (or about-to-spawn) worker.
    pub fn stop_handle(&mut self) -> Result<StopHandle> {
        Ok(self.ensure_worker()?.stop_handle())
    }

    /// Execute source text, blocking until the worker responds.
    ///
    /// On a transport fault the worker is discarded so the next run
    /// starts from a fresh one.
    pub fn run(&mut self, source: &str) -> Result<ExecOutcome> {
        let outcome = self.ensure_worker()?.run(source);

        if outcome.is_err() {
            if let Some(mut worker) = self.worker.take() {
                let _ = worker.kill();
            }
        }

        outcome
    }

    /// Tear down the current worker, if any.
    pub fn reset(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.kill();
        }
    }
}

impl Default for ScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScriptRunner {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecErrorKind;

    // These tests require the codelab-worker binary to be built.
    // Run `cargo build -p codelab-worker` first.

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_worker_spawn_and_ping() {
        let worker = WorkerHandle::spawn().unwrap();
        assert!(worker.pid() > 0);
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_worker_runs_script() {
        let mut worker = WorkerHandle::spawn().unwrap();
        let outcome = worker.run("print(1)\nprint(2)").unwrap();
        assert_eq!(outcome.unwrap(), "1\n2\n");
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_worker_reports_runtime_fault() {
        let mut worker = WorkerHandle::spawn().unwrap();
        let outcome = worker.run("error('boom')").unwrap();
        let err = outcome.unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Runtime);
        assert!(err.message.contains("boom"));
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_runner_survives_worker_reset() {
        let mut runner = ScriptRunner::new();
        assert_eq!(runner.run("print('a')").unwrap().unwrap(), "a\n");
        runner.reset();
        assert_eq!(runner.run("print('b')").unwrap().unwrap(), "b\n");
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_unbounded_loop_hits_line_limit() {
        let mut runner = ScriptRunner::new();
        let source = "local x = 0\nwhile true do\n  x = x + 1\nend";
        let err = runner.run(source).unwrap().unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::LineLimit);
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_stop_mid_run_reports_stopped() {
        let mut runner = ScriptRunner::new();
        let stop = runner.stop_handle().unwrap();

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            stop.stop();
        });

        // A tight loop would hit the line ceiling in microseconds. Each
        // string.rep here burns real time on a single line, so the run
        // outlives the stop request with the line count barely moving.
        let source = "local s = ''\nwhile true do\n  s = string.rep('a', 10000000)\nend";
        let started = std::time::Instant::now();
        let err = runner.run(source).unwrap().unwrap_err();
        stopper.join().unwrap();

        assert_eq!(err.kind, ExecErrorKind::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[ignore = "Requires codelab-worker binary"]
    fn test_stop_with_no_run_in_flight_is_harmless() {
        let mut runner = ScriptRunner::new();
        let stop = runner.stop_handle().unwrap();
        stop.stop();
        // The flag does not survive into the next run: each Run gets a
        // fresh token.
        assert_eq!(runner.run("print('ok')").unwrap().unwrap(), "ok\n");
    }
}
