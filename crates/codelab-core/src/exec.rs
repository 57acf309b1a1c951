//! Sandboxed script execution with cooperative limit enforcement.
//!
//! Each request runs in a fresh Lua state with a restricted stdlib and
//! `print` redirected into an in-memory buffer. A per-line debug hook
//! enforces the limits: it counts executed lines, checks elapsed
//! wall-clock time, and periodically polls the advisory stop flag.
//! Arbitrary code cannot be preempted, so cancellation latency is
//! bounded by the poll interval plus whatever single instrumented step
//! is mid-flight.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mlua::{HookTriggers, Lua, LuaOptions, StdLib, Value, Variadic};
use serde::{Deserialize, Serialize};

use crate::limits::Limits;

/// Advisory cancellation flag.
///
/// Setting it does not interrupt the running script; the engine's line
/// hook notices it at the next poll point and fails the run with
/// [`ExecErrorKind::Stopped`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a new, unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check whether cancellation has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecErrorKind {
    /// The executed-line counter passed the ceiling.
    LineLimit,
    /// Wall-clock time passed the ceiling.
    TimeLimit,
    /// The advisory stop flag was set.
    Stopped,
    /// Any other failure: runtime fault, syntax error, bad value.
    Runtime,
}

/// A failed run, as data.
///
/// The kind lets callers branch on the failure (a user stop is not a
/// fault) instead of string-matching the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ExecError {
    /// Failure category.
    pub kind: ExecErrorKind,
    /// Human-readable description, shown to the user verbatim.
    pub message: String,
}

impl ExecError {
    /// A runtime-fault error with the given message.
    pub fn runtime(message: impl Into<String>) -> Self {
        Self {
            kind: ExecErrorKind::Runtime,
            message: message.into(),
        }
    }
}

/// Outcome of one execution: captured output, or the failure.
pub type ExecOutcome = std::result::Result<String, ExecError>;

/// Limit breach raised from inside the line hook.
///
/// Travels through the interpreter as an external error so it can be
/// told apart from the script's own faults afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LimitBreach {
    Lines(u64),
    Time(Duration),
    Stopped,
}

impl LimitBreach {
    fn kind(self) -> ExecErrorKind {
        match self {
            LimitBreach::Lines(_) => ExecErrorKind::LineLimit,
            LimitBreach::Time(_) => ExecErrorKind::TimeLimit,
            LimitBreach::Stopped => ExecErrorKind::Stopped,
        }
    }
}

impl fmt::Display for LimitBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitBreach::Lines(limit) => write!(f, "execution exceeded {} lines", limit),
            LimitBreach::Time(limit) => write!(f, "execution time exceeded {:?}", limit),
            LimitBreach::Stopped => write!(f, "execution stopped by user"),
        }
    }
}

impl std::error::Error for LimitBreach {}

/// Sandboxed script execution engine.
///
/// Owns only the limits; every [`execute`](Engine::execute) call builds
/// a fresh interpreter state, so nothing leaks between runs and cleanup
/// is guaranteed on every exit path.
#[derive(Debug, Clone)]
pub struct Engine {
    limits: Limits,
}

impl Engine {
    /// Create an engine with the given limits.
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// The limits this engine enforces.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Execute `source`, returning all captured `print` output.
    ///
    /// Exactly one of output or error is produced per run; a failed run
    /// discards whatever partial output it captured.
    pub fn execute(&self, source: &str, cancel: &CancelToken) -> ExecOutcome {
        // Restricted stdlib: no os/io/package/debug. The base functions
        // (print, pairs, assert, ...) are always available.
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::STRING | StdLib::TABLE,
            LuaOptions::default(),
        )
        .map_err(|e| ExecError::runtime(e.to_string()))?;

        let buffer = Arc::new(Mutex::new(String::new()));
        install_print(&lua, buffer.clone()).map_err(|e| ExecError::runtime(e.to_string()))?;

        let limits = self.limits;
        let token = cancel.clone();
        let started = Instant::now();
        // The hook closure is Fn, so the counters live in Cells.
        let executed = Cell::new(0u64);
        let last_poll = Cell::new(started);

        lua.set_hook(HookTriggers::EVERY_LINE, move |_lua, _debug| {
            let lines = executed.get() + 1;
            executed.set(lines);
            if lines > limits.max_lines {
                return Err(mlua::Error::external(LimitBreach::Lines(limits.max_lines)));
            }
            if started.elapsed() > limits.max_time {
                return Err(mlua::Error::external(LimitBreach::Time(limits.max_time)));
            }
            if last_poll.get().elapsed() >= limits.poll_interval {
                last_poll.set(Instant::now());
                if token.is_set() {
                    return Err(mlua::Error::external(LimitBreach::Stopped));
                }
            }
            Ok(())
        });

        let result = lua.load(source).set_name("playground").exec();
        lua.remove_hook();

        match result {
            Ok(()) => drain_output(&buffer),
            Err(err) => Err(classify(err)),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Limits::default())
    }
}

/// Replace the global `print` with one that appends to `sink`.
///
/// Arguments are tab-separated and each call ends with a newline,
/// matching stock `print`.
fn install_print(lua: &Lua, sink: Arc<Mutex<String>>) -> mlua::Result<()> {
    let print = lua.create_function(move |_, values: Variadic<Value>| {
        let mut line = String::new();
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            line.push_str(&value.to_string()?);
        }
        line.push('\n');
        if let Ok(mut buf) = sink.lock() {
            buf.push_str(&line);
        }
        Ok(())
    })?;
    lua.globals().set("print", print)
}

/// Take the captured output out of the buffer.
///
/// A poisoned buffer is reported as a failure rather than success with
/// silently vanished output.
fn drain_output(buffer: &Mutex<String>) -> ExecOutcome {
    match buffer.lock() {
        Ok(mut buf) => Ok(std::mem::take(&mut *buf)),
        Err(_) => Err(ExecError::runtime("output buffer poisoned")),
    }
}

/// Map an interpreter error to the tagged execution error.
fn classify(err: mlua::Error) -> ExecError {
    match find_breach(&err) {
        Some(breach) => ExecError {
            kind: breach.kind(),
            message: breach.to_string(),
        },
        None => ExecError::runtime(err.to_string()),
    }
}

/// Walk the error chain looking for a hook-raised limit breach.
fn find_breach(err: &mlua::Error) -> Option<LimitBreach> {
    match err {
        mlua::Error::CallbackError { cause, .. } => find_breach(cause),
        mlua::Error::WithContext { cause, .. } => find_breach(cause),
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<LimitBreach>().copied(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(engine: &Engine, source: &str) -> ExecOutcome {
        engine.execute(source, &CancelToken::new())
    }

    #[test]
    fn test_print_output_captured() {
        let engine = Engine::default();
        let output = run(&engine, "print(1)\nprint(2)").unwrap();
        assert_eq!(output, "1\n2\n");
    }

    #[test]
    fn test_print_arguments_tab_separated() {
        let engine = Engine::default();
        let output = run(&engine, "print(1, 2, 'three')").unwrap();
        assert_eq!(output, "1\t2\tthree\n");
    }

    #[test]
    fn test_empty_source_produces_empty_output() {
        let engine = Engine::default();
        assert_eq!(run(&engine, "").unwrap(), "");
    }

    #[test]
    fn test_line_limit_stops_unbounded_loop() {
        let engine = Engine::new(Limits {
            max_lines: 50,
            ..Limits::default()
        });
        let err = run(&engine, "local x = 0\nwhile true do\n  x = x + 1\nend").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::LineLimit);
        assert!(err.message.contains("50 lines"), "message: {}", err.message);
    }

    #[test]
    fn test_time_limit_stops_busy_loop() {
        let engine = Engine::new(Limits {
            max_lines: u64::MAX,
            max_time: Duration::from_millis(50),
            // Keep the stop poll out of the way.
            poll_interval: Duration::from_secs(3600),
        });
        let err = run(&engine, "local x = 0\nwhile true do\n  x = x + 1\nend").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::TimeLimit);
    }

    #[test]
    fn test_stop_flag_cancels_run() {
        let engine = Engine::new(Limits {
            max_lines: u64::MAX,
            max_time: Duration::from_secs(10),
            poll_interval: Duration::ZERO,
        });
        let token = CancelToken::new();
        token.set();
        let err = engine
            .execute("local x = 0\nwhile true do\n  x = x + 1\nend", &token)
            .unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Stopped);
        assert_eq!(err.message, "execution stopped by user");
    }

    #[test]
    fn test_runtime_fault_is_tagged() {
        let engine = Engine::default();
        let err = run(&engine, "error('boom')").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Runtime);
        assert!(err.message.contains("boom"), "message: {}", err.message);
    }

    #[test]
    fn test_syntax_error_is_runtime_fault() {
        let engine = Engine::default();
        let err = run(&engine, "print(").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Runtime);
    }

    #[test]
    fn test_failed_run_discards_partial_output() {
        let engine = Engine::default();
        let err = run(&engine, "print('partial')\nerror('boom')").unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Runtime);
    }

    #[test]
    fn test_os_and_io_are_unavailable() {
        let engine = Engine::default();
        let output = run(&engine, "print(os == nil, io == nil)").unwrap();
        assert_eq!(output, "true\ttrue\n");
    }

    #[test]
    fn test_engine_state_does_not_leak_between_runs() {
        let engine = Engine::default();
        run(&engine, "leaked = 42").unwrap();
        let output = run(&engine, "print(leaked == nil)").unwrap();
        assert_eq!(output, "true\n");
    }

    #[test]
    fn test_poisoned_output_buffer_is_a_failure() {
        let buffer = Arc::new(Mutex::new(String::from("partial")));
        let poisoner = buffer.clone();
        std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the buffer");
        })
        .join()
        .unwrap_err();

        let err = drain_output(&buffer).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::Runtime);
        assert!(err.message.contains("poisoned"));
    }

    #[test]
    fn test_run_within_limits_succeeds() {
        let engine = Engine::default();
        let output = run(
            &engine,
            "local total = 0\nfor i = 1, 10 do\n  total = total + i\nend\nprint(total)",
        )
        .unwrap();
        assert_eq!(output, "55\n");
    }

    #[test]
    fn test_unset_token_does_not_cancel() {
        let engine = Engine::new(Limits {
            poll_interval: Duration::ZERO,
            ..Limits::default()
        });
        let output = run(&engine, "print('ok')").unwrap();
        assert_eq!(output, "ok\n");
    }
}
