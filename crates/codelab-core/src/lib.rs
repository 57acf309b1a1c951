//! Core execution engine and worker IPC for codelab.
//!
//! The engine runs user-submitted scripts in a sandboxed Lua state under
//! enforced resource limits: an executed-line ceiling, a wall-clock
//! ceiling, and a cooperative stop flag polled at a fixed cadence. All
//! `print` output is captured into an in-memory buffer and returned as a
//! single string when the run finishes.
//!
//! The IPC layer spawns the `codelab-worker` binary and speaks a
//! length-prefixed message protocol over its stdin/stdout, so a
//! misbehaving script can never take the host process down with it.

pub mod error;
pub mod exec;
pub mod ipc;
pub mod limits;

pub use error::{Error, Result};
pub use exec::{CancelToken, Engine, ExecError, ExecErrorKind, ExecOutcome};
pub use ipc::{ScriptRunner, StopHandle, WorkerHandle};
pub use limits::Limits;
