//! IPC between the session host and the execution worker.
//!
//! The worker is a separate process; host and worker exchange
//! length-prefixed messages over its stdin/stdout.

pub mod protocol;
pub mod worker;

pub use protocol::{read_message, write_message, WorkerCommand, WorkerResponse};
pub use worker::{ScriptRunner, StopHandle, WorkerHandle};
