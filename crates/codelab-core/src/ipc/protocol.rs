//! IPC protocol messages for codelab worker processes.
//!
//! Uses length-prefixed bincode messages over stdin/stdout.
//! Format: 4-byte length (u32 LE) + bincode-encoded message.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::exec::ExecErrorKind;

/// Command sent from the session host to the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerCommand {
    /// Execute the given source text under the worker's limits.
    Run {
        /// The script to execute.
        source: String,
    },

    /// Advisory stop: flag the in-flight execution to self-terminate
    /// at its next poll point. A no-op when nothing is running.
    Stop,

    /// Liveness check.
    Ping,

    /// Shut down the worker gracefully.
    Shutdown,
}

/// Response sent from the worker to the session host.
///
/// Every `Run` produces exactly one `Completed` or `Failed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerResponse {
    /// Execution finished; all captured output.
    Completed {
        /// Captured `print` output.
        output: String,
    },

    /// Execution failed: limit breach, user stop, or runtime fault.
    Failed {
        /// Failure category.
        kind: ExecErrorKind,
        /// Human-readable description.
        message: String,
    },

    /// Response to Ping.
    Pong,

    /// Acknowledgement of a Shutdown request.
    ShuttingDown,
}

/// Upper bound on a single message body (16MB).
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Write a message to a writer using length-prefixed bincode encoding.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = bincode::serialize(message)
        .map_err(|e| Error::Serialization(format!("failed to encode IPC message: {}", e)))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed bincode encoding.
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_BYTES {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("failed to read IPC message body: {}", e)))?;

    bincode::deserialize(&bytes)
        .map_err(|e| Error::Serialization(format!("failed to decode IPC message: {}", e)))
}
