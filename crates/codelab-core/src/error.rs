//! Error types for codelab-core.

use thiserror::Error;

/// Result type for codelab-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level errors.
///
/// Failures of the script itself are not errors at this level: they come
/// back as data (see [`crate::exec::ExecError`]). This enum covers the
/// cases where the channel to the worker breaks down.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IPC communication error with the worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}
