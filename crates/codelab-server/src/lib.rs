//! Codelab playground server.
//!
//! Provides a WebSocket server for the in-browser code playground.
//!
//! # Architecture
//!
//! - **Session**: owns the editor buffers and active tab
//! - **Protocol**: defines client/server message types
//! - **Routes**: HTTP and WebSocket handlers plus the worker runner and
//!   the run/stop gate
//! - **Preview**: rendered-document composition for the iframe pane
//!
//! Exactly one execution may be in flight; duplicate run requests are
//! dropped. Stopping is cooperative: the worker notices the flag at its
//! next poll point.

pub mod error;
pub mod preview;
pub mod protocol;
pub mod routes;
pub mod session;

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex as StdMutex};

use codelab_core::ScriptRunner;
use tokio::sync::{Mutex as TokioMutex, RwLock};

pub use error::{ServerError, ServerResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use routes::{create_router, AppState};
pub use session::{SandboxSession, SessionHandle};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Start the codelab server.
pub async fn serve(config: ServerConfig) -> ServerResult<()> {
    let (session, _rx) = SandboxSession::new();

    let state = Arc::new(AppState {
        session: Arc::new(RwLock::new(session)),
        runner: Arc::new(StdMutex::new(ScriptRunner::new())),
        stop_handle: Arc::new(TokioMutex::new(None)),
        running: Arc::new(AtomicBool::new(false)),
        stop_requested: Arc::new(AtomicBool::new(false)),
    });

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|_| ServerError::InvalidAddress(format!("{}:{}", config.host, config.port)))?;

    tracing::info!("Starting codelab server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Handle Ctrl+C for graceful shutdown
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = shutdown_rx.await;
    });

    server.await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3000);
    }
}
