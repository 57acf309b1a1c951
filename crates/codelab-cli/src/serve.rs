//! Serve command implementation.
//!
//! Starts the interactive WebSocket playground server.

use codelab_server::ServerConfig;

/// Start the playground server.
pub async fn execute(host: &str, port: u16) -> anyhow::Result<()> {
    let config = ServerConfig {
        host: host.to_string(),
        port,
    };

    println!();
    println!("Codelab Playground");
    println!("{}", "-".repeat(50));
    println!("  Server:    http://{}:{}", config.host, config.port);
    println!("  WebSocket: ws://{}:{}/ws", config.host, config.port);
    println!("{}", "-".repeat(50));
    println!("Press Ctrl+C to stop");
    println!();

    codelab_server::serve(config).await?;

    Ok(())
}
