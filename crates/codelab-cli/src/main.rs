//! Codelab CLI - sandboxed code playground.

mod exec;
mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "codelab")]
#[command(about = "Sandboxed code playground with limits and cooperative stop")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive playground server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Host address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Run a script file once, headlessly
    Exec {
        /// Path to the script file
        script: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port, host } => {
            serve::execute(&host, port).await?;
        }

        Commands::Exec { script } => {
            exec::execute(&script)?;
        }
    }

    Ok(())
}
