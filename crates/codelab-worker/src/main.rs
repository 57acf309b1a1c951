//! Codelab execution worker.
//!
//! Reads length-prefixed commands on stdin and writes responses on
//! stdout; stderr carries logs. A `Run` executes on a dedicated thread
//! so the command loop stays free to notice a `Stop` and flag the
//! in-flight execution. The host guarantees a single run in flight;
//! a duplicate `Run` is dropped with a warning rather than queued.
//!
//! Every failure is returned as data over the channel. The worker only
//! exits on Shutdown, stdin EOF, or an unrecoverable stdout fault.

use std::io::{self, BufReader, BufWriter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use codelab_core::ipc::protocol::{read_message, write_message, WorkerCommand, WorkerResponse};
use codelab_core::{CancelToken, Engine, Limits};

/// Stdout writer shared between the command loop and execution threads.
type SharedStdout = Arc<Mutex<BufWriter<io::Stdout>>>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let engine = Arc::new(Engine::new(Limits::default()));
    let stdout: SharedStdout = Arc::new(Mutex::new(BufWriter::new(io::stdout())));
    let active: Arc<Mutex<Option<CancelToken>>> = Arc::new(Mutex::new(None));
    let busy = Arc::new(AtomicBool::new(false));

    let mut stdin = BufReader::new(io::stdin());

    loop {
        let command: WorkerCommand = match read_message(&mut stdin) {
            Ok(command) => command,
            Err(e) => {
                // EOF means the host went away; nothing left to do.
                tracing::debug!("Worker stdin closed: {}", e);
                break;
            }
        };

        match command {
            WorkerCommand::Ping => respond(&stdout, &WorkerResponse::Pong)?,

            WorkerCommand::Run { source } => {
                if busy.swap(true, Ordering::SeqCst) {
                    tracing::warn!("Run received while an execution is in flight; dropping");
                    continue;
                }

                // Register the token before the thread starts so a Stop
                // read right after this Run can always reach it.
                let token = CancelToken::new();
                set_active(&active, Some(token.clone()));

                let engine = engine.clone();
                let stdout = stdout.clone();
                let active = active.clone();
                let busy = busy.clone();
                thread::spawn(move || {
                    let response = match engine.execute(&source, &token) {
                        Ok(output) => WorkerResponse::Completed { output },
                        Err(e) => WorkerResponse::Failed {
                            kind: e.kind,
                            message: e.message,
                        },
                    };

                    set_active(&active, None);
                    busy.store(false, Ordering::SeqCst);

                    if let Err(e) = respond(&stdout, &response) {
                        tracing::error!("Failed to write execution response: {}", e);
                    }
                });
            }

            WorkerCommand::Stop => {
                let token = active.lock().ok().and_then(|guard| (*guard).clone());
                match token {
                    Some(token) => token.set(),
                    None => tracing::debug!("Stop received with no execution in flight"),
                }
            }

            WorkerCommand::Shutdown => {
                respond(&stdout, &WorkerResponse::ShuttingDown)?;
                break;
            }
        }
    }

    Ok(())
}

/// Write one response through the shared stdout writer.
fn respond(stdout: &SharedStdout, response: &WorkerResponse) -> anyhow::Result<()> {
    let mut guard = stdout
        .lock()
        .map_err(|_| anyhow::anyhow!("stdout writer poisoned"))?;
    write_message(&mut *guard, response)?;
    Ok(())
}

/// Swap the active run's cancel token.
fn set_active(active: &Arc<Mutex<Option<CancelToken>>>, token: Option<CancelToken>) {
    if let Ok(mut guard) = active.lock() {
        *guard = token;
    }
}
