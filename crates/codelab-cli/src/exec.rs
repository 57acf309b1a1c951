//! Exec command implementation.
//!
//! Runs a script file in-process with the default limits, printing the
//! captured output. Errors print as `Error: <message>`, the same text a
//! playground client would show.

use std::fs;
use std::path::Path;

use codelab_core::{CancelToken, Engine, Limits};

/// Run a script file once and print its output.
pub fn execute(script_path: &str) -> anyhow::Result<()> {
    let path = Path::new(script_path);
    if !path.exists() {
        anyhow::bail!("Script not found: {}", script_path);
    }

    let source = fs::read_to_string(path)?;

    let engine = Engine::new(Limits::default());
    let cancel = CancelToken::new();

    match engine.execute(&source, &cancel) {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: {}", err.message);
            std::process::exit(1);
        }
    }
}
