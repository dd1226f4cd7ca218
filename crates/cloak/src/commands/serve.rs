use std::io::{self, BufRead, Write};

use cloak_core::config::Config;
use cloak_core::ipc::{self, Command, Response};
use cloak_core::{log_info, log_warn};

/// Runs the line-delimited JSON bridge until stdin closes.
///
/// Hidden state lives for the whole session; everything is restored when
/// the other side hangs up.
pub fn execute(config: &Config) {
    let mut controller = super::controller(config);
    if !controller.is_initialized() {
        log_warn!("Serving without a payload module; hide requests will affect nothing");
    }
    log_info!("Command bridge started");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let response = match Command::parse(&line) {
            Ok(command) => ipc::handle_command(&command, &mut controller),
            Err(e) => Response::error(format!("invalid command: {e}")),
        };

        let Ok(json) = serde_json::to_string(&response) else {
            continue;
        };
        if writeln!(stdout, "{json}").and_then(|()| stdout.flush()).is_err() {
            break;
        }
    }

    controller.restore_all();
    log_info!("Command bridge stopped");
}
