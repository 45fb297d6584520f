//! `smartcar drive` – command-driven client of the control service.
//!
//! Input is one JSON command per line, e.g.
//! `{"cmd":"start_action","type":"forward","duration":1}`.  Output is one
//! JSON reply per line.  On a terminal the reply is prefixed with a coloured
//! `ok`/`err` tag.

use std::io::{BufRead, IsTerminal};

use colored::Colorize;
use smartcar_runtime::{CarLoop, CommandReply, CommandSender, Reply, parse_command};
use smartcar_service::SocketLocator;
use smartcar_types::{CarError, Command};
use tracing::{debug, info, warn};

use crate::config::Config;

pub fn run(cfg: &Config) -> Result<(), CarError> {
    let runtime = crate::build_runtime()?;
    let (car, sender) = CarLoop::new(SocketLocator::new(&cfg.socket_path), cfg.loop_config());

    let ctrlc_sender = sender.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("{}", "⚠  Ctrl-C received – stopping the car …".yellow().bold());
        if let Err(e) = ctrlc_sender.submit_blocking(Command::Shutdown) {
            eprintln!("{}: {}", "Could not queue shutdown".red(), e);
        }
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the car with {{\"cmd\":\"shutdown\"}}");
    }

    // Detached: it may be parked on stdin when the loop finishes.
    std::thread::Builder::new()
        .name("smartcar-stdin".to_string())
        .spawn(move || read_commands(sender))
        .map_err(|e| CarError::Transport(format!("cannot start stdin listener: {e}")))?;

    runtime.block_on(car.run());
    info!("drive loop finished");
    Ok(())
}

fn read_commands(sender: CommandSender) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "stdin read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = parse_command(&line).and_then(|command| sender.request_blocking(command));
        print_reply(reply);
    }
    // End of input stops the car.
    if let Err(e) = sender.submit_blocking(Command::Shutdown) {
        debug!(error = %e, "loop already stopped at end of input");
    }
}

fn print_reply(reply: Reply) {
    let ok = reply.is_ok();
    let json = match serde_json::to_string(&CommandReply::from(reply)) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "cannot encode reply");
            return;
        }
    };
    if std::io::stdout().is_terminal() {
        let tag = if ok { "ok ".green().bold() } else { "err".red().bold() };
        println!("{tag} {json}");
    } else {
        println!("{json}");
    }
}
