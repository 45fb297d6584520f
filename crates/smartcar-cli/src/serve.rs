//! `smartcar serve` – the wheel-owning side.

use std::sync::Arc;

use colored::Colorize;
use smartcar_hal::{SysfsGpio, Wheels};
use smartcar_service::{ControlServer, ControlService, LocalService};
use smartcar_types::CarError;
use tracing::{debug, info, warn};

use crate::config::Config;

pub fn run(cfg: &Config) -> Result<(), CarError> {
    let runtime = crate::build_runtime()?;

    let wheels = Wheels::new(SysfsGpio::new(&cfg.gpio_root));
    let service = Arc::new(LocalService::new(wheels));
    let server = ControlServer::new(Arc::clone(&service)).with_socket_path(&cfg.socket_path);

    println!(
        "  Control service on {}",
        cfg.socket_path.display().to_string().bold()
    );

    let result = runtime.block_on(async move {
        let listener = server.bind()?;
        tokio::select! {
            result = server.serve(listener) => result,
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Ctrl-C received; stopping control service"),
                    Err(e) => warn!(error = %e, "signal handler failed; stopping"),
                }
                Ok(())
            }
        }
    });

    // Connections are gone with the runtime; nobody can turn a wheel back on.
    drop(runtime);
    match service.set_all(false) {
        Ok(()) => println!("{}", "  ✓ Wheels stopped.".green()),
        Err(e) => {
            warn!(error = %e, "could not stop every wheel");
            println!("{}", "  ⚠  Some wheels may still be on.".yellow().bold());
        }
    }
    if let Err(e) = std::fs::remove_file(&cfg.socket_path) {
        debug!(error = %e, "socket already gone");
    }
    result
}
