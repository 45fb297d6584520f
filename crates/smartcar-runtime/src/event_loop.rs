//! [`CarLoop`] – the single cooperative loop that owns the car's state.
//!
//! One `tokio::select!` multiplexes four sources, polled in this order:
//!
//! 1. death notices for the current service handle;
//! 2. commands from the bounded queue;
//! 3. the connection retry deadline;
//! 4. the running action's next re-assertion.
//!
//! Everything runs on the loop's task, so the manager and its action need
//! no locking and a pass is never interrupted.

use std::future::pending;
use std::time::Duration;

use smartcar_service::{LinkId, ServiceLocator};
use smartcar_types::Command;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::info;

use crate::command::{CommandReceiver, CommandSender, command_queue};
use crate::connection::{DEFAULT_RETRY_INTERVAL, ServiceConnectionManager};

/// Default bound of the command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 16;

/// Tuning knobs for [`CarLoop`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Delay between failed connection attempts.
    pub retry_interval: Duration,
    /// Commands that may wait in the queue before submissions fail.
    pub command_capacity: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            command_capacity: DEFAULT_COMMAND_CAPACITY,
        }
    }
}

pub struct CarLoop<L: ServiceLocator> {
    manager: ServiceConnectionManager<L>,
    commands: CommandReceiver,
    deaths: mpsc::UnboundedReceiver<LinkId>,
}

impl<L: ServiceLocator> CarLoop<L> {
    /// Build the loop and the sender through which it receives commands.
    pub fn new(locator: L, config: LoopConfig) -> (Self, CommandSender) {
        let (death_tx, deaths) = mpsc::unbounded_channel();
        let (sender, commands) = command_queue(config.command_capacity);
        let manager = ServiceConnectionManager::new(locator, config.retry_interval, death_tx);
        (
            Self {
                manager,
                commands,
                deaths,
            },
            sender,
        )
    }

    /// Run until a `shutdown` command arrives or every sender is dropped.
    /// On exit any action is destroyed, leaving the wheels off.
    pub async fn run(mut self) {
        info!("car loop starting");
        self.manager.connect();

        loop {
            let retry_at = self.manager.retry_deadline();
            let fire = self.manager.action_deadline();

            tokio::select! {
                biased;

                Some(link) = self.deaths.recv() => self.manager.on_death(link),
                envelope = self.commands.recv() => {
                    let Some(envelope) = envelope else {
                        info!("command queue closed");
                        break;
                    };
                    let shutdown = envelope.command == Command::Shutdown;
                    let reply = self.manager.handle_command(envelope.command.clone());
                    envelope.respond(reply);
                    if shutdown {
                        break;
                    }
                }
                () = sleep_until_opt(retry_at) => self.manager.on_retry_due(),
                () = sleep_until_opt(fire.map(|(_, at)| at)) => {
                    if let Some((generation, _)) = fire {
                        self.manager.fire_action(generation);
                    }
                }
            }
        }

        self.manager.shutdown();
        info!("car loop stopped");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
