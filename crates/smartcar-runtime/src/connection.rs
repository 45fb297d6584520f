//! [`ServiceConnectionManager`] – keeps a live handle to the control service.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──resolve + link ok──▶ Connected
//!                              ▲   │                             │
//!                              │   └── failure: retry after ─────┘ death notice
//!                              └────── `retry_interval` ◀────────┘ (immediate attempt)
//! ```
//!
//! The manager never sleeps.  It reports [`retry_deadline`] and
//! [`action_deadline`] and the owning loop calls back when they pass.  It
//! also owns the single [`Action`] slot, so losing the service always
//! destroys the running action.
//!
//! [`retry_deadline`]: ServiceConnectionManager::retry_deadline
//! [`action_deadline`]: ServiceConnectionManager::action_deadline

use std::sync::Arc;
use std::time::Duration;

use smartcar_service::{
    ControlService, DeathNotifier, DeathSubscription, LinkId, RemoteService, ServiceLocator,
};
use smartcar_types::{CarError, Command, ConnectionState, DeviceStatus, Pin};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::command::{Outcome, Reply};

/// Delay between failed connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Live handle plus its death registration.
struct Link<S> {
    service: Arc<S>,
    death: DeathSubscription,
}

pub struct ServiceConnectionManager<L: ServiceLocator> {
    locator: L,
    retry_interval: Duration,
    state: ConnectionState,
    link: Option<Link<L::Service>>,
    next_link: LinkId,
    death_tx: mpsc::UnboundedSender<LinkId>,
    retry_at: Option<Instant>,
    action: Option<Action>,
    attempts: u64,
}

impl<L: ServiceLocator> ServiceConnectionManager<L> {
    /// Death notices for handles obtained by this manager are posted on
    /// `death_tx`; feed them back through [`Self::on_death`].
    pub fn new(
        locator: L,
        retry_interval: Duration,
        death_tx: mpsc::UnboundedSender<LinkId>,
    ) -> Self {
        Self {
            locator,
            retry_interval,
            state: ConnectionState::Disconnected,
            link: None,
            next_link: 1,
            death_tx,
            retry_at: None,
            action: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn service(&self) -> Option<&Arc<L::Service>> {
        self.link.as_ref().map(|l| &l.service)
    }

    /// One connection attempt.  On failure the next attempt is scheduled
    /// `retry_interval` from now.
    pub fn connect(&mut self) {
        self.state = ConnectionState::Connecting;
        self.retry_at = None;
        self.attempts += 1;

        let service = match self.locator.resolve() {
            Ok(service) => service,
            Err(e) => {
                debug!(attempt = self.attempts, error = %e, "control service not available");
                self.schedule_retry();
                return;
            }
        };

        let link = self.next_link;
        self.next_link += 1;
        match service.link_to_death(DeathNotifier::new(link, self.death_tx.clone())) {
            Ok(death) => {
                self.link = Some(Link { service, death });
                self.state = ConnectionState::Connected;
                info!(link, attempt = self.attempts, "connected to control service");
            }
            Err(e) => {
                warn!(error = %e, "death registration failed; handle discarded");
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        self.retry_at = Instant::now().checked_add(self.retry_interval);
        if self.retry_at.is_none() {
            warn!(interval = ?self.retry_interval, "retry interval out of clock range; not retrying");
        }
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    /// Called when [`Self::retry_deadline`] has passed.
    pub fn on_retry_due(&mut self) {
        if self.state != ConnectionState::Connected {
            self.connect();
        }
    }

    /// Death notice for `link`.  Notices for a handle that was already
    /// released are ignored.
    pub fn on_death(&mut self, link: LinkId) {
        let current = self.link.as_ref().map(|l| l.death.link());
        if current != Some(link) {
            debug!(link, ?current, "stale death notice ignored");
            return;
        }
        warn!(link, "control service died; reconnecting");
        self.action = None;
        self.release();
        self.connect();
    }

    fn release(&mut self) {
        if let Some(link) = self.link.take() {
            link.death.unlink();
        }
    }

    fn require_service(&self) -> Result<Arc<dyn ControlService>, CarError> {
        match &self.link {
            Some(link) => {
                let service: Arc<dyn ControlService> = link.service.clone();
                Ok(service)
            }
            None => Err(CarError::ServiceUnavailable(format!(
                "control service is {:?}",
                self.state
            ))),
        }
    }

    /// Replace the running action with a new one of `kind`, re-asserted
    /// every `duration_secs`.
    ///
    /// A rejected command leaves any running action untouched.
    ///
    /// # Errors
    ///
    /// [`CarError::InvalidCommand`] for a non-positive or non-finite
    /// duration, [`CarError::ServiceUnavailable`] while not connected, and
    /// the errors of [`Action::create`].
    pub fn start_action(&mut self, kind: &str, duration_secs: f64) -> Result<(), CarError> {
        let interval = Duration::try_from_secs_f64(duration_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                CarError::InvalidCommand(format!("duration must be positive, got {duration_secs}"))
            })?;
        let service = self.require_service()?;
        let mut action = Action::create(kind, interval, service)?;

        // The old action must be gone before the new one drives the wheels.
        self.action = None;
        action.start();
        self.action = Some(action);
        Ok(())
    }

    /// Stop and destroy the running action, if any.
    pub fn stop_action(&mut self) {
        if let Some(mut action) = self.action.take() {
            action.stop();
        }
    }

    /// Drive one wheel directly.  `state` is `"on"` or `"off"`.
    pub fn set_config(&mut self, pin: Pin, state: &str) -> Result<(), CarError> {
        let on = match state {
            "on" => true,
            "off" => false,
            other => {
                return Err(CarError::InvalidCommand(format!(
                    "state must be \"on\" or \"off\", got {other:?}"
                )));
            }
        };
        self.require_service()?.set_status(pin, on)
    }

    pub fn status(&self) -> DeviceStatus {
        let running = self.action.as_ref().filter(|a| a.is_running());
        DeviceStatus {
            connection: self.state,
            status: if running.is_some() { "driving" } else { "idle" }.to_string(),
            action: running.map(|a| a.kind().to_string()),
        }
    }

    pub fn action_deadline(&self) -> Option<(u64, Instant)> {
        self.action.as_ref().and_then(Action::deadline)
    }

    pub fn fire_action(&mut self, generation: u64) {
        if let Some(action) = self.action.as_mut() {
            action.fire(generation);
        }
    }

    /// Destroy the action and drop the connection.  No retry is scheduled.
    pub fn shutdown(&mut self) {
        self.action = None;
        self.release();
        self.retry_at = None;
        self.state = ConnectionState::Disconnected;
        info!("connection manager shut down");
    }

    /// Execute one command from the pairing layer.
    pub fn handle_command(&mut self, command: Command) -> Reply {
        match command {
            Command::StartAction { kind, duration } => {
                self.start_action(&kind, duration).map(|()| Outcome::Done)
            }
            Command::StopAction => {
                self.stop_action();
                Ok(Outcome::Done)
            }
            Command::SetConfig { pin, state } => {
                self.set_config(pin, &state).map(|()| Outcome::Done)
            }
            Command::Status => Ok(Outcome::Status(self.status())),
            Command::Shutdown => {
                self.shutdown();
                Ok(Outcome::Done)
            }
        }
    }
}

impl<L: ServiceLocator> Drop for ServiceConnectionManager<L> {
    fn drop(&mut self) {
        // Action first: it still needs the service to turn the wheels off.
        self.action = None;
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLocator, FakeRemote};

    fn manager(
        online: bool,
    ) -> (
        smartcar_hal::SimGpio,
        Arc<FakeRemote>,
        ServiceConnectionManager<FakeLocator>,
        mpsc::UnboundedReceiver<LinkId>,
    ) {
        let (gpio, remote) = FakeRemote::new(online);
        let (tx, rx) = mpsc::unbounded_channel();
        let manager =
            ServiceConnectionManager::new(FakeLocator::new(&remote), DEFAULT_RETRY_INTERVAL, tx);
        (gpio, remote, manager, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_registers_death_watch() {
        let (_, remote, mut manager, _rx) = manager(true);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(remote.is_watched());
        assert!(manager.retry_deadline().is_none());
        assert!(manager.service().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_resolve_schedules_retry() {
        let (_, remote, mut manager, _rx) = manager(false);
        let now = Instant::now();
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(manager.retry_deadline(), Some(now + DEFAULT_RETRY_INTERVAL));

        remote.set_online(true);
        manager.on_retry_due();
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_death_registration_counts_as_failure() {
        let (_, remote, mut manager, _rx) = manager(true);
        remote.refuse_links(true);
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.service().is_none());
        assert!(manager.retry_deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn death_drops_action_and_reconnects() {
        let (_, remote, mut manager, mut rx) = manager(true);
        manager.connect();
        manager.start_action("forward", 0.5).unwrap();
        assert_eq!(manager.status().status, "driving");
        assert_eq!(remote.list_status().unwrap(), vec![true; 4]);

        remote.kill();
        let link = rx.try_recv().unwrap();
        manager.on_death(link);

        assert_eq!(remote.list_status().unwrap(), vec![false; 4]);
        assert_eq!(manager.status().status, "idle");
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.retry_deadline().is_some());
        assert_eq!(remote.resolves(), 2, "reconnect is attempted immediately");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_death_notice_is_ignored() {
        let (_, _remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.on_death(999);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_require_a_connection() {
        let (_, _remote, mut manager, _rx) = manager(false);
        manager.connect();
        assert!(matches!(
            manager.start_action("forward", 1.0),
            Err(CarError::ServiceUnavailable(_))
        ));
        assert!(matches!(
            manager.set_config(23, "on"),
            Err(CarError::ServiceUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_start_keeps_running_action() {
        let (_, _remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.start_action("left", 1.0).unwrap();

        for (kind, secs) in [("back", 1.0), ("spin", 1.0), ("forward", 0.0), ("forward", -2.0)] {
            assert!(manager.start_action(kind, secs).is_err(), "{kind} {secs}");
        }
        assert!(manager.start_action("forward", f64::NAN).is_err());
        assert_eq!(manager.status().action.as_deref(), Some("left"));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_duration_is_rejected_without_panicking() {
        let (_, remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.start_action("left", 1.0).unwrap();

        assert!(matches!(
            manager.start_action("forward", 1.5e19),
            Err(CarError::InvalidCommand(_))
        ));
        assert_eq!(manager.status().action.as_deref(), Some("left"));
        assert_eq!(remote.list_status().unwrap(), vec![false, true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn unschedulable_retry_interval_does_not_panic() {
        let (_, remote) = FakeRemote::new(false);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut manager =
            ServiceConnectionManager::new(FakeLocator::new(&remote), Duration::MAX, tx);
        manager.connect();
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(manager.retry_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn superseding_action_replaces_pattern() {
        let (_, remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.start_action("left", 1.0).unwrap();
        assert_eq!(remote.list_status().unwrap(), vec![false, true, false, true]);

        manager.start_action("right", 1.0).unwrap();
        assert_eq!(remote.list_status().unwrap(), vec![true, false, true, false]);
        assert_eq!(manager.status().action.as_deref(), Some("right"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_action_turns_wheels_off() {
        let (_, remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.start_action("forward", 1.0).unwrap();
        manager.stop_action();
        assert_eq!(remote.list_status().unwrap(), vec![false; 4]);
        assert!(manager.action_deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn set_config_validates_state() {
        let (gpio, _remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.set_config(25, "on").unwrap();
        assert_eq!(gpio.level(25), Some(true));
        assert!(matches!(
            manager.set_config(25, "maybe"),
            Err(CarError::InvalidCommand(_))
        ));
        assert_eq!(manager.set_config(2, "on"), Err(CarError::UnknownPin(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_releases_everything() {
        let (_, remote, mut manager, _rx) = manager(true);
        manager.connect();
        manager.start_action("forward", 1.0).unwrap();

        let reply = manager.handle_command(Command::Shutdown);
        assert_eq!(reply, Ok(Outcome::Done));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!remote.is_watched());
        assert_eq!(remote.list_status().unwrap(), vec![false; 4]);
    }
}
