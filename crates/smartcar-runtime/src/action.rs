//! [`Action`] – a periodically re-asserted wheel pattern.
//!
//! An action is created from a command string by [`Action::create`], runs one
//! actuation pass on [`Action::start`] and then asks its owner to call
//! [`Action::fire`] every `interval` until stopped.  Timer ownership stays
//! with the caller: [`Action::deadline`] reports when the next pass is due
//! together with the generation it was armed for.
//!
//! # Cancellation
//!
//! [`Action::stop`] bumps the generation.  A fire carrying an older
//! generation is ignored, so no pass runs after `stop` returns even if the
//! owner already had a deadline in hand.
//!
//! # Teardown
//!
//! Dropping an action drives every wheel off, whatever state it was in.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use smartcar_service::ControlService;
use smartcar_types::CarError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The closed set of motion patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Forward,
    Left,
    Right,
    /// Recognised but cannot be driven: wheels have no reverse channel.
    Back,
}

impl ActionKind {
    /// Desired level for the wheel called `wheel` during one pass.
    pub fn wheel_on(self, wheel: &str) -> bool {
        match self {
            ActionKind::Forward => true,
            ActionKind::Left => wheel.starts_with("right_"),
            ActionKind::Right => wheel.starts_with("left_"),
            ActionKind::Back => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Forward => "forward",
            ActionKind::Left => "left",
            ActionKind::Right => "right",
            ActionKind::Back => "back",
        }
    }
}

impl FromStr for ActionKind {
    type Err = CarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(ActionKind::Forward),
            "left" => Ok(ActionKind::Left),
            "right" => Ok(ActionKind::Right),
            "back" => Ok(ActionKind::Back),
            other => Err(CarError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A running or idle motion pattern bound to one service handle.
pub struct Action {
    kind: ActionKind,
    interval: Duration,
    service: Arc<dyn ControlService>,
    running: bool,
    generation: u64,
    next_fire: Option<Instant>,
}

impl Action {
    /// Build an idle action.
    ///
    /// # Errors
    ///
    /// - [`CarError::UnknownAction`] – `kind` names no pattern.
    /// - [`CarError::UnsupportedAction`] – `kind` is `"back"`.
    /// - [`CarError::InvalidCommand`] – `interval` is zero or too large to
    ///   schedule.
    pub fn create(
        kind: &str,
        interval: Duration,
        service: Arc<dyn ControlService>,
    ) -> Result<Self, CarError> {
        let kind: ActionKind = kind.parse()?;
        if kind == ActionKind::Back {
            return Err(CarError::UnsupportedAction(kind.to_string()));
        }
        if interval.is_zero() {
            return Err(CarError::InvalidCommand(
                "action duration must be positive".to_string(),
            ));
        }
        if Instant::now().checked_add(interval).is_none() {
            return Err(CarError::InvalidCommand(format!(
                "action duration of {}s is too large",
                interval.as_secs()
            )));
        }
        Ok(Self {
            kind,
            interval,
            service,
            running: false,
            generation: 0,
            next_fire: None,
        })
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Run one pass now and arm the next one.  No-op while running.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(action = %self.kind, interval_ms = self.interval.as_millis() as u64, "action started");
        self.pass();
        self.arm();
    }

    /// Cancel every pending fire.  Wheels keep their current level.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        self.generation = self.generation.wrapping_add(1);
        self.next_fire = None;
        info!(action = %self.kind, "action stopped");
    }

    /// When the next pass is due and the generation to fire it with.
    pub fn deadline(&self) -> Option<(u64, Instant)> {
        self.next_fire.map(|at| (self.generation, at))
    }

    /// Scheduled callback.  Returns `true` if a pass ran.
    pub fn fire(&mut self, generation: u64) -> bool {
        if !self.running || generation != self.generation {
            debug!(action = %self.kind, generation, "stale fire ignored");
            return false;
        }
        self.pass();
        self.arm();
        true
    }

    fn arm(&mut self) {
        self.next_fire = Instant::now().checked_add(self.interval);
        if self.next_fire.is_none() {
            warn!(action = %self.kind, "next pass is out of clock range; not re-armed");
        }
    }

    fn pass(&self) {
        let names = match self.service.list_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(action = %self.kind, error = %e, "cannot list wheels");
                return;
            }
        };
        let pins = match self.service.list_pins() {
            Ok(pins) => pins,
            Err(e) => {
                warn!(action = %self.kind, error = %e, "cannot list pins");
                return;
            }
        };
        for (name, pin) in names.iter().zip(pins) {
            let on = self.kind.wheel_on(name);
            if let Err(e) = self.service.set_status(pin, on) {
                warn!(action = %self.kind, wheel = %name, pin, error = %e, "wheel write failed");
            }
        }
    }
}

impl Drop for Action {
    fn drop(&mut self) {
        if let Err(e) = self.service.set_all(false) {
            warn!(action = %self.kind, error = %e, "could not stop wheels");
        }
        debug!(action = %self.kind, "action released");
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("interval", &self.interval)
            .field("running", &self.running)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcar_hal::{SimGpio, Wheels};
    use smartcar_service::LocalService;

    fn make_service() -> (SimGpio, Arc<dyn ControlService>) {
        let gpio = SimGpio::new();
        let service: Arc<dyn ControlService> =
            Arc::new(LocalService::new(Wheels::new(gpio.clone())));
        (gpio, service)
    }

    fn forward(service: &Arc<dyn ControlService>) -> Action {
        Action::create("forward", Duration::from_millis(500), Arc::clone(service)).unwrap()
    }

    #[test]
    fn factory_rejects_unknown_and_unsupported() {
        let (_, service) = make_service();
        let second = Duration::from_secs(1);
        assert_eq!(
            Action::create("spin", second, Arc::clone(&service)).unwrap_err(),
            CarError::UnknownAction("spin".to_string())
        );
        assert_eq!(
            Action::create("back", second, Arc::clone(&service)).unwrap_err(),
            CarError::UnsupportedAction("back".to_string())
        );
        assert!(matches!(
            Action::create("forward", Duration::ZERO, Arc::clone(&service)).unwrap_err(),
            CarError::InvalidCommand(_)
        ));
        assert!(matches!(
            Action::create("forward", Duration::MAX, service).unwrap_err(),
            CarError::InvalidCommand(_)
        ));
    }

    #[test]
    fn kind_effects() {
        assert!(ActionKind::Forward.wheel_on("left_front"));
        assert!(ActionKind::Left.wheel_on("right_after"));
        assert!(!ActionKind::Left.wheel_on("left_after"));
        assert!(ActionKind::Right.wheel_on("left_front"));
        assert!(!ActionKind::Right.wheel_on("right_front"));
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_exactly_one_pass() {
        let (gpio, service) = make_service();
        let initial = gpio.writes().len();

        let mut action = forward(&service);
        action.start();
        assert_eq!(gpio.writes().len() - initial, 4);
        assert_eq!(service.list_status().unwrap(), vec![true; 4]);

        action.start();
        assert_eq!(gpio.writes().len() - initial, 4, "second start is a no-op");
    }

    #[tokio::test(start_paused = true)]
    async fn left_turn_drives_right_side_only() {
        let (_, service) = make_service();
        let mut action =
            Action::create("left", Duration::from_secs(1), Arc::clone(&service)).unwrap();
        action.start();
        assert_eq!(service.list_status().unwrap(), vec![false, true, false, true]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_one_interval_out() {
        let (_, service) = make_service();
        let mut action = forward(&service);
        assert!(action.deadline().is_none());

        let before = Instant::now();
        action.start();
        let (_, at) = action.deadline().unwrap();
        assert_eq!(at - before, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn fire_reasserts_and_rearms() {
        let (gpio, service) = make_service();
        let mut action = forward(&service);
        action.start();
        let (generation, _) = action.deadline().unwrap();

        gpio.drift(23, false);
        service.set_status(24, false).unwrap();
        assert!(action.fire(generation));
        assert_eq!(service.list_status().unwrap(), vec![true; 4]);
        assert_eq!(gpio.level(23), Some(true));
        assert!(action.deadline().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_ignored_after_stop() {
        let (gpio, service) = make_service();
        let mut action = forward(&service);
        action.start();
        let (generation, _) = action.deadline().unwrap();

        action.stop();
        let writes = gpio.writes().len();
        assert!(!action.fire(generation));
        assert!(action.deadline().is_none());
        assert_eq!(gpio.writes().len(), writes);

        // Restarting arms a fresh generation; the old one stays dead.
        action.start();
        let (fresh, _) = action.deadline().unwrap();
        assert_ne!(fresh, generation);
        assert!(!action.fire(generation));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_turns_everything_off() {
        let (_, service) = make_service();
        let mut action = forward(&service);
        action.start();
        assert_eq!(service.list_status().unwrap(), vec![true; 4]);

        drop(action);
        assert_eq!(service.list_status().unwrap(), vec![false; 4]);
    }

    #[test]
    fn drop_of_idle_action_still_forces_off() {
        let (_, service) = make_service();
        service.set_all(true).unwrap();
        drop(forward(&service));
        assert_eq!(service.list_status().unwrap(), vec![false; 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_do_not_abort_pass() {
        let (gpio, service) = make_service();
        gpio.fail_writes(24, true);
        let mut action = forward(&service);
        action.start();
        assert_eq!(service.list_status().unwrap(), vec![true, false, true, true]);
        assert!(action.is_running());
    }
}
