//! In-process GPIO simulation for tests and CI runs without a vehicle.
//!
//! [`SimGpio`] keeps pin levels in memory and lets a test inject failures
//! per pin or change a level behind the registry's back (external drift).
//! Clones share state, so a test can keep one handle while the
//! [`Wheels`][crate::wheels::Wheels] registry owns another.
//!
//! # Example
//!
//! ```rust
//! use smartcar_hal::sim::SimGpio;
//! use smartcar_hal::wheels::Wheels;
//!
//! let gpio = SimGpio::new();
//! let mut wheels = Wheels::new(gpio.clone());
//!
//! gpio.fail_writes(24, true);
//! assert!(wheels.set_on(24, true).is_err());
//! assert_eq!(wheels.status(), vec![false, false, false, false]);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use smartcar_types::{CarError, Pin};

use crate::gpio::GpioPins;

#[derive(Debug, Default)]
struct SimState {
    exported: BTreeSet<Pin>,
    outputs: BTreeSet<Pin>,
    levels: BTreeMap<Pin, bool>,
    failing_exports: BTreeSet<Pin>,
    failing_writes: BTreeSet<Pin>,
    failing_reads: BTreeSet<Pin>,
    writes: Vec<(Pin, bool)>,
}

/// Simulated [`GpioPins`] driver.
#[derive(Debug, Clone, Default)]
pub struct SimGpio {
    state: Arc<Mutex<SimState>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every future export of `pin` fail.
    pub fn fail_export(&self, pin: Pin) {
        self.lock().failing_exports.insert(pin);
    }

    /// Toggle write failures on `pin`.
    pub fn fail_writes(&self, pin: Pin, failing: bool) {
        toggle(&mut self.lock().failing_writes, pin, failing);
    }

    /// Toggle read failures on `pin`.
    pub fn fail_reads(&self, pin: Pin, failing: bool) {
        toggle(&mut self.lock().failing_reads, pin, failing);
    }

    /// Change the level of `pin` without going through the driver, as a
    /// short or a manual override would.
    pub fn drift(&self, pin: Pin, on: bool) {
        self.lock().levels.insert(pin, on);
    }

    /// Level last written to `pin`, `None` if it was never written.
    pub fn level(&self, pin: Pin) -> Option<bool> {
        self.lock().levels.get(&pin).copied()
    }

    pub fn is_exported(&self, pin: Pin) -> bool {
        self.lock().exported.contains(&pin)
    }

    pub fn is_output(&self, pin: Pin) -> bool {
        self.lock().outputs.contains(&pin)
    }

    /// Every successful write so far, in order.
    pub fn writes(&self) -> Vec<(Pin, bool)> {
        self.lock().writes.clone()
    }
}

impl GpioPins for SimGpio {
    fn export(&mut self, pin: Pin) -> Result<(), CarError> {
        let mut state = self.lock();
        if state.failing_exports.contains(&pin) {
            return Err(sim_fault(pin, "export rejected"));
        }
        state.exported.insert(pin);
        Ok(())
    }

    fn set_output(&mut self, pin: Pin) -> Result<(), CarError> {
        let mut state = self.lock();
        if !state.exported.contains(&pin) {
            return Err(sim_fault(pin, "direction: no such pin"));
        }
        state.outputs.insert(pin);
        Ok(())
    }

    fn write(&mut self, pin: Pin, on: bool) -> Result<(), CarError> {
        let mut state = self.lock();
        if state.failing_writes.contains(&pin) {
            return Err(sim_fault(pin, "value: I/O error"));
        }
        if !state.outputs.contains(&pin) {
            return Err(sim_fault(pin, "value: pin is not an output"));
        }
        state.levels.insert(pin, on);
        state.writes.push((pin, on));
        Ok(())
    }

    fn read(&self, pin: Pin) -> bool {
        let state = self.lock();
        if state.failing_reads.contains(&pin) || !state.exported.contains(&pin) {
            return false;
        }
        state.levels.get(&pin).copied().unwrap_or(false)
    }
}

fn toggle(set: &mut BTreeSet<Pin>, pin: Pin, present: bool) {
    if present {
        set.insert(pin);
    } else {
        set.remove(&pin);
    }
}

fn sim_fault(pin: Pin, details: &str) -> CarError {
    CarError::HardwareFault {
        pin,
        details: details.to_string(),
    }
}
