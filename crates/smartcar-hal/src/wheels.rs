//! [`Wheels`] – the fixed, ordered registry of wheel actuators.
//!
//! The registry is built once from a list of `(name, pin)` pairs.  Every
//! entry is exported, configured as an output and driven low before the
//! registry is handed out, so a freshly started vehicle never moves.
//!
//! # Cached vs. live state
//!
//! [`Wheels::status`] reports the level of the last *successful* write to
//! each wheel.  [`Wheels::is_on`] bypasses that cache and reads the pin.  The
//! two can disagree when a write failed or when something outside this
//! process changed a pin.
//!
//! # Example
//!
//! ```rust
//! use smartcar_hal::sim::SimGpio;
//! use smartcar_hal::wheels::Wheels;
//!
//! let mut wheels = Wheels::new(SimGpio::new());
//! wheels.set_on(24, true).unwrap();
//! assert_eq!(wheels.status(), vec![false, true, false, false]);
//!
//! wheels.set_all(true).unwrap();
//! assert_eq!(wheels.status(), vec![true, true, true, true]);
//! ```

use smartcar_types::{CarError, Pin};
use tracing::{debug, info, warn};

use crate::gpio::GpioPins;

/// Wheel wiring of the reference vehicle, in listing order.
pub const WHEEL_LAYOUT: [(&str, Pin); 4] = [
    ("left_front", 23),
    ("right_front", 24),
    ("left_after", 25),
    ("right_after", 26),
];

#[derive(Debug, Clone)]
struct Wheel {
    name: String,
    pin: Pin,
    /// Level of the last successful write.
    on: bool,
    /// `false` when the export failed; the wheel stays dead for this run.
    exported: bool,
}

/// Ordered wheel registry over a [`GpioPins`] driver.
///
/// Membership is fixed at construction; the order of [`Wheels::names`],
/// [`Wheels::pins`] and [`Wheels::status`] always lines up.
#[derive(Debug)]
pub struct Wheels<D> {
    driver: D,
    wheels: Vec<Wheel>,
}

impl<D: GpioPins> Wheels<D> {
    /// Build the registry for [`WHEEL_LAYOUT`].
    pub fn new(driver: D) -> Self {
        Self::with_layout(driver, &WHEEL_LAYOUT)
    }

    /// Build the registry for an arbitrary `(name, pin)` layout.
    ///
    /// Hardware failures during initialisation are logged and never abort
    /// construction.  A wheel whose export fails is kept in the listings but
    /// every later write to it is refused.
    pub fn with_layout(mut driver: D, layout: &[(&str, Pin)]) -> Self {
        let mut wheels = Vec::with_capacity(layout.len());
        for &(name, pin) in layout {
            let exported = match driver.export(pin) {
                Ok(()) => true,
                Err(e) => {
                    warn!(wheel = name, pin, error = %e, "export failed; wheel disabled");
                    false
                }
            };
            if exported {
                if let Err(e) = driver.set_output(pin) {
                    warn!(wheel = name, pin, error = %e, "could not configure output");
                }
                if let Err(e) = driver.write(pin, false) {
                    warn!(wheel = name, pin, error = %e, "could not drive wheel low");
                }
            }
            wheels.push(Wheel {
                name: name.to_string(),
                pin,
                on: false,
                exported,
            });
        }
        info!(count = wheels.len(), "wheels initialised");
        Self { driver, wheels }
    }

    pub fn names(&self) -> Vec<String> {
        self.wheels.iter().map(|w| w.name.clone()).collect()
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.wheels.iter().map(|w| w.pin).collect()
    }

    /// Cached levels, index-aligned with [`Wheels::names`].
    pub fn status(&self) -> Vec<bool> {
        self.wheels.iter().map(|w| w.on).collect()
    }

    pub fn count(&self) -> usize {
        self.wheels.len()
    }

    /// Live read of `pin`.  Unregistered and disabled pins read as off
    /// without touching hardware.
    pub fn is_on(&self, pin: Pin) -> bool {
        match self.wheels.iter().find(|w| w.pin == pin) {
            Some(wheel) if wheel.exported => self.driver.read(pin),
            _ => false,
        }
    }

    /// Drive one wheel.  The cached level changes only if the write
    /// succeeded.
    ///
    /// # Errors
    ///
    /// - [`CarError::UnknownPin`] – `pin` is not part of the registry; no
    ///   hardware is touched.
    /// - [`CarError::HardwareFault`] – the wheel is disabled or the write
    ///   failed.
    pub fn set_on(&mut self, pin: Pin, on: bool) -> Result<(), CarError> {
        let index = self
            .wheels
            .iter()
            .position(|w| w.pin == pin)
            .ok_or(CarError::UnknownPin(pin))?;
        if !self.wheels[index].exported {
            return Err(CarError::HardwareFault {
                pin,
                details: "pin was never exported".to_string(),
            });
        }
        self.driver.write(pin, on)?;
        self.wheels[index].on = on;
        debug!(wheel = %self.wheels[index].name, pin, on, "wheel set");
        Ok(())
    }

    /// Drive every wheel in listing order.
    ///
    /// A failing wheel does not stop the others and nothing is rolled back;
    /// re-query [`Wheels::status`] for the resulting state.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::PartialWrite`] listing the wheels that kept their
    /// previous level.
    pub fn set_all(&mut self, on: bool) -> Result<(), CarError> {
        let mut failed = Vec::new();
        for pin in self.pins() {
            if let Err(e) = self.set_on(pin, on) {
                warn!(pin, on, error = %e, "wheel write failed");
                failed.push(pin);
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(CarError::PartialWrite { failed })
        }
    }
}
