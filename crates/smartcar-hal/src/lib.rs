//! `smartcar-hal` – Wheel Hardware Abstraction
//!
//! # Modules
//!
//! - [`gpio`] – [`GpioPins`][gpio::GpioPins]: per-pin export / direction /
//!   value primitives, implemented for the Linux sysfs interface by
//!   [`SysfsGpio`][gpio::SysfsGpio].
//! - [`wheels`] – [`Wheels`][wheels::Wheels]: the fixed, ordered wheel
//!   registry with last-known status.
//! - [`sim`] – [`SimGpio`][sim::SimGpio]: in-memory driver with per-pin
//!   fault injection for tests and CI.

pub mod gpio;
pub mod sim;
pub mod wheels;

pub use gpio::{DEFAULT_SYSFS_ROOT, GpioPins, SysfsGpio};
pub use sim::SimGpio;
pub use wheels::{WHEEL_LAYOUT, Wheels};
