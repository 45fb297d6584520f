//! [`GpioPins`] – the hardware-facing primitive behind every wheel.
//!
//! Each operation maps onto one blocking file operation of the Linux GPIO
//! sysfs interface:
//!
//! | Operation | File | Written / read |
//! |---|---|---|
//! | [`GpioPins::export`] | `<root>/export` | decimal pin id |
//! | [`GpioPins::set_output`] | `<root>/gpio<N>/direction` | `"out"` |
//! | [`GpioPins::write`] | `<root>/gpio<N>/value` | `"0"` / `"1"` |
//! | [`GpioPins::read`] | `<root>/gpio<N>/value` | trimmed integer, `> 0` is on |
//!
//! No timeout is applied to any of these calls; a wedged device stalls the
//! caller.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use smartcar_types::{CarError, Pin};
use tracing::{debug, warn};

/// Default mount point of the GPIO sysfs class.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Per-pin GPIO primitives.
///
/// Writes report failure through `Result`; reads never fail and fall back
/// to `false` (off) instead.
pub trait GpioPins: Send {
    /// Make `pin` controllable.  Exporting an already exported pin succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::HardwareFault`] when the export request cannot be
    /// written.
    fn export(&mut self, pin: Pin) -> Result<(), CarError>;

    /// Configure `pin` as an output.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::HardwareFault`] on I/O failure.
    fn set_output(&mut self, pin: Pin) -> Result<(), CarError>;

    /// Drive `pin` high (`true`) or low (`false`).
    ///
    /// # Errors
    ///
    /// Returns [`CarError::HardwareFault`] on I/O failure; the pin level is
    /// then unknown and must not be assumed changed.
    fn write(&mut self, pin: Pin, on: bool) -> Result<(), CarError>;

    /// Read the live level of `pin`.  Any I/O or parse failure reads as off.
    fn read(&self, pin: Pin) -> bool;
}

/// [`GpioPins`] backed by the kernel's sysfs GPIO interface.
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// Create a driver rooted at `root` (normally [`DEFAULT_SYSFS_ROOT`]).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pin_dir(&self, pin: Pin) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn attr(&self, pin: Pin, name: &str) -> PathBuf {
        self.pin_dir(pin).join(name)
    }
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl GpioPins for SysfsGpio {
    fn export(&mut self, pin: Pin) -> Result<(), CarError> {
        // The kernel answers EBUSY to a second export.
        if self.pin_dir(pin).is_dir() {
            debug!(pin, "gpio already exported");
            return Ok(());
        }
        write_existing(&self.root.join("export"), &pin.to_string())
            .map_err(|e| fault(pin, "export", e))
    }

    fn set_output(&mut self, pin: Pin) -> Result<(), CarError> {
        write_existing(&self.attr(pin, "direction"), "out")
            .map_err(|e| fault(pin, "direction", e))
    }

    fn write(&mut self, pin: Pin, on: bool) -> Result<(), CarError> {
        let value = if on { "1" } else { "0" };
        write_existing(&self.attr(pin, "value"), value).map_err(|e| fault(pin, "value", e))
    }

    fn read(&self, pin: Pin) -> bool {
        let path = self.attr(pin, "value");
        match fs::read_to_string(&path) {
            Ok(raw) => parse_level(&raw).unwrap_or_else(|| {
                warn!(pin, raw = raw.trim(), "unparseable gpio value; assuming off");
                false
            }),
            Err(e) => {
                warn!(pin, error = %e, "gpio read failed; assuming off");
                false
            }
        }
    }
}

/// Parse the content of a sysfs `value` file.
pub(crate) fn parse_level(raw: &str) -> Option<bool> {
    raw.trim().parse::<i32>().ok().map(|v| v > 0)
}

// sysfs attributes are never created by userspace, only opened.
fn write_existing(path: &Path, value: &str) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)?;
    file.write_all(value.as_bytes())
}

fn fault(pin: Pin, op: &str, e: io::Error) -> CarError {
    CarError::HardwareFault {
        pin,
        details: format!("{op}: {e}"),
    }
}
