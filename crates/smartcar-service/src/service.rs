//! [`ControlService`] – the wheel registry as a request/response surface.
//!
//! Every call returns an explicit `Result`; on `Err` any output must be
//! treated as stale.  `set_status` and `set_all` are the only calls that
//! change state.

use std::sync::{Mutex, MutexGuard};

use smartcar_hal::{GpioPins, Wheels};
use smartcar_types::{CarError, Payload, Pin, Request, Response};
use tracing::debug;

/// Synchronous wheel-control surface, served locally or over IPC.
pub trait ControlService: Send + Sync {
    fn list_names(&self) -> Result<Vec<String>, CarError>;

    fn list_pins(&self) -> Result<Vec<Pin>, CarError>;

    /// Cached wheel levels, index-aligned with [`ControlService::list_names`].
    fn list_status(&self) -> Result<Vec<bool>, CarError>;

    fn count(&self) -> Result<usize, CarError>;

    fn set_status(&self, pin: Pin, on: bool) -> Result<(), CarError>;

    /// Live level of `pin`, read from hardware.
    fn get_status(&self, pin: Pin) -> Result<bool, CarError>;

    /// Drive every wheel.  Individual failures do not stop the others.
    fn set_all(&self, on: bool) -> Result<(), CarError>;
}

/// In-process [`ControlService`] that owns the wheel registry.
#[derive(Debug)]
pub struct LocalService<D> {
    wheels: Mutex<Wheels<D>>,
}

impl<D: GpioPins> LocalService<D> {
    pub fn new(wheels: Wheels<D>) -> Self {
        Self {
            wheels: Mutex::new(wheels),
        }
    }

    fn wheels(&self) -> MutexGuard<'_, Wheels<D>> {
        self.wheels.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<D: GpioPins> ControlService for LocalService<D> {
    fn list_names(&self) -> Result<Vec<String>, CarError> {
        Ok(self.wheels().names())
    }

    fn list_pins(&self) -> Result<Vec<Pin>, CarError> {
        Ok(self.wheels().pins())
    }

    fn list_status(&self) -> Result<Vec<bool>, CarError> {
        Ok(self.wheels().status())
    }

    fn count(&self) -> Result<usize, CarError> {
        Ok(self.wheels().count())
    }

    fn set_status(&self, pin: Pin, on: bool) -> Result<(), CarError> {
        self.wheels().set_on(pin, on)
    }

    fn get_status(&self, pin: Pin) -> Result<bool, CarError> {
        let wheels = self.wheels();
        if !wheels.pins().contains(&pin) {
            return Err(CarError::UnknownPin(pin));
        }
        Ok(wheels.is_on(pin))
    }

    fn set_all(&self, on: bool) -> Result<(), CarError> {
        self.wheels().set_all(on)
    }
}

/// Execute one wire [`Request`] against `service`.
///
/// [`Request::Watch`] is a connection mode handled by the server, not a
/// call, and is answered with [`CarError::InvalidCommand`] here.
pub fn dispatch<S: ControlService + ?Sized>(service: &S, request: Request) -> Response {
    debug!(?request, "control request");
    let result = match request {
        Request::ListNames => service.list_names().map(|v| Some(Payload::Names(v))),
        Request::ListPins => service.list_pins().map(|v| Some(Payload::Pins(v))),
        Request::ListStatus => service.list_status().map(|v| Some(Payload::Status(v))),
        Request::Count => service.count().map(|n| Some(Payload::Count(n))),
        Request::SetStatus { pin, on } => service.set_status(pin, on).map(|()| None),
        Request::GetStatus { pin } => service.get_status(pin).map(|on| Some(Payload::On(on))),
        Request::SetAll { on } => service.set_all(on).map(|()| None),
        Request::Watch => Err(CarError::InvalidCommand(
            "watch is a connection mode, not a call".to_string(),
        )),
    };
    match result {
        Ok(payload) => Response::success(payload),
        Err(e) => Response::failure(e),
    }
}
