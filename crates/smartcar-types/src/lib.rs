use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GPIO pin number as understood by the host kernel (e.g. `23` for
/// `/sys/class/gpio/gpio23`).
pub type Pin = i32;

/// Request sent to the control service.  One JSON object per line on the
/// wire, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    ListNames,
    ListPins,
    ListStatus,
    Count,
    SetStatus { pin: Pin, on: bool },
    GetStatus { pin: Pin },
    SetAll { on: bool },
    /// Keep this connection open with no reply.  The client treats EOF on it
    /// as the death notification for the service.
    Watch,
}

/// Output payload of a successful [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Names(Vec<String>),
    Pins(Vec<Pin>),
    Status(Vec<bool>),
    Count(usize),
    On(bool),
}

/// Reply to a [`Request`].
///
/// `ok` is carried independently of the payload: when it is `false` any
/// payload must be treated as stale and `error` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CarError>,
}

impl Response {
    pub fn success(payload: Option<Payload>) -> Self {
        Self {
            ok: true,
            payload,
            error: None,
        }
    }

    pub fn failure(error: CarError) -> Self {
        Self {
            ok: false,
            payload: None,
            error: Some(error),
        }
    }

    /// Collapse the reply into a `Result`, dropping the payload of a failed
    /// call.
    pub fn into_result(self) -> Result<Option<Payload>, CarError> {
        if self.ok {
            Ok(self.payload)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| CarError::Transport("failure reply without error".into())))
        }
    }
}

/// Commands accepted from the pairing / command layer.  Tagged by `cmd` on
/// the wire, e.g. `{"cmd":"start_action","type":"forward","duration":5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Start (or replace) the timed action.  `duration` is in seconds and is
    /// used as the re-assertion interval.
    StartAction {
        #[serde(rename = "type")]
        kind: String,
        duration: f64,
    },
    StopAction,
    /// Drive a single wheel; `state` must be `"on"` or `"off"`.
    SetConfig { pin: Pin, state: String },
    Status,
    Shutdown,
}

/// Availability of the remote control service as seen by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Device state surfaced to the pairing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub connection: ConnectionState,
    /// `"idle"` or `"driving"`.
    pub status: String,
    /// Type of the running action, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Workspace-wide error type.  Serializable so it can travel inside a
/// [`Response`] unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CarError {
    #[error("Hardware Fault on pin {pin}: {details}")]
    HardwareFault { pin: Pin, details: String },

    #[error("Partial write: pins {failed:?} kept their previous level")]
    PartialWrite { failed: Vec<Pin> },

    #[error("Unknown pin: {0}")]
    UnknownPin(Pin),

    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Control service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Command queue is full")]
    QueueFull,
}
