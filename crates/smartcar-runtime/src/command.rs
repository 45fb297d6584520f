//! Cross-thread command entry for the car loop.
//!
//! Listener threads hold a [`CommandSender`]; the loop alone drains the
//! [`CommandReceiver`].  The queue is bounded: when it is full a submission
//! fails immediately with [`CarError::QueueFull`] instead of blocking the
//! listener.

use serde::Serialize;
use smartcar_types::{CarError, Command, DeviceStatus};
use tokio::sync::{mpsc, oneshot};

/// Successful result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Status(DeviceStatus),
}

pub type Reply = Result<Outcome, CarError>;

/// Wire form of a [`Reply`], one JSON object per command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeviceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CarError>,
}

impl From<Reply> for CommandReply {
    fn from(reply: Reply) -> Self {
        match reply {
            Ok(Outcome::Done) => Self {
                ok: true,
                status: None,
                error: None,
            },
            Ok(Outcome::Status(status)) => Self {
                ok: true,
                status: Some(status),
                error: None,
            },
            Err(error) => Self {
                ok: false,
                status: None,
                error: Some(error),
            },
        }
    }
}

/// A queued command and where to send its reply.
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    reply: Option<oneshot::Sender<Reply>>,
}

impl Envelope {
    /// Deliver `reply` to the submitter, if it is still waiting.
    pub fn respond(self, reply: Reply) {
        if let Some(tx) = self.reply {
            let _ = tx.send(reply);
        }
    }
}

/// Create a bounded command queue holding at most `capacity` commands.
pub fn command_queue(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Submitting half of the command queue.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Envelope>,
}

impl CommandSender {
    /// Enqueue `command` without waiting for its reply.
    pub fn submit(&self, command: Command) -> Result<(), CarError> {
        self.enqueue(Envelope {
            command,
            reply: None,
        })
    }

    /// Enqueue `command`, waiting for room when the queue is full.  For
    /// commands that must not be lost, such as `shutdown`.  Must not be
    /// called from inside the runtime.
    pub fn submit_blocking(&self, command: Command) -> Result<(), CarError> {
        self.tx
            .blocking_send(Envelope {
                command,
                reply: None,
            })
            .map_err(|_| loop_stopped())
    }

    /// Enqueue `command` and wait for the loop to execute it.
    pub async fn request(&self, command: Command) -> Reply {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            command,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| loop_stopped())?
    }

    /// Blocking variant of [`CommandSender::request`] for plain threads.
    /// Must not be called from inside the runtime.
    pub fn request_blocking(&self, command: Command) -> Reply {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Envelope {
            command,
            reply: Some(tx),
        })?;
        rx.blocking_recv().map_err(|_| loop_stopped())?
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), CarError> {
        self.tx.try_send(envelope).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CarError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => loop_stopped(),
        })
    }
}

/// Draining half of the command queue, owned by the loop.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl CommandReceiver {
    /// Next command, or `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Parse one JSON command line.
pub fn parse_command(line: &str) -> Result<Command, CarError> {
    serde_json::from_str(line.trim())
        .map_err(|e| CarError::InvalidCommand(format!("malformed command: {e}")))
}

fn loop_stopped() -> CarError {
    CarError::Transport("command loop has stopped".to_string())
}
