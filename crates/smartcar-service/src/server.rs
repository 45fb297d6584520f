//! [`ControlServer`] – JSON-lines IPC front end for a [`ControlService`].
//!
//! Listens on a Unix domain socket (default [`DEFAULT_SOCKET_PATH`]).
//!
//! * Each line from a client is one [`Request`]; each non-watch request is
//!   answered with exactly one [`Response`] line, in order.
//! * `{"op":"watch"}` turns the connection into a death watch: no reply is
//!   sent and the connection is simply held open.  When the server stops,
//!   every connection closes and watchers observe end-of-file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use smartcar_types::{CarError, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::service::{ControlService, dispatch};

/// Default path of the control socket.
pub const DEFAULT_SOCKET_PATH: &str = "/run/smartcar/control.sock";

// ---------------------------------------------------------------------------
// ControlServer
// ---------------------------------------------------------------------------

/// Serves one [`ControlService`] to every client of a Unix socket.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use smartcar_hal::{SysfsGpio, Wheels};
/// use smartcar_service::{ControlServer, LocalService};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let service = Arc::new(LocalService::new(Wheels::new(SysfsGpio::default())));
///     ControlServer::new(service)
///         .with_socket_path("/tmp/smartcar.sock")
///         .run()
///         .await
///         .expect("control server failed");
/// }
/// ```
pub struct ControlServer<S: ?Sized> {
    service: Arc<S>,
    socket_path: PathBuf,
}

impl<S: ControlService + ?Sized + 'static> ControlServer<S> {
    /// Create a server for `service` on [`DEFAULT_SOCKET_PATH`].
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }

    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the listening socket, replacing a stale socket file left by an
    /// earlier run.  Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Transport`] if the socket cannot be bound.
    pub fn bind(&self) -> Result<UnixListener, CarError> {
        let path = &self.socket_path;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CarError::Transport(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CarError::Transport(format!(
                    "cannot remove stale socket {}: {e}",
                    path.display()
                )));
            }
        }
        UnixListener::bind(path)
            .map_err(|e| CarError::Transport(format!("bind error on {}: {e}", path.display())))
    }

    /// Bind and serve until the returned future is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::Transport`] if the socket cannot be bound.
    pub async fn run(self) -> Result<(), CarError> {
        let listener = self.bind()?;
        self.serve(listener).await
    }

    /// Serve clients of an already bound `listener`.
    ///
    /// Connection tasks are owned by this future; dropping or aborting it
    /// closes every client connection, which is how death watchers learn
    /// that the service went away.
    pub async fn serve(self, listener: UnixListener) -> Result<(), CarError> {
        info!(path = %self.socket_path.display(), "control service listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let service = Arc::clone(&self.service);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, service).await {
                                warn!(error = %e, "client connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept error"),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection<S: ControlService + ?Sized>(
    stream: UnixStream,
    service: Arc<S>,
) -> Result<(), CarError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut watching = false;

    while let Some(line) = lines.next_line().await.map_err(transport)? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(line) {
            Ok(Request::Watch) => {
                if !watching {
                    debug!("death watch registered");
                    watching = true;
                }
                continue;
            }
            Ok(request) => dispatch(service.as_ref(), request),
            Err(e) => Response::failure(CarError::InvalidCommand(format!(
                "malformed request: {e}"
            ))),
        };
        let mut json = serde_json::to_string(&response)
            .map_err(|e| CarError::Transport(format!("encode error: {e}")))?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await.map_err(transport)?;
    }

    debug!(watching, "client disconnected");
    Ok(())
}

fn transport(e: std::io::Error) -> CarError {
    CarError::Transport(e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
