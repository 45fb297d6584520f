//! Blocking client side of the control socket.
//!
//! [`SocketClient`] implements [`ControlService`] by forwarding each call
//! as one JSON line and waiting for the matching reply.  Death watches use
//! a second connection held open by a background thread.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use smartcar_types::{CarError, Payload, Pin, Request, Response};
use tracing::{debug, info, warn};

use crate::death::{DeathNotifier, DeathSubscription, RemoteService, ServiceLocator};
use crate::service::ControlService;

struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

/// Remote [`ControlService`] reached over a Unix socket.
pub struct SocketClient {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SocketClient {
    /// Connect to the control socket at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::ServiceUnavailable`] if nothing is listening.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, CarError> {
        let path = path.as_ref().to_path_buf();
        let writer = open(&path)?;
        let reader = BufReader::new(writer.try_clone().map_err(transport)?);
        debug!(path = %path.display(), "connected to control service");
        Ok(Self {
            path,
            conn: Mutex::new(Connection { reader, writer }),
        })
    }

    fn call(&self, request: &Request) -> Result<Option<Payload>, CarError> {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());

        let mut line = serde_json::to_string(request)
            .map_err(|e| CarError::Transport(format!("encode error: {e}")))?;
        line.push('\n');
        conn.writer.write_all(line.as_bytes()).map_err(transport)?;

        let mut reply = String::new();
        if conn.reader.read_line(&mut reply).map_err(transport)? == 0 {
            return Err(CarError::ServiceUnavailable(
                "control service closed the connection".to_string(),
            ));
        }
        serde_json::from_str::<Response>(&reply)
            .map_err(|e| CarError::Transport(format!("malformed reply: {e}")))?
            .into_result()
    }
}

impl ControlService for SocketClient {
    fn list_names(&self) -> Result<Vec<String>, CarError> {
        match self.call(&Request::ListNames)? {
            Some(Payload::Names(names)) => Ok(names),
            other => Err(unexpected(other)),
        }
    }

    fn list_pins(&self) -> Result<Vec<Pin>, CarError> {
        match self.call(&Request::ListPins)? {
            Some(Payload::Pins(pins)) => Ok(pins),
            other => Err(unexpected(other)),
        }
    }

    fn list_status(&self) -> Result<Vec<bool>, CarError> {
        match self.call(&Request::ListStatus)? {
            Some(Payload::Status(status)) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    fn count(&self) -> Result<usize, CarError> {
        match self.call(&Request::Count)? {
            Some(Payload::Count(n)) => Ok(n),
            other => Err(unexpected(other)),
        }
    }

    fn set_status(&self, pin: Pin, on: bool) -> Result<(), CarError> {
        self.call(&Request::SetStatus { pin, on }).map(|_| ())
    }

    fn get_status(&self, pin: Pin) -> Result<bool, CarError> {
        match self.call(&Request::GetStatus { pin })? {
            Some(Payload::On(on)) => Ok(on),
            other => Err(unexpected(other)),
        }
    }

    fn set_all(&self, on: bool) -> Result<(), CarError> {
        self.call(&Request::SetAll { on }).map(|_| ())
    }
}

impl RemoteService for SocketClient {
    /// Opens a dedicated watch connection and parks a thread on it.  The
    /// notifier fires once the server closes that connection, unless the
    /// subscription was dropped first.
    fn link_to_death(&self, notifier: DeathNotifier) -> Result<DeathSubscription, CarError> {
        let mut watch = open(&self.path)?;
        watch
            .write_all(b"{\"op\":\"watch\"}\n")
            .map_err(transport)?;
        let control = watch.try_clone().map_err(transport)?;

        let link = notifier.link();
        let cancelled = Arc::new(AtomicBool::new(false));
        let thread_cancelled = Arc::clone(&cancelled);
        std::thread::Builder::new()
            .name(format!("smartcar-death-watch-{link}"))
            .spawn(move || {
                wait_for_eof(watch);
                if thread_cancelled.load(Ordering::SeqCst) {
                    debug!(link, "death watch released");
                } else {
                    info!(link, "control service died");
                    notifier.notify();
                }
            })
            .map_err(transport)?;

        Ok(DeathSubscription::new(link, move || {
            cancelled.store(true, Ordering::SeqCst);
            let _ = control.shutdown(Shutdown::Both);
        }))
    }
}

fn wait_for_eof(mut stream: UnixStream) {
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "death watch read failed");
                return;
            }
        }
    }
}

/// [`ServiceLocator`] that connects to a fixed socket path.
#[derive(Debug, Clone)]
pub struct SocketLocator {
    path: PathBuf,
}

impl SocketLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ServiceLocator for SocketLocator {
    type Service = SocketClient;

    fn resolve(&self) -> Result<Arc<SocketClient>, CarError> {
        SocketClient::connect(&self.path).map(Arc::new)
    }
}

fn open(path: &Path) -> Result<UnixStream, CarError> {
    UnixStream::connect(path)
        .map_err(|e| CarError::ServiceUnavailable(format!("{}: {e}", path.display())))
}

fn transport(e: std::io::Error) -> CarError {
    CarError::Transport(e.to_string())
}

fn unexpected(payload: Option<Payload>) -> CarError {
    CarError::Transport(format!("unexpected reply payload: {payload:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ControlServer;
    use crate::service::LocalService;
    use smartcar_hal::{SimGpio, Wheels};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    struct Harness {
        _dir: tempfile::TempDir,
        path: PathBuf,
        gpio: SimGpio,
        server: JoinHandle<Result<(), CarError>>,
    }

    fn start_server() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("control.sock");
        let gpio = SimGpio::new();
        let service = Arc::new(LocalService::new(Wheels::new(gpio.clone())));
        let server = ControlServer::new(service).with_socket_path(&path);
        let listener = server.bind().unwrap();
        Harness {
            _dir: dir,
            path,
            gpio,
            server: tokio::spawn(server.serve(listener)),
        }
    }

    #[test]
    fn connect_without_server_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = SocketClient::connect(dir.path().join("missing.sock"));
        assert!(matches!(result, Err(CarError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn client_drives_remote_wheels() {
        let harness = start_server();
        let path = harness.path.clone();

        let (status, on) = tokio::task::spawn_blocking(move || {
            let client = SocketLocator::new(path).resolve().unwrap();
            client.set_status(24, true).unwrap();
            (client.list_status().unwrap(), client.get_status(24).unwrap())
        })
        .await
        .unwrap();

        assert_eq!(status, vec![false, true, false, false]);
        assert!(on);
        assert_eq!(harness.gpio.level(24), Some(true));
        harness.server.abort();
    }

    #[tokio::test]
    async fn remote_errors_come_back_typed() {
        let harness = start_server();
        let path = harness.path.clone();

        let (unknown, count, names) = tokio::task::spawn_blocking(move || {
            let client = SocketClient::connect(path).unwrap();
            (
                client.set_status(3, true),
                client.count().unwrap(),
                client.list_names().unwrap(),
            )
        })
        .await
        .unwrap();

        assert_eq!(unknown, Err(CarError::UnknownPin(3)));
        assert_eq!(count, 4);
        assert_eq!(names.len(), 4);
        harness.server.abort();
    }

    #[tokio::test]
    async fn death_notice_fires_when_server_stops() {
        let harness = start_server();
        let path = harness.path.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let (client, subscription) = tokio::task::spawn_blocking(move || {
            let client = SocketClient::connect(path).unwrap();
            // A completed call proves the server is accepting.
            client.count().unwrap();
            let sub = client.link_to_death(DeathNotifier::new(9, tx)).unwrap();
            (client, sub)
        })
        .await
        .unwrap();
        assert_eq!(subscription.link(), 9);

        harness.server.abort();
        let link = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("death notice must arrive");
        assert_eq!(link, Some(9));

        let after = tokio::task::spawn_blocking(move || client.count())
            .await
            .unwrap();
        assert!(after.is_err());
        drop(subscription);
    }

    #[tokio::test]
    async fn released_subscription_stays_silent() {
        let harness = start_server();
        let path = harness.path.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || {
            let client = SocketClient::connect(path).unwrap();
            client.count().unwrap();
            let sub = client.link_to_death(DeathNotifier::new(1, tx)).unwrap();
            sub.unlink();
        })
        .await
        .unwrap();

        harness.server.abort();
        // The watch thread drops the only sender once it exits.
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watch thread must exit");
        assert_eq!(next, None);
    }
}
