//! `smartcar-service` – The Wheel Control Service
//!
//! Exposes the wheel registry to other processes and gives them a way to
//! learn when the service goes away.
//!
//! 1. **Serves** a [`ControlService`] over a Unix socket, one JSON object
//!    per line ([`ControlServer`]).  [`LocalService`] is the in-process
//!    implementation that owns the [`Wheels`][smartcar_hal::Wheels].
//!
//! 2. **Connects** to a running service with the blocking
//!    [`SocketClient`], resolved through a [`ServiceLocator`].
//!
//! 3. **Reports death**: [`RemoteService::link_to_death`] registers a
//!    [`DeathNotifier`] that posts its link id when the server stops.
//!
//! # Usage
//!
//! ```rust,no_run
//! use smartcar_service::{ControlService, ServiceLocator, SocketLocator};
//!
//! let client = SocketLocator::new("/run/smartcar/control.sock")
//!     .resolve()
//!     .expect("control service not running");
//! client.set_all(false).expect("stop failed");
//! ```

pub mod client;
pub mod death;
pub mod server;
pub mod service;

pub use client::{SocketClient, SocketLocator};
pub use death::{DeathNotifier, DeathSubscription, LinkId, RemoteService, ServiceLocator};
pub use server::{ControlServer, DEFAULT_SOCKET_PATH};
pub use service::{ControlService, LocalService, dispatch};
