//! `smartcar-runtime` – The Client-Side Control Loop
//!
//! Drives the car through a remote [`ControlService`][smartcar_service::ControlService]
//! and survives that service coming and going.
//!
//! # Modules
//!
//! - [`action`] – [`Action`][action::Action]: a motion pattern
//!   ([`ActionKind`][action::ActionKind]) re-asserted every interval until
//!   stopped.  Dropping an action turns every wheel off.
//! - [`connection`] – [`ServiceConnectionManager`][connection::ServiceConnectionManager]:
//!   resolves the service through an injected
//!   [`ServiceLocator`][smartcar_service::ServiceLocator], retries at a fixed
//!   interval, reconnects after a death notice and owns the action slot.
//! - [`command`] – the bounded cross-thread command queue
//!   ([`CommandSender`][command::CommandSender]) with one-shot replies.
//! - [`event_loop`] – [`CarLoop`][event_loop::CarLoop]: the single
//!   `tokio::select!` loop tying the above together.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: `tracing`
//!   subscriber with an optional OTLP span exporter.

pub mod action;
pub mod command;
pub mod connection;
pub mod event_loop;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{Action, ActionKind};
pub use command::{CommandReply, CommandSender, Outcome, Reply, command_queue, parse_command};
pub use connection::{DEFAULT_RETRY_INTERVAL, ServiceConnectionManager};
pub use event_loop::{CarLoop, DEFAULT_COMMAND_CAPACITY, LoopConfig};
pub use telemetry::{TracerProviderGuard, init_tracing};
