//! Death notification for remote service handles.
//!
//! A client that holds a [`RemoteService`] registers a [`DeathNotifier`]
//! with [`RemoteService::link_to_death`].  When the service goes away the
//! notifier posts its [`LinkId`] on the owner's channel.  The returned
//! [`DeathSubscription`] unregisters on drop, so no notice arrives for a
//! handle the owner has already released.

use std::fmt;
use std::sync::Arc;

use smartcar_types::CarError;
use tokio::sync::mpsc;

use crate::service::ControlService;

/// Identifies one death registration.
pub type LinkId = u64;

/// Sending half of a death registration.
#[derive(Debug, Clone)]
pub struct DeathNotifier {
    link: LinkId,
    tx: mpsc::UnboundedSender<LinkId>,
}

impl DeathNotifier {
    pub fn new(link: LinkId, tx: mpsc::UnboundedSender<LinkId>) -> Self {
        Self { link, tx }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Report that the linked service died.  A closed channel is ignored:
    /// nobody is left to care.
    pub fn notify(&self) {
        let _ = self.tx.send(self.link);
    }
}

/// Active death registration.  Dropping it unregisters.
pub struct DeathSubscription {
    link: LinkId,
    unlink: Option<Box<dyn FnOnce() + Send>>,
}

impl DeathSubscription {
    /// `unlink` runs exactly once, on [`DeathSubscription::unlink`] or drop.
    pub fn new(link: LinkId, unlink: impl FnOnce() + Send + 'static) -> Self {
        Self {
            link,
            unlink: Some(Box::new(unlink)),
        }
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    pub fn unlink(mut self) {
        self.run_unlink();
    }

    fn run_unlink(&mut self) {
        if let Some(unlink) = self.unlink.take() {
            unlink();
        }
    }
}

impl Drop for DeathSubscription {
    fn drop(&mut self) {
        self.run_unlink();
    }
}

impl fmt::Debug for DeathSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathSubscription")
            .field("link", &self.link)
            .field("active", &self.unlink.is_some())
            .finish()
    }
}

/// A [`ControlService`] living in another process that can report its own
/// termination.
pub trait RemoteService: ControlService {
    /// Register `notifier` to fire once when this service dies.
    ///
    /// # Errors
    ///
    /// Returns an error when the registration cannot be made; the handle
    /// should then be considered unusable.
    fn link_to_death(&self, notifier: DeathNotifier) -> Result<DeathSubscription, CarError>;
}

/// Resolves the control service.  Injected into the connection manager
/// instead of a process-wide service registry.
pub trait ServiceLocator: Send {
    type Service: RemoteService + 'static;

    /// Attempt to obtain a live handle.
    ///
    /// # Errors
    ///
    /// Returns [`CarError::ServiceUnavailable`] while the service is absent.
    fn resolve(&self) -> Result<Arc<Self::Service>, CarError>;
}
