//! In-process stand-ins for a remote control service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use smartcar_hal::{SimGpio, Wheels};
use smartcar_service::{
    ControlService, DeathNotifier, DeathSubscription, LocalService, RemoteService,
    ServiceLocator,
};
use smartcar_types::{CarError, Pin};

/// Remote service backed by simulated wheels.  `kill` fires the registered
/// death notice and takes the service offline for new connections.
pub(crate) struct FakeRemote {
    local: LocalService<SimGpio>,
    online: AtomicBool,
    refuse_links: AtomicBool,
    resolves: AtomicUsize,
    watcher: Arc<Mutex<Option<DeathNotifier>>>,
}

impl FakeRemote {
    pub(crate) fn new(online: bool) -> (SimGpio, Arc<Self>) {
        let gpio = SimGpio::new();
        let remote = Arc::new(Self {
            local: LocalService::new(Wheels::new(gpio.clone())),
            online: AtomicBool::new(online),
            refuse_links: AtomicBool::new(false),
            resolves: AtomicUsize::new(0),
            watcher: Arc::new(Mutex::new(None)),
        });
        (gpio, remote)
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn refuse_links(&self, refuse: bool) {
        self.refuse_links.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub(crate) fn is_watched(&self) -> bool {
        self.watcher.lock().unwrap().is_some()
    }

    pub(crate) fn kill(&self) {
        self.set_online(false);
        if let Some(notifier) = self.watcher.lock().unwrap().take() {
            notifier.notify();
        }
    }
}

impl ControlService for FakeRemote {
    fn list_names(&self) -> Result<Vec<String>, CarError> {
        self.local.list_names()
    }

    fn list_pins(&self) -> Result<Vec<Pin>, CarError> {
        self.local.list_pins()
    }

    fn list_status(&self) -> Result<Vec<bool>, CarError> {
        self.local.list_status()
    }

    fn count(&self) -> Result<usize, CarError> {
        self.local.count()
    }

    fn set_status(&self, pin: Pin, on: bool) -> Result<(), CarError> {
        self.local.set_status(pin, on)
    }

    fn get_status(&self, pin: Pin) -> Result<bool, CarError> {
        self.local.get_status(pin)
    }

    fn set_all(&self, on: bool) -> Result<(), CarError> {
        self.local.set_all(on)
    }
}

impl RemoteService for FakeRemote {
    fn link_to_death(&self, notifier: DeathNotifier) -> Result<DeathSubscription, CarError> {
        if self.refuse_links.load(Ordering::SeqCst) {
            return Err(CarError::Transport("link refused".to_string()));
        }
        let link = notifier.link();
        *self.watcher.lock().unwrap() = Some(notifier);
        let watcher = Arc::clone(&self.watcher);
        Ok(DeathSubscription::new(link, move || {
            let mut slot = watcher.lock().unwrap();
            if slot.as_ref().map(DeathNotifier::link) == Some(link) {
                *slot = None;
            }
        }))
    }
}

pub(crate) struct FakeLocator {
    remote: Arc<FakeRemote>,
}

impl FakeLocator {
    pub(crate) fn new(remote: &Arc<FakeRemote>) -> Self {
        Self {
            remote: Arc::clone(remote),
        }
    }
}

impl ServiceLocator for FakeLocator {
    type Service = FakeRemote;

    fn resolve(&self) -> Result<Arc<FakeRemote>, CarError> {
        self.remote.resolves.fetch_add(1, Ordering::SeqCst);
        if self.remote.online.load(Ordering::SeqCst) {
            Ok(Arc::clone(&self.remote))
        } else {
            Err(CarError::ServiceUnavailable("fake service offline".to_string()))
        }
    }
}
