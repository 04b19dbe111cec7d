//! `Controller` builder and the process-wide single-instance claim.
//!
//! This is the entry point for a controller application. It picks the
//! transport backend for the runtime, wires the identity store and
//! returns a [`Session`] ready to connect.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use mobcast_session::{
    FileIdentityStore, IdentityStore, MemoryIdentityStore, Session, SessionConfig,
};
use mobcast_transport::{Backend, Capabilities, TransportError, TransportKind};
use tokio::runtime::Handle;
use tracing::{info, warn};

use crate::MobcastError;

/// Set while a [`Controller`] is alive.
static ACTIVE: AtomicBool = AtomicBool::new(false);

/// Holds the single-instance claim; releases it on drop.
#[derive(Debug)]
struct LiveClaim;

impl LiveClaim {
    fn acquire() -> Result<Self, MobcastError> {
        ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self)
            .map_err(|_| MobcastError::AlreadyActive)
    }
}

impl Drop for LiveClaim {
    fn drop(&mut self) {
        ACTIVE.store(false, Ordering::Release);
    }
}

/// The session type a [`Controller`] wraps.
pub type ControllerSession = Session<Backend, Box<dyn IdentityStore>>;

/// Builder for a [`Controller`].
///
/// # Example
///
/// ```rust,ignore
/// use mobcast::prelude::*;
///
/// let mut controller = Controller::builder()
///     .config(SessionConfig::default())
///     .build()?;
/// controller.connect_str("192.168.1.20:7777")?;
/// ```
pub struct ControllerBuilder {
    config: SessionConfig,
    capabilities: Capabilities,
    kind: Option<TransportKind>,
    store: Option<Box<dyn IdentityStore>>,
}

impl ControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            capabilities: Capabilities::detect(),
            kind: None,
            store: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the detected runtime capabilities.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Forces a backend instead of picking one from the capabilities.
    pub fn transport(mut self, kind: TransportKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Where the player identity is kept. Defaults to a JSON file in the
    /// platform data directory.
    pub fn identity_store(mut self, store: impl IdentityStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Builds the controller on the current Tokio runtime.
    ///
    /// Fails with [`MobcastError::AlreadyActive`] while another controller
    /// is alive, and with a transport error outside a runtime.
    pub fn build(self) -> Result<Controller, MobcastError> {
        let claim = LiveClaim::acquire()?;
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::NoRuntime(e.to_string()))?;

        let kind = self
            .kind
            .unwrap_or_else(|| TransportKind::preferred(self.capabilities));
        let backend = Backend::for_kind(kind, runtime);

        let store = match self.store {
            Some(store) => store,
            None => default_store(),
        };

        info!(%kind, "controller ready");
        Ok(Controller {
            session: Session::new(backend, store, self.config),
            _claim: claim,
        })
    }
}

impl Default for ControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn default_store() -> Box<dyn IdentityStore> {
    match FileIdentityStore::default_location() {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, "no identity storage location, identity will not survive restarts");
            Box::new(MemoryIdentityStore::default())
        }
    }
}

/// A live controller session. At most one exists per process.
///
/// Derefs to [`Session`], so every session operation is available
/// directly on the controller.
pub struct Controller {
    session: ControllerSession,
    _claim: LiveClaim,
}

impl Controller {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Whether a controller is alive in this process.
    pub fn is_active() -> bool {
        ACTIVE.load(Ordering::Acquire)
    }
}

impl Deref for Controller {
    type Target = ControllerSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for Controller {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}
