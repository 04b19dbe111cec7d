//! Controller session management for mobcast.
//!
//! This crate owns everything between raw transport events and the
//! application:
//!
//! 1. **Lifecycle**: connect, detect failures, reconnect within a bounded
//!    window ([`Session`], [`ReconnectController`]).
//! 2. **Identity**: keep the host-issued token across reconnects and
//!    restarts ([`IdentityStore`]).
//! 3. **Dispatch**: deliver decoded messages and lifecycle changes to
//!    observers in arrival order ([`EventDispatcher`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← subscribes to SessionEvents, calls send_*
//!     ↕
//! Session Layer (this crate)  ← lifecycle, identity, reconnection
//!     ↕
//! Protocol / Transport (below)  ← frames, sockets
//! ```

mod config;
mod debounce;
mod error;
mod events;
mod identity;
mod reconnect;
mod session;

pub use config::{ReconnectConfig, SessionConfig};
pub use debounce::StateDebounce;
pub use error::SessionError;
pub use events::{DisconnectReason, EventDispatcher, SessionEvent, SubscriptionId};
pub use identity::{
    FileIdentityStore, IDENTITY_KEY, IdentityStore, MemoryIdentityStore,
};
pub use reconnect::{
    Countdown, ReconnectController, ReconnectProgress, ReconnectStep,
};
pub use session::{ConnectionState, Session};
