//! # mobcast
//!
//! Controller-side session transport for party games where phones act
//! as controllers for a shared host screen.
//!
//! A controller connects to the host over raw TCP or a WebSocket,
//! exchanges a compact text/binary frame protocol, keeps a
//! host-assigned player identity across reconnects and restarts, and
//! recovers from dropped connections within a bounded window.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mobcast::prelude::*;
//!
//! # async fn run() -> Result<(), MobcastError> {
//! let mut controller = Controller::builder().build()?;
//! controller.subscribe(|event| println!("{event:?}"));
//! controller.connect_str("192.168.1.20:7777")?;
//!
//! let mut ticker = Ticker::new(TickConfig::default());
//! loop {
//!     let tick = ticker.wait_for_tick().await;
//!     controller.tick(tick.dt).await;
//! }
//! # }
//! ```

mod controller;
mod error;

pub use controller::{Controller, ControllerBuilder, ControllerSession};
pub use error::MobcastError;

pub use mobcast_protocol as protocol;
pub use mobcast_session as session;
pub use mobcast_tick as tick;
pub use mobcast_transport as transport;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a console `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (for example
/// `"info,mobcast_session=debug"`) is used. Fails if a global subscriber
/// is already installed.
pub fn init_logging(default_directive: &str) -> Result<(), MobcastError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;
    Ok(())
}

/// Everything a controller application usually needs.
pub mod prelude {
    pub use crate::{Controller, ControllerBuilder, MobcastError, init_logging};
    pub use mobcast_protocol::{BinaryEncoding, PlayerId, deep_link_url};
    pub use mobcast_session::{
        ConnectionState, DisconnectReason, FileIdentityStore, IdentityStore,
        MemoryIdentityStore, ReconnectConfig, ReconnectProgress, SessionConfig,
        SessionEvent, SubscriptionId,
    };
    pub use mobcast_tick::{MissedTickPolicy, Tick, TickConfig, Ticker};
    pub use mobcast_transport::{Capabilities, Endpoint, TransportKind};
}
