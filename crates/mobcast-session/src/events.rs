//! Application-facing notifications and the observer registry.
//!
//! Events are queued as the session produces them and delivered in
//! FIFO order when the session flushes, which happens at the end of
//! every tick (and immediately on `disconnect`). Observers therefore run
//! on the task that drives the session, one at a time.

use std::collections::VecDeque;
use std::fmt;

use mobcast_protocol::PlayerId;
use tokio::sync::mpsc;

use crate::ReconnectProgress;

/// Why the session ended up `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The application called `disconnect`.
    Requested,
    /// The first connection attempt failed and reconnection is disabled.
    ConnectFailed,
    /// An established connection dropped and reconnection is disabled.
    TransportLost,
    /// The host rejected the saved identity; a fresh manual connect is needed.
    IdentityRejected,
}

/// Something the application may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected(DisconnectReason),
    /// A reconnection window started. Fired once per window.
    Reconnecting(ReconnectProgress),
    /// The reconnection window ran out. The session is `Disconnected`
    /// and will not retry on its own.
    ReconnectionFailed,
    StringReceived {
        text: String,
    },
    ImageReceived {
        sender: Option<PlayerId>,
        bytes: Vec<u8>,
    },
    AvatarReceived {
        sender: PlayerId,
        bytes: Vec<u8>,
        key: String,
    },
    ForwardedReceived {
        sender: PlayerId,
        text: String,
    },
}

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&SessionEvent) + Send>;

/// Observer registry plus the pending-event queue.
#[derive(Default)]
pub struct EventDispatcher {
    observers: Vec<(SubscriptionId, Observer)>,
    queue: VecDeque<SessionEvent>,
    next_id: u64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Subscribes a channel instead of a callback. The subscription
    /// stays registered until unsubscribed, even if the receiver is
    /// dropped.
    pub fn subscribe_channel(
        &mut self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }

    /// Removes an observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Events waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn emit(&mut self, event: SessionEvent) {
        self.queue.push_back(event);
    }

    /// Delivers every queued event to every observer, oldest first.
    /// Returns how many events were delivered.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.queue.pop_front() {
            for (_, observer) in &mut self.observers {
                observer(&event);
            }
            delivered += 1;
        }
        delivered
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .field("queue", &self.queue)
            .finish()
    }
}
