//! The controller session: one connection to the host, kept alive across
//! transport failures without losing the player's identity.
//!
//! # States
//!
//! ```text
//!                connect()            transport open
//! Disconnected ───────────→ Connecting ──────────────→ Connected
//!      ↑                        │                        │   ↑
//!      │            open failed │         transport lost │   │ attempt open
//!      │                        ▼                        ▼   │
//!      └──────── window exhausted ──────────────── Reconnecting
//! ```
//!
//! The session has no clock of its own. The consumer calls
//! [`Session::tick`] on a fixed cadence and passes the time step; retry
//! pacing, keepalive, debounce and the handshake grace all run on that
//! accumulated time.
//!
//! # Tick order
//!
//! 1. Drain the transport and handle its events in order. A failure
//!    stops the drain for this tick.
//! 2. Advance the reconnection window, if one is open.
//! 3. Announce the connection if the identity handshake timed out.
//! 4. Send a keepalive `PING` when due.
//! 5. Deliver queued events to observers.

use std::time::Duration;

use mobcast_protocol::{
    Control, DEFAULT_DEEP_LINK_PARAM, FrameDecoder, GyroReading, InboundMessage,
    Outbound, PlayerId, ProtocolError, decode_deep_link, encode,
    parse_connection_string,
};
use mobcast_transport::{
    Endpoint, ReadyState, Signalling, Transport, TransportError,
    TransportEvent, TransportKind,
};
use tracing::{debug, info, trace, warn};

use crate::reconnect::{Countdown, ReconnectController, ReconnectStep};
use crate::{
    DisconnectReason, EventDispatcher, IdentityStore, ReconnectProgress,
    SessionConfig, SessionEvent, StateDebounce, SubscriptionId,
};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// What the transport underneath is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Idle,
    Opening,
    Open,
}

/// A controller's session with the host.
///
/// Owns the transport, the frame decoder, the persisted identity and the
/// observer registry. Generic over the transport so tests can script one.
pub struct Session<T: Transport, S: IdentityStore> {
    transport: T,
    store: S,
    config: SessionConfig,
    decoder: FrameDecoder,
    dispatcher: EventDispatcher,

    state: ConnectionState,
    link: Link,
    identity: Option<PlayerId>,
    endpoint: Option<Endpoint>,

    /// Sum of every `dt` passed to `tick`.
    clock: Duration,
    last_activity: Option<Duration>,
    opened_at: Option<Duration>,
    /// Whether `Connected` has been announced for the current link.
    announced: bool,
    keepalive: Countdown,
    debounce: StateDebounce,

    recovery: Option<ReconnectController>,
    /// Set on the tick a window opens so that tick advances it by zero.
    recovery_fresh: bool,
    /// The current link was opened from inside a reconnection window.
    from_recovery: bool,
}

impl<T: Transport, S: IdentityStore> Session<T, S> {
    /// Creates a disconnected session, loading any saved identity.
    pub fn new(transport: T, store: S, config: SessionConfig) -> Self {
        let config = config.validated();
        let identity = match store.load() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "could not load saved identity, starting without one");
                None
            }
        };
        if let Some(id) = &identity {
            debug!(%id, "loaded saved identity");
        }

        let decoder =
            FrameDecoder::new(transport.kind().into(), config.binary_encoding);
        let debounce = StateDebounce::new(config.state_debounce());
        let keepalive = Countdown::new(config.keepalive_interval());

        Self {
            transport,
            store,
            config,
            decoder,
            dispatcher: EventDispatcher::new(),
            state: ConnectionState::Disconnected,
            link: Link::Idle,
            identity,
            endpoint: None,
            clock: Duration::ZERO,
            last_activity: None,
            opened_at: None,
            announced: false,
            keepalive,
            debounce,
            recovery: None,
            recovery_fresh: false,
            from_recovery: false,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn identity(&self) -> Option<&PlayerId> {
        self.identity.as_ref()
    }

    /// The endpoint of the current or most recent connection.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Session time of the most recent inbound delivery.
    pub fn last_activity(&self) -> Option<Duration> {
        self.last_activity
    }

    /// Progress of the open reconnection window, if any.
    pub fn reconnect_progress(&self) -> Option<ReconnectProgress> {
        self.recovery.as_ref().map(ReconnectController::progress)
    }

    /// Inbound frames dropped as malformed so far.
    pub fn frames_dropped(&self) -> u64 {
        self.decoder.frames_dropped()
    }

    // -----------------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------------

    pub fn subscribe(
        &mut self,
        observer: impl FnMut(&SessionEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.dispatcher.subscribe(observer)
    }

    pub fn subscribe_channel(
        &mut self,
    ) -> (SubscriptionId, tokio::sync::mpsc::UnboundedReceiver<SessionEvent>)
    {
        self.dispatcher.subscribe_channel()
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    // -----------------------------------------------------------------------
    // Connect / disconnect
    // -----------------------------------------------------------------------

    /// Connects to `host:port` over the session's transport kind.
    pub fn connect(&mut self, host: &str, port: u16) {
        let endpoint = match self.transport.kind() {
            TransportKind::Stream => Endpoint::stream(host, port),
            TransportKind::Message => {
                Endpoint::message(host, port, self.config.message_path.as_str())
            }
        };
        self.connect_to(endpoint);
    }

    /// Connects to `endpoint`. A no-op while a connection is already
    /// opening, open or being recovered.
    pub fn connect_to(&mut self, endpoint: Endpoint) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, %endpoint, "connect ignored, session already active");
            return;
        }

        let endpoint = self.fit_endpoint(endpoint);
        info!(%endpoint, "connecting");
        self.endpoint = Some(endpoint);
        self.state = ConnectionState::Connecting;
        self.from_recovery = false;
        self.open_transport();
    }

    /// Connects to the last endpoint again. Returns `false` if there
    /// never was one.
    pub fn reconnect_last(&mut self) -> bool {
        match self.endpoint.clone() {
            Some(endpoint) => {
                self.connect_to(endpoint);
                true
            }
            None => {
                debug!("no previous endpoint to reconnect to");
                false
            }
        }
    }

    /// Parses a connection string and connects to it.
    pub fn connect_str(&mut self, input: &str) -> Result<(), ProtocolError> {
        let endpoint = parse_connection_string(input, self.transport.kind())?;
        self.connect_to(endpoint);
        Ok(())
    }

    /// Extracts the connection string from a deep link and connects to it.
    pub fn connect_deep_link(&mut self, link: &str) -> Result<(), ProtocolError> {
        let connection = decode_deep_link(link, DEFAULT_DEEP_LINK_PARAM)?;
        self.connect_str(&connection)
    }

    /// Closes the connection and stops any reconnection. The identity and
    /// the last endpoint are kept. Queued events are delivered before
    /// this returns.
    pub fn disconnect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            info!("disconnecting");
            self.teardown();
            self.dispatcher
                .emit(SessionEvent::Disconnected(DisconnectReason::Requested));
        } else {
            debug!("disconnect ignored, already disconnected");
        }
        self.dispatcher.flush();
    }

    /// Forgets the identity, both in memory and in storage.
    pub fn clear_saved_identity(&mut self) {
        if let Some(id) = self.identity.take() {
            info!(%id, "clearing saved identity");
        }
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "could not clear saved identity");
        }
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    pub async fn send_string(&mut self, text: &str) {
        self.send(Outbound::String(text)).await;
    }

    pub async fn send_image(&mut self, bytes: &[u8]) {
        self.send(Outbound::Image(bytes)).await;
    }

    pub async fn send_image_to_player(&mut self, target: &PlayerId, bytes: &[u8]) {
        self.send(Outbound::ImageToPlayer { target, bytes }).await;
    }

    pub async fn send_text_to_player(&mut self, target: &PlayerId, text: &str) {
        self.send(Outbound::TextToPlayer { target, text }).await;
    }

    pub async fn forward_message(&mut self, target: &PlayerId, text: &str) {
        self.send(Outbound::Forward { target, text }).await;
    }

    pub async fn send_input_state(&mut self, state: &str) {
        self.send(Outbound::InputState(state)).await;
    }

    pub async fn send_gyro(&mut self, rotation_rate: [f32; 3], acceleration: [f32; 3]) {
        let reading = GyroReading {
            rotation_rate,
            acceleration,
        };
        self.send(Outbound::Gyro(reading)).await;
    }

    pub async fn send_mouse_position(&mut self, x: f32, y: f32) {
        self.send(Outbound::Mouse { x, y }).await;
    }

    pub async fn request_device_list(&mut self) {
        self.send(Outbound::GetDevices).await;
    }

    /// Application sends are dropped unless the session is connected.
    async fn send(&mut self, frame: Outbound<'_>) {
        if self.state != ConnectionState::Connected || self.link != Link::Open {
            debug!(tag = frame.tag(), state = ?self.state, "not connected, dropping send");
            return;
        }
        self.write(frame).await;
    }

    async fn write(&mut self, frame: Outbound<'_>) {
        let bytes = encode(&frame, self.config.binary_encoding);
        match self.transport.send(&bytes).await {
            Ok(()) => trace!(tag = frame.tag(), bytes = bytes.len(), "sent frame"),
            Err(e) => self.on_transport_failure(Some(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Tick
    // -----------------------------------------------------------------------

    /// Advances the session by `dt`.
    pub async fn tick(&mut self, dt: Duration) {
        self.clock += dt;

        self.pump().await;
        self.advance_recovery(dt);
        self.check_handshake_grace();
        self.keepalive(dt).await;

        self.dispatcher.flush();
    }

    async fn pump(&mut self) {
        for event in self.collect_events() {
            match event {
                TransportEvent::Opened => self.on_open().await,
                TransportEvent::Data(bytes) => self.on_data(&bytes).await,
                TransportEvent::Failed(e) => self.on_transport_failure(Some(e)),
                TransportEvent::Closed => self.on_transport_failure(None),
            }
            if self.link != Link::Open {
                break;
            }
        }
    }

    /// Gathers this tick's transport events. Polled backends only push
    /// data, so their open/close is synthesized from the debounced state.
    fn collect_events(&mut self) -> Vec<TransportEvent> {
        if self.transport.signalling() == Signalling::Push {
            return self.transport.drain();
        }
        if self.link == Link::Idle {
            return Vec::new();
        }

        let observed = match self.transport.ready_state() {
            ReadyState::Closing => ReadyState::Closed,
            other => other,
        };
        let change = self.debounce.observe(self.clock, observed);

        let mut events = Vec::new();
        if self.link == Link::Opening && change == Some(ReadyState::Open) {
            events.push(TransportEvent::Opened);
        }
        // Data stays in the backend until the link is accepted as open.
        if self.link == Link::Open || !events.is_empty() {
            events.extend(self.transport.drain());
        }
        if change == Some(ReadyState::Closed) {
            events.push(TransportEvent::Closed);
        }
        events
    }

    async fn on_open(&mut self) {
        if self.link != Link::Opening {
            return;
        }
        if self.recovery.take().is_some() {
            self.from_recovery = true;
        }

        self.link = Link::Open;
        self.state = ConnectionState::Connected;
        self.opened_at = Some(self.clock);
        self.announced = false;
        self.decoder.reset();
        self.keepalive.reset(self.config.keepalive_interval());
        if let Some(endpoint) = &self.endpoint {
            info!(%endpoint, recovered = self.from_recovery, "transport open");
        }

        if let Some(id) = self.identity.clone() {
            debug!(%id, "re-asserting identity");
            self.write(Outbound::Reconnect(&id)).await;
        }
    }

    async fn on_data(&mut self, bytes: &[u8]) {
        if self.link != Link::Open {
            return;
        }
        self.last_activity = Some(self.clock);
        for msg in self.decoder.push(bytes) {
            self.on_message(msg);
            if self.link != Link::Open {
                break;
            }
        }
    }

    fn on_message(&mut self, msg: InboundMessage) {
        match msg {
            InboundMessage::Control(Control::Pong) => {}
            InboundMessage::Control(Control::PlayerIdAssigned(id)) => {
                match &self.identity {
                    None => self.adopt_identity(id),
                    Some(held) if *held == id => {}
                    Some(held) => {
                        warn!(%held, offered = %id, "host assigned a new id while one is held, keeping ours");
                    }
                }
                self.announce();
            }
            InboundMessage::Control(Control::ReconnectAccepted(id)) => {
                if let Some(id) = id {
                    if self.identity.as_ref() != Some(&id) {
                        self.adopt_identity(id);
                    }
                }
                self.announce();
            }
            InboundMessage::Control(Control::ReconnectRejected) => {
                self.on_identity_rejected();
            }
            InboundMessage::String { text } => {
                self.deliver(SessionEvent::StringReceived { text });
            }
            InboundMessage::Image { sender, bytes } => {
                self.deliver(SessionEvent::ImageReceived { sender, bytes });
            }
            InboundMessage::Avatar { sender, bytes, key } => {
                self.deliver(SessionEvent::AvatarReceived { sender, bytes, key });
            }
            InboundMessage::Forwarded { sender, text } => {
                self.deliver(SessionEvent::ForwardedReceived { sender, text });
            }
        }
    }

    /// Application data implies the session is up.
    fn deliver(&mut self, event: SessionEvent) {
        self.announce();
        self.dispatcher.emit(event);
    }

    fn announce(&mut self) {
        if self.announced {
            return;
        }
        self.announced = true;
        info!(identity = ?self.identity.as_ref().map(PlayerId::as_str), "session connected");
        self.dispatcher.emit(SessionEvent::Connected);
    }

    fn adopt_identity(&mut self, id: PlayerId) {
        info!(%id, "identity assigned");
        if let Err(e) = self.store.save(&id) {
            warn!(error = %e, "could not persist identity, keeping it in memory");
        }
        self.identity = Some(id);
    }

    fn on_identity_rejected(&mut self) {
        warn!(identity = ?self.identity.as_ref().map(PlayerId::as_str), "host rejected saved identity");
        self.identity = None;
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "could not clear rejected identity");
        }
        let event = if self.from_recovery {
            SessionEvent::ReconnectionFailed
        } else {
            SessionEvent::Disconnected(DisconnectReason::IdentityRejected)
        };
        self.teardown();
        self.dispatcher.emit(event);
    }

    // -----------------------------------------------------------------------
    // Failure and recovery
    // -----------------------------------------------------------------------

    fn on_transport_failure(&mut self, error: Option<TransportError>) {
        let error = error.map(|e| e.to_string());
        self.transport.close();
        self.link = Link::Idle;
        self.opened_at = None;
        self.decoder.reset();

        let retry = self.config.reconnect.enabled();
        match self.state {
            ConnectionState::Connecting => {
                warn!(error = ?error, "connect failed");
                if retry {
                    self.enter_recovery();
                } else {
                    self.teardown();
                    self.dispatcher.emit(SessionEvent::Disconnected(
                        DisconnectReason::ConnectFailed,
                    ));
                }
            }
            ConnectionState::Connected => {
                warn!(error = ?error, "connection lost");
                if retry {
                    self.enter_recovery();
                } else {
                    self.teardown();
                    self.dispatcher.emit(SessionEvent::Disconnected(
                        DisconnectReason::TransportLost,
                    ));
                }
            }
            ConnectionState::Reconnecting => {
                let attempt = self.reconnect_progress().map(|p| p.attempt);
                debug!(error = ?error, attempt = ?attempt, "reconnect attempt failed");
            }
            ConnectionState::Disconnected => {}
        }
    }

    fn enter_recovery(&mut self) {
        let controller = ReconnectController::new(self.config.reconnect.clone());
        let progress = controller.progress();
        self.recovery = Some(controller);
        self.recovery_fresh = true;
        self.state = ConnectionState::Reconnecting;
        self.announced = false;
        info!(
            max_attempts = progress.max_attempts,
            timeout_ms = progress.timeout.as_millis() as u64,
            "reconnecting"
        );
        self.dispatcher.emit(SessionEvent::Reconnecting(progress));
    }

    fn advance_recovery(&mut self, dt: Duration) {
        let dt = if std::mem::take(&mut self.recovery_fresh) {
            Duration::ZERO
        } else {
            dt
        };
        let Some(controller) = self.recovery.as_mut() else {
            return;
        };

        match controller.advance(dt) {
            ReconnectStep::Wait => {}
            ReconnectStep::Attempt(attempt) => {
                if self.link == Link::Opening {
                    debug!(attempt, "abandoning attempt still in flight");
                    self.transport.close();
                    self.link = Link::Idle;
                }
                info!(attempt, max_attempts = self.config.reconnect.max_attempts, "reconnect attempt");
                self.open_transport();
            }
            ReconnectStep::GiveUp => {
                let progress = controller.progress();
                warn!(
                    attempts = progress.attempt,
                    elapsed_ms = progress.elapsed.as_millis() as u64,
                    "reconnection failed, giving up"
                );
                self.teardown();
                self.dispatcher.emit(SessionEvent::ReconnectionFailed);
            }
        }
    }

    fn open_transport(&mut self) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        self.decoder.reset();
        self.debounce.reset(self.clock, ReadyState::Connecting);
        self.link = Link::Opening;
        if let Err(e) = self.transport.open(&endpoint) {
            self.on_transport_failure(Some(e));
        }
    }

    fn check_handshake_grace(&mut self) {
        if self.link != Link::Open || self.announced {
            return;
        }
        let Some(opened_at) = self.opened_at else {
            return;
        };
        if self.clock.saturating_sub(opened_at) >= self.config.identity_grace() {
            debug!("no identity handshake from host, announcing anyway");
            self.announce();
        }
    }

    async fn keepalive(&mut self, dt: Duration) {
        let interval = self.config.keepalive_interval();
        if interval.is_zero()
            || self.state != ConnectionState::Connected
            || self.link != Link::Open
        {
            return;
        }
        if self.keepalive.advance(dt) {
            self.keepalive.reset(interval);
            trace!("keepalive");
            self.write(Outbound::Ping).await;
        }
    }

    /// Back to `Disconnected` with every connection-scoped counter cleared.
    fn teardown(&mut self) {
        self.transport.close();
        self.link = Link::Idle;
        self.state = ConnectionState::Disconnected;
        self.opened_at = None;
        self.announced = false;
        self.recovery = None;
        self.recovery_fresh = false;
        self.from_recovery = false;
        self.decoder.reset();
    }

    /// Endpoints always use the session's transport kind; a `ws://`
    /// string on a stream backend keeps only its host and port.
    fn fit_endpoint(&self, endpoint: Endpoint) -> Endpoint {
        let kind = self.transport.kind();
        if endpoint.kind == kind {
            return endpoint;
        }
        debug!(%endpoint, %kind, "endpoint kind differs from backend, adapting");
        match kind {
            TransportKind::Stream => Endpoint::stream(endpoint.host, endpoint.port),
            TransportKind::Message => Endpoint::message(
                endpoint.host,
                endpoint.port,
                self.config.message_path.as_str(),
            ),
        }
    }
}
