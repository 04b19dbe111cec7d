//! WebSocket message backend using `tokio-tungstenite`.
//!
//! This backend has no push lifecycle: the session polls
//! [`Transport::ready_state`] every tick and drains inbound messages
//! with a per-tick byte budget of [`READ_BUFFER_CAPACITY`].

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{
    Endpoint, READ_BUFFER_CAPACITY, ReadyState, SharedReadyState, Signalling,
    Transport, TransportError, TransportEvent, TransportKind,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<Option<SplitSink<WsStream, Message>>>>;

/// A [`Transport`] over a WebSocket connection.
pub struct MessageTransport {
    runtime: Handle,
    link: Option<Link>,
}

struct Link {
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    /// A message that did not fit in the previous tick's budget.
    held: Option<Vec<u8>>,
    sink: SharedSink,
    state: SharedReadyState,
    shutdown: watch::Sender<bool>,
}

impl MessageTransport {
    /// Creates a backend whose socket task runs on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            link: None,
        }
    }

    /// Creates a backend on the Tokio runtime the caller is running in.
    pub fn from_current() -> Result<Self, TransportError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| TransportError::NoRuntime(e.to_string()))
    }
}

impl Transport for MessageTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Message
    }

    fn signalling(&self) -> Signalling {
        Signalling::Polled
    }

    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.close();

        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let sink: SharedSink = Arc::new(Mutex::new(None));
        let state = SharedReadyState::new(ReadyState::Connecting);

        let task = SocketTask {
            url: endpoint.url(),
            inbound: inbound_tx,
            sink: Arc::clone(&sink),
            state: state.clone(),
            shutdown: shutdown_rx,
        };
        self.runtime.spawn(task.run());
        tracing::debug!(%endpoint, "opening message socket");

        self.link = Some(Link {
            inbound,
            held: None,
            sink,
            state,
            shutdown,
        });
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotOpen)?;
        let msg = match std::str::from_utf8(frame) {
            Ok(text) => Message::Text(text.to_owned().into()),
            Err(_) => Message::Binary(frame.to_vec().into()),
        };
        let mut guard = link.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotOpen)?;
        sink.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.state.set(ReadyState::Closed);
            let _ = link.shutdown.send(true);
            tracing::debug!("message socket closed locally");
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.link
            .as_ref()
            .map_or(ReadyState::Closed, |link| link.state.get())
    }

    fn drain(&mut self) -> Vec<TransportEvent> {
        let Some(link) = self.link.as_mut() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let mut budget = READ_BUFFER_CAPACITY;
        loop {
            let next = match link.held.take() {
                Some(data) => data,
                None => match link.inbound.try_recv() {
                    Ok(data) => data,
                    Err(_) => break,
                },
            };
            // Always hand over at least one message, however large.
            if next.len() > budget && !out.is_empty() {
                link.held = Some(next);
                break;
            }
            budget = budget.saturating_sub(next.len());
            out.push(TransportEvent::Data(next));
        }
        out
    }
}

impl Drop for MessageTransport {
    fn drop(&mut self) {
        self.close();
    }
}

struct SocketTask {
    url: String,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    sink: SharedSink,
    state: SharedReadyState,
    shutdown: watch::Receiver<bool>,
}

impl SocketTask {
    async fn run(mut self) {
        let result = tokio::select! {
            result = tokio_tungstenite::connect_async(self.url.as_str()) => result,
            _ = self.shutdown.changed() => return,
        };

        let ws = match result {
            Ok((ws, _response)) => ws,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "message socket connect failed");
                self.state.set(ReadyState::Closed);
                return;
            }
        };

        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);
        self.state.set(ReadyState::Open);
        tracing::info!(url = %self.url, "message socket open");

        loop {
            tokio::select! {
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = self.inbound.send(text.as_bytes().to_vec());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let _ = self.inbound.send(data.into());
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(url = %self.url, "message socket closed by remote");
                        break;
                    }
                    Some(Ok(_)) => continue, // ping/pong/raw frame
                    Some(Err(e)) => {
                        tracing::warn!(url = %self.url, error = %e, "message socket read failed");
                        break;
                    }
                },
                _ = self.shutdown.changed() => break,
            }
        }

        self.state.set(ReadyState::Closing);
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.state.set(ReadyState::Closed);
    }
}
