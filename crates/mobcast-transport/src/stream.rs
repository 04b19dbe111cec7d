//! Raw TCP stream backend.
//!
//! A background task owns the read half and blocks on it, pushing every
//! read into an unbounded FIFO that the session drains once per tick.
//! Writes go straight to the write half from the caller's task and are
//! flushed before `send` returns; the mutex around the write half keeps
//! a single writer at a time.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::runtime::Handle;
use tokio::sync::{Mutex, mpsc, watch};

use crate::{
    Endpoint, READ_BUFFER_CAPACITY, ReadyState, SharedReadyState, Signalling,
    Transport, TransportError, TransportEvent, TransportKind,
};

type SharedWriter = Arc<Mutex<Option<OwnedWriteHalf>>>;

/// A [`Transport`] over a plain TCP connection.
pub struct StreamTransport {
    runtime: Handle,
    link: Option<Link>,
}

/// Handles to one live (or opening) connection.
struct Link {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    writer: SharedWriter,
    state: SharedReadyState,
    shutdown: watch::Sender<bool>,
}

impl StreamTransport {
    /// Creates a backend whose background tasks run on `runtime`.
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

impl Transport for StreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stream
    }

    fn signalling(&self) -> Signalling {
        Signalling::Push
    }

    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        self.close();

        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let writer: SharedWriter = Arc::new(Mutex::new(None));
        let state = SharedReadyState::new(ReadyState::Connecting);

        let task = ConnectionTask {
            authority: endpoint.authority(),
            events: events_tx,
            writer: Arc::clone(&writer),
            state: state.clone(),
            shutdown: shutdown_rx,
        };
        self.runtime.spawn(task.run());
        tracing::debug!(%endpoint, "opening stream connection");

        self.link = Some(Link {
            events,
            writer,
            state,
            shutdown,
        });
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotOpen)?;
        let mut guard = link.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotOpen)?;
        writer
            .write_all(frame)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    fn close(&mut self) {
        if let Some(link) = self.link.take() {
            link.state.set(ReadyState::Closed);
            // The task may already be gone; nothing to signal then.
            let _ = link.shutdown.send(true);
            tracing::debug!("stream connection closed locally");
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.link
            .as_ref()
            .map_or(ReadyState::Closed, |link| link.state.get())
    }

    fn drain(&mut self) -> Vec<TransportEvent> {
        let mut out = Vec::new();
        if let Some(link) = self.link.as_mut() {
            while let Ok(event) = link.events.try_recv() {
                out.push(event);
            }
        }
        out
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background worker for one connection: connect, then read until
/// failure or shutdown.
struct ConnectionTask {
    authority: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    writer: SharedWriter,
    state: SharedReadyState,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionTask {
    async fn run(mut self) {
        let result = tokio::select! {
            result = TcpStream::connect(&self.authority) => result,
            _ = self.shutdown.changed() => return,
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(source) => {
                tracing::warn!(
                    endpoint = %self.authority,
                    error = %source,
                    "stream connect failed"
                );
                self.state.set(ReadyState::Closed);
                let _ = self.events.send(TransportEvent::Failed(
                    TransportError::ConnectFailed {
                        endpoint: self.authority.clone(),
                        source,
                    },
                ));
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "could not set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.state.set(ReadyState::Open);
        let _ = self.events.send(TransportEvent::Opened);
        tracing::info!(endpoint = %self.authority, "stream connection open");

        self.read_loop(reader).await;

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn read_loop(&mut self, mut reader: OwnedReadHalf) {
        let mut buf = vec![0u8; READ_BUFFER_CAPACITY];
        loop {
            tokio::select! {
                result = reader.read(&mut buf) => match result {
                    Ok(0) => {
                        self.state.set(ReadyState::Closed);
                        let _ = self.events.send(TransportEvent::Closed);
                        break;
                    }
                    Ok(n) => {
                        let _ = self.events.send(TransportEvent::Data(buf[..n].to_vec()));
                    }
                    Err(e) => {
                        self.state.set(ReadyState::Closed);
                        let _ = self.events.send(TransportEvent::Failed(
                            TransportError::ReceiveFailed(e),
                        ));
                        break;
                    }
                },
                // Fires on an explicit close and when the backend is dropped.
                _ = self.shutdown.changed() => break,
            }
        }
    }
}
