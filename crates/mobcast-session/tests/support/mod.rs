//! A scripted [`Transport`] for driving sessions without sockets.
//!
//! The transport and the test share one [`Script`] behind a mutex: the
//! session owns one clone, the test keeps another to queue inbound
//! data, decide how each `open` turns out, and inspect what was written.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mobcast_session::{
    IdentityStore, MemoryIdentityStore, Session, SessionConfig, SessionEvent,
};
use mobcast_transport::{
    Endpoint, ReadyState, Signalling, Transport, TransportError,
    TransportEvent, TransportKind,
};

/// How the next `open` call turns out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Succeed,
    Fail,
    /// Stays `Connecting` until the test says otherwise.
    Pending,
}

#[derive(Debug)]
pub struct Script {
    pub outcomes: VecDeque<OpenOutcome>,
    pub fallback: OpenOutcome,
    pub opened: Vec<Endpoint>,
    pub writes: Vec<Vec<u8>>,
    pub inbound: VecDeque<TransportEvent>,
    pub closes: usize,
    pub fail_next_send: bool,
    pub state: ReadyState,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            outcomes: VecDeque::new(),
            fallback: OpenOutcome::Succeed,
            opened: Vec::new(),
            writes: Vec::new(),
            inbound: VecDeque::new(),
            closes: 0,
            fail_next_send: false,
            state: ReadyState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    kind: TransportKind,
    signalling: Signalling,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// A push-signalling stream transport.
    pub fn stream() -> Self {
        Self {
            kind: TransportKind::Stream,
            signalling: Signalling::Push,
            script: Arc::default(),
        }
    }

    /// A polled message transport.
    pub fn polled() -> Self {
        Self {
            kind: TransportKind::Message,
            signalling: Signalling::Polled,
            script: Arc::default(),
        }
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub fn queue_outcomes(&self, outcomes: &[OpenOutcome]) {
        self.script().outcomes.extend(outcomes.iter().copied());
    }

    pub fn set_fallback(&self, outcome: OpenOutcome) {
        self.script().fallback = outcome;
    }

    /// Bytes arriving from the host.
    pub fn deliver(&self, bytes: &[u8]) {
        self.script()
            .inbound
            .push_back(TransportEvent::Data(bytes.to_vec()));
    }

    /// A mid-stream read error.
    pub fn fail(&self) {
        let mut script = self.script();
        script.state = ReadyState::Closed;
        if self.signalling == Signalling::Push {
            script.inbound.push_back(TransportEvent::Failed(
                TransportError::ReceiveFailed(std::io::ErrorKind::ConnectionReset.into()),
            ));
        }
    }

    /// Sets the polled ready state directly.
    pub fn set_state(&self, state: ReadyState) {
        self.script().state = state;
    }

    /// Completes a `Pending` open.
    pub fn complete_open(&self) {
        let mut script = self.script();
        script.state = ReadyState::Open;
        if self.signalling == Signalling::Push {
            script.inbound.push_back(TransportEvent::Opened);
        }
    }

    pub fn fail_next_send(&self) {
        self.script().fail_next_send = true;
    }

    pub fn writes(&self) -> Vec<String> {
        self.script()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.script().opened.len()
    }

    pub fn close_count(&self) -> usize {
        self.script().closes
    }
}

impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn signalling(&self) -> Signalling {
        self.signalling
    }

    fn open(&mut self, endpoint: &Endpoint) -> Result<(), TransportError> {
        let push = self.signalling == Signalling::Push;
        let mut script = self.script();
        script.opened.push(endpoint.clone());
        script.inbound.clear();
        let outcome = script.outcomes.pop_front().unwrap_or(script.fallback);
        match outcome {
            OpenOutcome::Succeed => {
                script.state = ReadyState::Open;
                if push {
                    script.inbound.push_back(TransportEvent::Opened);
                }
            }
            OpenOutcome::Fail => {
                script.state = ReadyState::Closed;
                if push {
                    script.inbound.push_back(TransportEvent::Failed(
                        TransportError::ConnectFailed {
                            endpoint: endpoint.authority(),
                            source: std::io::ErrorKind::ConnectionRefused.into(),
                        },
                    ));
                }
            }
            OpenOutcome::Pending => script.state = ReadyState::Connecting,
        }
        Ok(())
    }

    async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut script = self.script();
        if std::mem::take(&mut script.fail_next_send) {
            script.state = ReadyState::Closed;
            return Err(TransportError::SendFailed(
                std::io::ErrorKind::BrokenPipe.into(),
            ));
        }
        if script.state != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        script.writes.push(frame.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        let mut script = self.script();
        script.closes += 1;
        script.state = ReadyState::Closed;
        script.inbound.clear();
    }

    fn ready_state(&self) -> ReadyState {
        self.script().state
    }

    fn drain(&mut self) -> Vec<TransportEvent> {
        self.script().inbound.drain(..).collect()
    }
}

// ---------------------------------------------------------------------------
// Session helpers
// ---------------------------------------------------------------------------

pub const TICK: Duration = Duration::from_millis(100);

pub type Recorded = Arc<Mutex<Vec<SessionEvent>>>;

/// Subscribes a recorder that keeps every delivered event.
pub fn record<S: IdentityStore>(session: &mut Session<ScriptedTransport, S>) -> Recorded {
    let seen: Recorded = Arc::default();
    let sink = Arc::clone(&seen);
    session.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    seen
}

pub fn take(recorded: &Recorded) -> Vec<SessionEvent> {
    std::mem::take(&mut *recorded.lock().unwrap())
}

pub fn session_with(
    transport: &ScriptedTransport,
    store: &MemoryIdentityStore,
    config: SessionConfig,
) -> Session<ScriptedTransport, MemoryIdentityStore> {
    Session::new(transport.clone(), store.clone(), config)
}

pub async fn run<S: IdentityStore>(session: &mut Session<ScriptedTransport, S>, ticks: usize) {
    for _ in 0..ticks {
        session.tick(TICK).await;
    }
}
