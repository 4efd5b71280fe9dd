//! Mock implementations for testing
//!
//! Provides a scripted broker ([`MockConnector`] / [`MockConnection`]) and a
//! [`RecordingHandler`] so poll loops and the consumer can be exercised
//! without a socket. Every connect, write, read and close is recorded, and
//! tests can await conditions on that record instead of sleeping.

use crate::consumer::{Handler, HandlerError, MessageContext};
use crate::protocol::{CONSUME_COMMAND, NO_MESSAGE};
use crate::transport::{Connection, Connector, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// One scripted broker reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Answer the next read with this line
    Line(String),
    /// End of stream
    Disconnect,
    /// Read fails with an I/O error
    Error,
}

/// Replies for one connection, consumed one per read.
///
/// Once the script runs out every read answers `NO_MSG`.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    replies: VecDeque<Reply>,
    failing_write: Option<usize>,
}

impl SessionScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.replies.push_back(Reply::Line(line.into()));
        self
    }

    pub fn no_message(self) -> Self {
        self.line(NO_MESSAGE)
    }

    pub fn disconnect(mut self) -> Self {
        self.replies.push_back(Reply::Disconnect);
        self
    }

    pub fn error(mut self) -> Self {
        self.replies.push_back(Reply::Error);
        self
    }

    /// Fail the write with this zero-based index on the connection
    pub fn fail_write(mut self, index: usize) -> Self {
        self.failing_write = Some(index);
        self
    }
}

#[derive(Debug)]
enum ConnectOutcome {
    Session(SessionScript),
    Refuse,
}

/// Everything the mock broker observed, in order
#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Connected(usize),
    ConnectFailed,
    Wrote(usize, String),
    Read(usize, Option<String>),
    Closed(usize),
}

#[derive(Debug, Default)]
struct MockState {
    outcomes: VecDeque<ConnectOutcome>,
    refuse_when_exhausted: bool,
    next_id: usize,
    events: Vec<MockEvent>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MockState>,
    changed: watch::Sender<u64>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, MockState> {
        // A test that panicked while holding the lock has failed already
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: MockEvent) {
        self.state().events.push(event);
        self.changed.send_modify(|version| *version += 1);
    }
}

/// Scripted stand-in for a broker
#[derive(Debug, Clone)]
pub struct MockConnector {
    shared: Arc<Shared>,
    address: String,
}

impl MockConnector {
    /// Connector whose unscripted connects get an idle session
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MockState::default()),
                changed,
            }),
            address: "mock-broker:5677".to_string(),
        }
    }

    /// Connector that refuses every unscripted connect
    pub fn refusing() -> Self {
        let connector = Self::new();
        connector.shared.state().refuse_when_exhausted = true;
        connector
    }

    /// Queue the script for the next successful connect
    pub fn push_session(&self, script: SessionScript) {
        self.shared
            .state()
            .outcomes
            .push_back(ConnectOutcome::Session(script));
    }

    /// Queue a refused connect
    pub fn push_refusal(&self) {
        self.shared.state().outcomes.push_back(ConnectOutcome::Refuse);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.shared.state().events.clone()
    }

    /// Every line written on any connection, in order
    pub fn written_lines(&self) -> Vec<String> {
        collect_written(&self.shared.state().events, None)
    }

    /// Lines written on the connection with this id
    pub fn written_lines_for(&self, connection_id: usize) -> Vec<String> {
        collect_written(&self.shared.state().events, Some(connection_id))
    }

    pub fn connect_count(&self) -> usize {
        count(&self.shared.state().events, |e| matches!(e, MockEvent::Connected(_)))
    }

    pub fn connect_failures(&self) -> usize {
        count(&self.shared.state().events, |e| matches!(e, MockEvent::ConnectFailed))
    }

    pub fn poll_count(&self) -> usize {
        count(&self.shared.state().events, is_poll)
    }

    /// Wait until `predicate` holds for the recorded events
    pub async fn wait_until<P>(&self, predicate: P)
    where
        P: Fn(&[MockEvent]) -> bool,
    {
        let mut changed = self.shared.changed.subscribe();
        let shared = Arc::clone(&self.shared);
        // The sender lives in `shared`, so the channel cannot close here
        let _ = changed
            .wait_for(|_| predicate(&shared.state().events))
            .await;
    }

    pub async fn wait_for_polls(&self, polls: usize) {
        self.wait_until(|events| count(events, is_poll) >= polls)
            .await;
    }

    pub async fn wait_for_connects(&self, connects: usize) {
        self.wait_until(|events| {
            count(events, |e| matches!(e, MockEvent::Connected(_))) >= connects
        })
        .await;
    }

    pub async fn wait_for_connect_failures(&self, failures: usize) {
        self.wait_until(|events| {
            count(events, |e| matches!(e, MockEvent::ConnectFailed)) >= failures
        })
        .await;
    }

    pub async fn wait_for_written(&self, line: &str) {
        self.wait_until(|events| {
            events
                .iter()
                .any(|e| matches!(e, MockEvent::Wrote(_, written) if written == line))
        })
        .await;
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn count(events: &[MockEvent], predicate: impl Fn(&MockEvent) -> bool) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}

fn is_poll(event: &MockEvent) -> bool {
    matches!(event, MockEvent::Wrote(_, line) if line.starts_with(CONSUME_COMMAND))
}

fn collect_written(events: &[MockEvent], connection_id: Option<usize>) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            MockEvent::Wrote(id, line) if connection_id.map_or(true, |wanted| wanted == *id) => {
                Some(line.clone())
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;

    async fn connect(&self) -> Result<MockConnection, TransportError> {
        let outcome = {
            let mut state = self.shared.state();
            match state.outcomes.pop_front() {
                Some(outcome) => outcome,
                None if state.refuse_when_exhausted => ConnectOutcome::Refuse,
                None => ConnectOutcome::Session(SessionScript::new()),
            }
        };

        match outcome {
            ConnectOutcome::Refuse => {
                self.shared.record(MockEvent::ConnectFailed);
                Err(TransportError::Connect(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            }
            ConnectOutcome::Session(script) => {
                let id = {
                    let mut state = self.shared.state();
                    let id = state.next_id;
                    state.next_id += 1;
                    id
                };
                self.shared.record(MockEvent::Connected(id));
                Ok(MockConnection {
                    id,
                    script,
                    writes: 0,
                    closed: false,
                    shared: Arc::clone(&self.shared),
                })
            }
        }
    }

    fn address(&self) -> String {
        self.address.clone()
    }
}

/// One scripted connection handed out by [`MockConnector`]
#[derive(Debug)]
pub struct MockConnection {
    id: usize,
    script: SessionScript,
    writes: usize,
    closed: bool,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let index = self.writes;
        self.writes += 1;
        if self.script.failing_write == Some(index) {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "broken pipe",
            )));
        }

        self.shared
            .record(MockEvent::Wrote(self.id, line.to_string()));
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        let reply = self
            .script
            .replies
            .pop_front()
            .unwrap_or_else(|| Reply::Line(NO_MESSAGE.to_string()));

        match reply {
            Reply::Line(line) => {
                self.shared
                    .record(MockEvent::Read(self.id, Some(line.clone())));
                Ok(Some(line))
            }
            Reply::Disconnect => {
                self.shared.record(MockEvent::Read(self.id, None));
                Ok(None)
            }
            Reply::Error => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.record(MockEvent::Closed(self.id));
        }
    }
}

/// What a [`RecordingHandler`] does with each message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerBehavior {
    Succeed,
    Fail,
    Panic,
    /// Fail the first `n` calls, then succeed
    FailFirst(usize),
}

#[derive(Debug)]
struct RecordingState {
    behavior: HandlerBehavior,
    calls: Mutex<Vec<(Value, MessageContext)>>,
    changed: watch::Sender<usize>,
}

/// Handler that records every call; clones share the same record
#[derive(Debug, Clone)]
pub struct RecordingHandler {
    inner: Arc<RecordingState>,
}

impl RecordingHandler {
    pub fn new(behavior: HandlerBehavior) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(RecordingState {
                behavior,
                calls: Mutex::new(Vec::new()),
                changed,
            }),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(HandlerBehavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(HandlerBehavior::Fail)
    }

    pub fn panicking() -> Self {
        Self::new(HandlerBehavior::Panic)
    }

    pub fn failing_first(failures: usize) -> Self {
        Self::new(HandlerBehavior::FailFirst(failures))
    }

    fn calls(&self) -> MutexGuard<'_, Vec<(Value, MessageContext)>> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn messages(&self) -> Vec<Value> {
        self.calls().iter().map(|(message, _)| message.clone()).collect()
    }

    pub fn contexts(&self) -> Vec<MessageContext> {
        self.calls().iter().map(|(_, context)| context.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// Wait until the handler has been invoked at least `calls` times
    pub async fn wait_for_calls(&self, calls: usize) {
        let mut changed = self.inner.changed.subscribe();
        let _ = changed.wait_for(|count| *count >= calls).await;
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, message: Value, context: &MessageContext) -> Result<(), HandlerError> {
        let call_index = {
            let mut calls = self.calls();
            calls.push((message, context.clone()));
            calls.len() - 1
        };
        self.inner.changed.send_replace(call_index + 1);

        match self.inner.behavior {
            HandlerBehavior::Succeed => Ok(()),
            HandlerBehavior::Fail => Err(HandlerError::message("handler configured to fail")),
            HandlerBehavior::Panic => panic!("handler configured to panic"),
            HandlerBehavior::FailFirst(failures) if call_index < failures => {
                Err(HandlerError::message(format!("failure {} of {failures}", call_index + 1)))
            }
            HandlerBehavior::FailFirst(_) => Ok(()),
        }
    }
}
