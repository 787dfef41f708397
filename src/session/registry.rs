//! Bridged session table.
//!
//! # Responsibilities
//! - Allocate session ids
//! - Track session state (Connecting → Open → Closing → Closed)
//! - Record which relay directions have finished
//! - Drop a session once both sides have closed
//! - Cancel every live session on shutdown
//!
//! # Design Decisions
//! - Each pump holds an `Arc<SessionRecord>`; the sinks themselves are
//!   owned by the pumps, never by the record
//! - State lives in atomics so pumps never take a lock

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;

use crate::session::frame::{CloseInfo, CLOSE_GOING_AWAY};

/// Global atomic counter for session IDs.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a bridged session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ws-{}", self.0)
    }
}

/// Lifecycle of a bridged session.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(val: u8) -> Self {
        match val {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// One side of a session, named after the peer it reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reads the client, writes the backend.
    Inbound,
    /// Reads the backend, writes the client.
    Outbound,
}

impl Side {
    fn bit(self) -> u8 {
        match self {
            Side::Inbound => 0b01,
            Side::Outbound => 0b10,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Inbound => "client_to_backend",
            Side::Outbound => "backend_to_client",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("session {id} cannot open from state {state:?}")]
    InvalidTransition { id: SessionId, state: SessionState },
}

/// Shared record of one bridged session.
#[derive(Debug)]
pub struct SessionRecord {
    id: SessionId,
    target: String,
    state: AtomicU8,
    closed_sides: AtomicU8,
    started: Instant,
    /// Milliseconds since `started` of the last relayed frame.
    last_activity_ms: AtomicU64,
    cancel: watch::Sender<Option<CloseInfo>>,
}

impl SessionRecord {
    fn new(target: String) -> Self {
        let (cancel, _) = watch::channel(None);
        Self {
            id: SessionId::new(),
            target,
            state: AtomicU8::new(SessionState::Connecting as u8),
            closed_sides: AtomicU8::new(0),
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            cancel,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Backend WebSocket URL this session is bridged to.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    /// Connecting → Open. Succeeds exactly once.
    pub fn mark_open(&self) -> Result<(), SessionError> {
        self.state
            .compare_exchange(
                SessionState::Connecting as u8,
                SessionState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|actual| SessionError::InvalidTransition {
                id: self.id,
                state: SessionState::from(actual),
            })
    }

    /// Record that one relay direction finished. Returns true once both
    /// directions have finished and the session is closed.
    pub fn close_side(&self, side: Side) -> bool {
        let _ = self.state.compare_exchange(
            SessionState::Open as u8,
            SessionState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let closed = self.closed_sides.fetch_or(side.bit(), Ordering::SeqCst) | side.bit();
        if closed == Side::Inbound.bit() | Side::Outbound.bit() {
            self.state
                .store(SessionState::Closed as u8, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Whether `side` has already finished relaying.
    pub fn is_side_closed(&self, side: Side) -> bool {
        self.closed_sides.load(Ordering::SeqCst) & side.bit() != 0
    }

    /// Note that a frame was relayed.
    pub fn touch(&self) {
        let elapsed = self.started.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Time since the last relayed frame (or since the session started).
    pub fn idle_for(&self) -> std::time::Duration {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        let now = self.started.elapsed().as_millis() as u64;
        std::time::Duration::from_millis(now.saturating_sub(last))
    }

    /// Receiver that holds the close to send once the session is cancelled.
    pub fn cancelled(&self) -> watch::Receiver<Option<CloseInfo>> {
        self.cancel.subscribe()
    }

    /// Ask the pumps to close their legs with `close`. The first
    /// cancellation wins.
    pub fn cancel(&self, close: CloseInfo) {
        self.cancel.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(close);
            true
        });
    }
}

/// Table of live bridged sessions.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<SessionId, Arc<SessionRecord>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session in the Connecting state.
    pub fn open_session(&self, target: impl Into<String>) -> Arc<SessionRecord> {
        let record = Arc::new(SessionRecord::new(target.into()));
        self.sessions.insert(record.id(), Arc::clone(&record));
        tracing::trace!(session_id = %record.id(), "Session registered");
        record
    }

    /// Abort a session that never reached Open.
    pub fn abort(&self, id: SessionId) {
        if let Some((_, record)) = self.sessions.remove(&id) {
            record
                .state
                .store(SessionState::Closed as u8, Ordering::SeqCst);
            record.cancel(CloseInfo::new(CLOSE_GOING_AWAY, "session aborted"));
        }
    }

    /// Mark `side` of a session closed; removes the session when both are.
    pub fn close_side(&self, record: &SessionRecord, side: Side) -> bool {
        let closed = record.close_side(side);
        if closed {
            self.sessions.remove(&record.id());
            tracing::trace!(session_id = %record.id(), "Session removed");
        }
        closed
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<SessionRecord>> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel every live session. Used on shutdown.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for entry in self.sessions.iter() {
            entry
                .value()
                .cancel(CloseInfo::new(CLOSE_GOING_AWAY, "proxy shutting down"));
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn opens_exactly_once() {
        let registry = ConnectionRegistry::new();
        let session = registry.open_session("ws://127.0.0.1:1/");
        assert_eq!(session.state(), SessionState::Connecting);

        session.mark_open().unwrap();
        assert_eq!(session.state(), SessionState::Open);

        let err = session.mark_open().unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                id: session.id(),
                state: SessionState::Open
            }
        );
    }

    #[test]
    fn closes_after_both_sides() {
        let registry = ConnectionRegistry::new();
        let session = registry.open_session("ws://127.0.0.1:1/");
        session.mark_open().unwrap();
        assert_eq!(registry.len(), 1);

        assert!(!registry.close_side(&session, Side::Inbound));
        assert_eq!(session.state(), SessionState::Closing);
        assert!(session.is_side_closed(Side::Inbound));
        assert_eq!(registry.len(), 1);

        // Reporting the same side twice is harmless
        assert!(!registry.close_side(&session, Side::Inbound));

        assert!(registry.close_side(&session, Side::Outbound));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(registry.is_empty());
    }

    #[test]
    fn aborted_session_never_opens() {
        let registry = ConnectionRegistry::new();
        let session = registry.open_session("ws://127.0.0.1:1/");
        registry.abort(session.id());

        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.mark_open().is_err());
        assert!(registry.get(session.id()).is_none());
        assert!(session.cancelled().borrow().is_some());
    }

    #[test]
    fn cancel_all_signals_every_session() {
        let registry = ConnectionRegistry::new();
        let a = registry.open_session("ws://a/");
        let b = registry.open_session("ws://b/");
        let rx_a = a.cancelled();
        let rx_b = b.cancelled();

        assert_eq!(registry.cancel_all(), 2);
        assert_eq!(rx_a.borrow().as_ref().map(|c| c.code), Some(CLOSE_GOING_AWAY));
        assert!(rx_b.borrow().is_some());
    }

    #[test]
    fn first_cancellation_wins() {
        let registry = ConnectionRegistry::new();
        let session = registry.open_session("ws://a/");
        session.cancel(CloseInfo::new(1009, "message too big"));
        session.cancel(CloseInfo::new(1001, "proxy shutting down"));
        assert_eq!(
            *session.cancelled().borrow(),
            Some(CloseInfo::new(1009, "message too big"))
        );
    }
}
