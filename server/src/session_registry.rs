//! Tracking of connected relay sessions
//!
//! This module holds the set of live WebSocket sessions:
//! - Session lifecycle (register on connect, unregister on close)
//! - Per-session outbound queues used by the broadcaster
//! - Snapshots for iteration during a broadcast pass
//!
//! The registry is owned by the relay event loop, so every mutation happens
//! on one logical thread in event arrival order.

use crate::error::RelayError;
use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A serialized frame, shared by every recipient of one broadcast
pub type Frame = Arc<str>;

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generates the next session ID
    pub fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One connected client
///
/// The session owns the sending half of the client's outbound queue; the
/// receiving half is drained by the connection's writer task.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier
    pub id: SessionId,
    /// Remote address, used for logging
    pub addr: SocketAddr,
    /// When the connection was registered
    pub connected_at: Instant,
    outbound: mpsc::Sender<Frame>,
}

impl Session {
    pub fn new(id: SessionId, addr: SocketAddr, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            outbound,
        }
    }

    /// Time since the session was registered
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            addr: self.addr,
            outbound: self.outbound.clone(),
        }
    }
}

/// Lightweight view of a session used while broadcasting
///
/// Holding a handle does not keep the connection alive: once the writer
/// task is gone, [`SessionHandle::deliver`] fails with
/// [`RelayError::SessionClosed`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
}

impl SessionHandle {
    /// Hands a frame to the session's writer without waiting.
    ///
    /// A full queue means the client is not keeping up; the frame is
    /// dropped for that client only.
    pub fn deliver(&self, frame: &Frame) -> Result<(), RelayError> {
        self.outbound
            .try_send(Arc::clone(frame))
            .map_err(|e| match e {
                TrySendError::Full(_) => RelayError::QueueFull(self.id),
                TrySendError::Closed(_) => RelayError::SessionClosed(self.id),
            })
    }
}

/// Set of live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Adds a session and logs where it came from
    ///
    /// Returns false if a session with the same ID was already registered,
    /// in which case the registry is left unchanged.
    pub fn register(&mut self, session: Session) -> bool {
        if self.sessions.contains_key(&session.id) {
            return false;
        }

        info!("new WebSocket connection: {} ({})", session.addr, session.id);
        self.sessions.insert(session.id, session);
        true
    }

    /// Removes a session if present
    ///
    /// Safe to call more than once for the same ID: later calls return
    /// `None` and log nothing.
    pub fn unregister(&mut self, id: &SessionId) -> Option<Session> {
        let session = self.sessions.remove(id)?;
        info!(
            "connection to {} closed ({}, open for {:.1}s)",
            session.addr,
            session.id,
            session.age().as_secs_f64()
        );
        Some(session)
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Snapshot of every live session for one broadcast pass
    pub fn all_sessions(&self) -> Vec<SessionHandle> {
        self.sessions.values().map(Session::handle).collect()
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
