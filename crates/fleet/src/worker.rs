//! Worker connection state as the registry sees it.

use std::{fmt, sync::Arc, time::Instant};

use {
    async_trait::async_trait,
    howl_common::{ChatId, SessionId, UpdatePayload, WorkerId},
};

/// Errors raised by a worker transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("worker connection is closed")]
    Disconnected,

    #[error("worker send failed: {message}")]
    Send { message: String },
}

impl TransportError {
    #[must_use]
    pub fn send(message: impl Into<String>) -> Self {
        Self::Send {
            message: message.into(),
        }
    }
}

/// Bidirectional link to one worker process.
///
/// `is_connected` must be cheap and must not block: the registry calls it
/// while holding its lock.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Drop the link. The worker sees its connection end and must abandon
    /// every session it was hosting. Must not block.
    fn close(&self);

    /// Ask the worker to host a new session.
    async fn bind_session(&self, session: &SessionRef) -> Result<(), TransportError>;

    /// Hand a chat update to the session running on this worker.
    async fn forward(
        &self,
        session: &SessionRef,
        payload: &UpdatePayload,
    ) -> Result<(), TransportError>;
}

/// Lifecycle of a worker handle.
///
/// `Connecting -> Active -> (Draining) -> Removed`; `Removed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Connecting,
    Active,
    Draining,
    Removed,
}

impl WorkerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Removed => "removed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session hosted on a worker. Exactly one per chat across the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub chat_id: ChatId,
    pub session_id: SessionId,
    /// Locale the session was opened with; shutdown notices use it.
    pub locale: String,
}

impl SessionRef {
    #[must_use]
    pub fn new(chat_id: ChatId, locale: impl Into<String>) -> Self {
        Self {
            chat_id,
            session_id: SessionId::new(),
            locale: locale.into(),
        }
    }
}

/// Registry-owned record of one connected worker.
///
/// The session count is the length of `sessions`, so the two can never
/// disagree.
pub struct WorkerHandle {
    id: WorkerId,
    name: Option<String>,
    transport: Arc<dyn WorkerTransport>,
    state: WorkerState,
    draining: bool,
    sessions: Vec<SessionRef>,
    connected_seq: u64,
    connected_at: Instant,
    last_seen: Instant,
}

impl WorkerHandle {
    #[must_use]
    pub fn new(transport: Arc<dyn WorkerTransport>) -> Self {
        Self::with_id(WorkerId::new(), transport)
    }

    #[must_use]
    pub fn with_id(id: WorkerId, transport: Arc<dyn WorkerTransport>) -> Self {
        let now = Instant::now();
        Self {
            id,
            name: None,
            transport,
            state: WorkerState::Connecting,
            draining: false,
            sessions: Vec::new(),
            connected_seq: 0,
            connected_at: now,
            last_seen: now,
        }
    }

    /// Label reported by the worker in its handshake.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> &[SessionRef] {
        &self.sessions
    }

    pub fn connected_seq(&self) -> u64 {
        self.connected_seq
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn transport(&self) -> &Arc<dyn WorkerTransport> {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Can this worker take one more session under `capacity`?
    pub fn accepts_sessions(&self, capacity: usize) -> bool {
        self.state == WorkerState::Active
            && !self.draining
            && self.sessions.len() < capacity
            && self.is_connected()
    }

    // ── Registry-only mutation ──────────────────────────────────────────

    pub(crate) fn activate(&mut self, seq: u64) {
        self.connected_seq = seq;
        if self.state == WorkerState::Connecting {
            self.state = WorkerState::Active;
        }
    }

    pub(crate) fn mark_draining(&mut self) -> bool {
        if self.state != WorkerState::Active {
            return false;
        }
        self.state = WorkerState::Draining;
        self.draining = true;
        true
    }

    pub(crate) fn mark_removed(&mut self) {
        self.state = WorkerState::Removed;
        self.draining = true;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_seen = now;
    }

    pub(crate) fn push_session(&mut self, session: SessionRef) {
        self.sessions.push(session);
    }

    pub(crate) fn take_session(&mut self, chat_id: ChatId) -> Option<SessionRef> {
        let pos = self.sessions.iter().position(|s| s.chat_id == chat_id)?;
        Some(self.sessions.swap_remove(pos))
    }

    pub(crate) fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            draining: self.draining,
            connected: self.is_connected(),
            sessions: self.sessions.clone(),
            connected_seq: self.connected_seq,
            connected_at: self.connected_at,
            last_seen: self.last_seen,
            transport: Arc::clone(&self.transport),
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("draining", &self.draining)
            .field("sessions", &self.sessions.len())
            .field("connected_seq", &self.connected_seq)
            .finish_non_exhaustive()
    }
}

/// Point-in-time copy of a worker, safe to hold without any lock.
#[derive(Clone)]
pub struct WorkerSnapshot {
    pub id: WorkerId,
    pub name: Option<String>,
    pub state: WorkerState,
    pub draining: bool,
    /// Transport liveness at the moment the snapshot was taken.
    pub connected: bool,
    pub sessions: Vec<SessionRef>,
    /// Registration order; lower means connected earlier.
    pub connected_seq: u64,
    pub connected_at: Instant,
    pub last_seen: Instant,
    pub transport: Arc<dyn WorkerTransport>,
}

impl WorkerSnapshot {
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session_for(&self, chat_id: ChatId) -> Option<&SessionRef> {
        self.sessions.iter().find(|s| s.chat_id == chat_id)
    }
}

impl fmt::Debug for WorkerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSnapshot")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("draining", &self.draining)
            .field("connected", &self.connected)
            .field("sessions", &self.sessions.len())
            .field("connected_seq", &self.connected_seq)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, crate::testutil::MockTransport};

    #[test]
    fn new_handle_is_connecting_and_empty() {
        let handle = WorkerHandle::new(MockTransport::connected());
        assert_eq!(handle.state(), WorkerState::Connecting);
        assert_eq!(handle.session_count(), 0);
        assert!(!handle.accepts_sessions(10));
    }

    #[test]
    fn drain_only_from_active() {
        let mut handle = WorkerHandle::new(MockTransport::connected());
        assert!(!handle.mark_draining());
        handle.activate(1);
        assert!(handle.mark_draining());
        assert!(handle.is_draining());
        assert!(!handle.mark_draining());
        handle.mark_removed();
        assert_eq!(handle.state(), WorkerState::Removed);
    }

    #[test]
    fn take_session_by_chat() {
        let mut handle = WorkerHandle::new(MockTransport::connected());
        handle.push_session(SessionRef::new(ChatId(1), "English"));
        handle.push_session(SessionRef::new(ChatId(2), "English"));
        assert_eq!(handle.take_session(ChatId(1)).unwrap().chat_id, ChatId(1));
        assert!(handle.take_session(ChatId(1)).is_none());
        assert_eq!(handle.session_count(), 1);
    }

    #[test]
    fn disconnected_worker_rejects_sessions() {
        let transport = MockTransport::connected();
        let mut handle = WorkerHandle::new(transport.clone());
        handle.activate(1);
        assert!(handle.accepts_sessions(1));
        transport.disconnect();
        assert!(!handle.accepts_sessions(1));
    }
}
