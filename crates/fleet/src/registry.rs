//! Fleet registry: the authoritative set of connected workers.
//!
//! All membership and session-count changes go through one `RwLock`, so a
//! read-then-write sequence such as "pick the least loaded worker, then
//! reserve a slot on it" can be done atomically. Readers get
//! [`WorkerSnapshot`] copies and never hold the lock across an await point.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{Duration, Instant},
};

use {
    howl_common::{ChatId, WorkerId},
    tracing::{debug, info, warn},
};

use crate::{
    error::{FleetError, Result},
    worker::{SessionRef, WorkerHandle, WorkerSnapshot, WorkerState},
};

/// A slot taken on a worker, not yet confirmed by the worker itself.
#[derive(Debug, Clone)]
pub(crate) struct Reservation {
    pub worker: WorkerSnapshot,
    pub session: SessionRef,
}

#[derive(Default)]
struct Members {
    workers: HashMap<WorkerId, WorkerHandle>,
    /// Chat -> owning worker. Kept in step with the session lists of workers
    /// that are not being removed.
    chats: HashMap<ChatId, WorkerId>,
    next_seq: u64,
}

impl Members {
    /// Least-loaded eligible worker; ties go to the earliest registration.
    fn best(&self, capacity: usize) -> Option<&WorkerHandle> {
        self.workers
            .values()
            .filter(|w| w.accepts_sessions(capacity))
            .min_by_key(|w| (w.session_count(), w.connected_seq()))
    }

    fn detach(&mut self, handle: &WorkerHandle) {
        for session in handle.sessions() {
            if self.chats.get(&session.chat_id) == Some(&handle.id()) {
                self.chats.remove(&session.chat_id);
            }
        }
    }

    fn remove(&mut self, worker_id: &WorkerId) -> Option<WorkerHandle> {
        let handle = self.workers.remove(worker_id)?;
        self.detach(&handle);
        Some(handle)
    }

    fn publish_gauges(&self) {
        #[cfg(feature = "metrics")]
        {
            let sessions: usize = self.workers.values().map(WorkerHandle::session_count).sum();
            howl_metrics::gauge!(howl_metrics::fleet::WORKERS_ACTIVE)
                .set(self.workers.len() as f64);
            howl_metrics::gauge!(howl_metrics::fleet::SESSIONS_ACTIVE).set(sessions as f64);
        }
    }
}

/// Thread-safe registry of worker handles.
#[derive(Default)]
pub struct FleetRegistry {
    inner: RwLock<Members>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Members> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Members> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit a new worker. It becomes `Active` and is stamped with the next
    /// registration sequence number.
    pub fn add_worker(&self, mut handle: WorkerHandle) -> Result<WorkerId> {
        let worker_id = handle.id();
        let mut members = self.write();
        if members.workers.contains_key(&worker_id) {
            warn!(%worker_id, "duplicate worker identity rejected");
            return Err(FleetError::DuplicateIdentity { worker_id });
        }
        members.next_seq += 1;
        handle.activate(members.next_seq);
        info!(
            %worker_id,
            name = handle.name().unwrap_or("-"),
            seq = members.next_seq,
            "worker registered"
        );
        members.workers.insert(worker_id, handle);
        members.publish_gauges();
        drop(members);

        #[cfg(feature = "metrics")]
        howl_metrics::counter!(howl_metrics::fleet::WORKERS_CONNECTED_TOTAL).increment(1);

        Ok(worker_id)
    }

    /// Drop a worker and its chat bindings. Unknown ids are a no-op.
    pub fn remove_worker(&self, worker_id: &WorkerId) -> Option<WorkerHandle> {
        let mut members = self.write();
        let handle = members.remove(worker_id)?;
        members.publish_gauges();
        debug!(%worker_id, sessions = handle.session_count(), "worker evicted");
        Some(handle)
    }

    /// Evict every worker whose transport reports disconnected and return the
    /// evicted handles so the caller can notify their chats.
    pub fn prune_dead(&self) -> Vec<WorkerHandle> {
        let mut members = self.write();
        let dead: Vec<WorkerId> = members
            .workers
            .values()
            .filter(|w| !w.is_connected())
            .map(WorkerHandle::id)
            .collect();
        let pruned: Vec<WorkerHandle> = dead.iter().filter_map(|id| members.remove(id)).collect();
        if !pruned.is_empty() {
            members.publish_gauges();
            info!(count = pruned.len(), "pruned disconnected workers");
        }
        pruned
    }

    /// Least-loaded worker that is active, not draining, connected and below
    /// `capacity`. Ties go to the worker that registered first.
    ///
    /// Pure query: the returned worker is not reserved.
    pub fn select_best(&self, capacity: usize) -> Option<WorkerSnapshot> {
        self.read().best(capacity).map(WorkerHandle::snapshot)
    }

    /// Copies of all workers in registration order.
    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let mut all: Vec<WorkerSnapshot> = self
            .read()
            .workers
            .values()
            .map(WorkerHandle::snapshot)
            .collect();
        all.sort_by_key(|w| w.connected_seq);
        all
    }

    pub fn get(&self, worker_id: &WorkerId) -> Option<WorkerSnapshot> {
        self.read().workers.get(worker_id).map(WorkerHandle::snapshot)
    }

    /// Worker currently owning `chat_id`, from the chat index.
    pub fn owner_of(&self, chat_id: ChatId) -> Option<WorkerId> {
        self.read().chats.get(&chat_id).copied()
    }

    pub fn len(&self) -> usize {
        self.read().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().workers.is_empty()
    }

    /// Total sessions across the fleet.
    pub fn session_total(&self) -> usize {
        self.read()
            .workers
            .values()
            .map(WorkerHandle::session_count)
            .sum()
    }

    // ── Lifecycle-only operations ───────────────────────────────────────

    /// Select a worker and take a slot on it under a single write lock, so
    /// concurrent callers can never push a worker past `capacity`.
    pub(crate) fn reserve(
        &self,
        capacity: usize,
        chat_id: ChatId,
        locale: &str,
    ) -> Result<Reservation> {
        let mut members = self.write();
        if let Some(&worker_id) = members.chats.get(&chat_id) {
            return Err(FleetError::ChatAlreadyBound { chat_id, worker_id });
        }
        let worker_id = members
            .best(capacity)
            .map(WorkerHandle::id)
            .ok_or(FleetError::NoWorkerAvailable)?;

        let session = SessionRef::new(chat_id, locale);
        let handle = members
            .workers
            .get_mut(&worker_id)
            .ok_or(FleetError::UnknownWorker { worker_id })?;
        handle.push_session(session.clone());
        let worker = handle.snapshot();
        members.chats.insert(chat_id, worker_id);
        members.publish_gauges();

        Ok(Reservation { worker, session })
    }

    /// Give back a session slot. Returns the session if it was still held.
    pub(crate) fn release(&self, worker_id: &WorkerId, chat_id: ChatId) -> Option<SessionRef> {
        let mut members = self.write();
        let session = members.workers.get_mut(worker_id)?.take_session(chat_id)?;
        if members.chats.get(&chat_id) == Some(worker_id) {
            members.chats.remove(&chat_id);
        }
        members.publish_gauges();
        Some(session)
    }

    /// Mark a worker `Removed` and return the sessions it held at that
    /// moment. Its chats are released at once, so they can start a new game
    /// while the shutdown notices are still going out. Returns `None` if the
    /// worker is unknown or already being removed, so only the first caller
    /// gets to notify.
    pub(crate) fn begin_removal(&self, worker_id: &WorkerId) -> Option<Vec<SessionRef>> {
        let mut members = self.write();
        let handle = members.workers.get_mut(worker_id)?;
        if handle.state() == WorkerState::Removed {
            return None;
        }
        handle.mark_removed();
        let sessions = handle.sessions().to_vec();
        for session in &sessions {
            if members.chats.get(&session.chat_id) == Some(worker_id) {
                members.chats.remove(&session.chat_id);
            }
        }
        Some(sessions)
    }

    /// Stop a worker from receiving new sessions. Returns whether the state
    /// changed.
    pub(crate) fn set_draining(&self, worker_id: &WorkerId) -> Result<bool> {
        let mut members = self.write();
        let handle = members
            .workers
            .get_mut(worker_id)
            .ok_or(FleetError::UnknownWorker {
                worker_id: *worker_id,
            })?;
        Ok(handle.mark_draining())
    }

    /// Record liveness for a worker. Returns `false` for unknown ids.
    pub(crate) fn touch(&self, worker_id: &WorkerId) -> bool {
        self.touch_at(worker_id, Instant::now())
    }

    pub(crate) fn touch_at(&self, worker_id: &WorkerId, now: Instant) -> bool {
        match self.write().workers.get_mut(worker_id) {
            Some(handle) => {
                handle.touch(now);
                true
            },
            None => false,
        }
    }

    /// Workers that are disconnected or silent for longer than
    /// `idle_timeout` as of `now`. Workers already being removed are skipped.
    pub(crate) fn unhealthy(&self, now: Instant, idle_timeout: Duration) -> Vec<WorkerId> {
        self.read()
            .workers
            .values()
            .filter(|w| w.state() != WorkerState::Removed)
            .filter(|w| {
                !w.is_connected() || now.saturating_duration_since(w.last_seen()) > idle_timeout
            })
            .map(WorkerHandle::id)
            .collect()
    }
}

impl std::fmt::Debug for FleetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = self.read();
        f.debug_struct("FleetRegistry")
            .field("workers", &members.workers.len())
            .field("chats", &members.chats.len())
            .finish()
    }
}
