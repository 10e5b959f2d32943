//! Worker lifecycle: admission, draining, removal with shutdown notices, and
//! session placement.

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    howl_common::{ChatId, Localizer, WorkerId},
    tracing::{debug, info, warn},
};

use crate::{
    dispatch::{Dispatcher, SendOptions},
    error::{FleetError, Result},
    registry::FleetRegistry,
    worker::{SessionRef, WorkerHandle, WorkerTransport},
};

/// String key for the notice sent to chats on a worker that goes away.
pub const NODE_SHUTS_DOWN: &str = "NodeShutsDown";

/// Placement and removal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetPolicy {
    pub max_sessions_per_worker: usize,
    /// Chats are notified only when the removed worker held more sessions
    /// than this.
    pub shutdown_notify_threshold: usize,
    /// Workers silent for longer than this are removed by [`LifecycleController::sweep`].
    pub idle_timeout: Duration,
}

impl Default for FleetPolicy {
    fn default() -> Self {
        Self {
            max_sessions_per_worker: 60,
            shutdown_notify_threshold: 2,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Why a worker left the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The transport closed or the worker announced shutdown.
    Disconnected,
    HealthCheckFailed,
    /// An operator asked for it.
    Operator,
}

impl RemovalReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::HealthCheckFailed => "health_check_failed",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of removing one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    pub worker_id: WorkerId,
    pub reason: RemovalReason,
    /// Sessions the worker held when removal started.
    pub sessions: usize,
    pub notices_sent: usize,
    pub notices_failed: usize,
}

/// A session placed on a worker and confirmed by it.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub worker_id: WorkerId,
    pub session: SessionRef,
}

/// Drives worker state transitions against the registry.
pub struct LifecycleController {
    registry: Arc<FleetRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    localizer: Arc<dyn Localizer>,
    policy: FleetPolicy,
}

impl LifecycleController {
    pub fn new(
        registry: Arc<FleetRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
        localizer: Arc<dyn Localizer>,
        policy: FleetPolicy,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            localizer,
            policy,
        }
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> FleetPolicy {
        self.policy
    }

    /// Register a freshly handshaken worker. It is eligible for sessions as
    /// soon as this returns.
    pub fn connect(
        &self,
        transport: Arc<dyn WorkerTransport>,
        name: Option<String>,
    ) -> Result<WorkerId> {
        self.connect_as(WorkerId::new(), transport, name)
    }

    /// Like [`connect`](Self::connect) with an identity issued by the caller,
    /// so it can be announced to the worker before any session is bound.
    pub fn connect_as(
        &self,
        worker_id: WorkerId,
        transport: Arc<dyn WorkerTransport>,
        name: Option<String>,
    ) -> Result<WorkerId> {
        let mut handle = WorkerHandle::with_id(worker_id, transport);
        if let Some(name) = name {
            handle = handle.named(name);
        }
        self.registry.add_worker(handle)
    }

    /// Stop placing new sessions on a worker; existing ones keep running.
    pub fn drain(&self, worker_id: WorkerId) -> Result<bool> {
        let changed = self.registry.set_draining(&worker_id)?;
        if changed {
            info!(%worker_id, "worker draining");
        }
        Ok(changed)
    }

    /// Record that a worker is alive.
    pub fn touch(&self, worker_id: WorkerId) -> bool {
        self.registry.touch(&worker_id)
    }

    /// Remove a worker, telling its chats first when it held more sessions
    /// than the notify threshold.
    ///
    /// The worker is marked removed before any notice goes out, so it takes
    /// no new sessions and the locator stops returning it. Notices are
    /// best-effort. After eviction the transport is closed, so the worker
    /// cannot keep hosting sessions the fleet no longer tracks. Returns
    /// `None` when the worker is unknown or another caller is already
    /// removing it.
    pub async fn remove(&self, worker_id: WorkerId, reason: RemovalReason) -> Option<RemovalReport> {
        let sessions = self.registry.begin_removal(&worker_id)?;
        let (notices_sent, notices_failed) = self.notify_shutdown(worker_id, &sessions).await;
        if let Some(handle) = self.registry.remove_worker(&worker_id) {
            handle.transport().close();
        }

        info!(
            %worker_id,
            %reason,
            sessions = sessions.len(),
            notices_sent,
            notices_failed,
            "worker removed"
        );

        #[cfg(feature = "metrics")]
        howl_metrics::counter!(
            howl_metrics::fleet::WORKERS_REMOVED_TOTAL,
            howl_metrics::labels::REASON => reason.as_str()
        )
        .increment(1);

        Some(RemovalReport {
            worker_id,
            reason,
            sessions: sessions.len(),
            notices_sent,
            notices_failed,
        })
    }

    async fn notify_shutdown(&self, worker_id: WorkerId, sessions: &[SessionRef]) -> (usize, usize) {
        if sessions.len() <= self.policy.shutdown_notify_threshold {
            debug!(
                %worker_id,
                sessions = sessions.len(),
                "below notify threshold, skipping shutdown notices"
            );
            return (0, 0);
        }

        let options = SendOptions::default();
        let mut sent = 0;
        let mut failed = 0;
        for session in sessions {
            let text = self.localizer.resolve(NODE_SHUTS_DOWN, &session.locale);
            match self.dispatcher.send(session.chat_id, &text, &options).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!(%worker_id, chat_id = %session.chat_id, error = %e, "shutdown notice failed");
                    #[cfg(feature = "metrics")]
                    howl_metrics::counter!(howl_metrics::fleet::SHUTDOWN_NOTICE_FAILURES_TOTAL)
                        .increment(1);
                },
            }
        }
        (sent, failed)
    }

    /// Remove every worker that is disconnected or has been silent for longer
    /// than the idle timeout.
    pub async fn sweep(&self) -> Vec<RemovalReport> {
        let stale = self
            .registry
            .unhealthy(Instant::now(), self.policy.idle_timeout);
        let mut reports = Vec::with_capacity(stale.len());
        for worker_id in stale {
            let reason = match self.registry.get(&worker_id) {
                Some(w) if !w.connected => RemovalReason::Disconnected,
                _ => RemovalReason::HealthCheckFailed,
            };
            if let Some(report) = self.remove(worker_id, reason).await {
                reports.push(report);
            }
        }
        reports
    }

    /// Place a new session for `chat_id` on the least-loaded eligible worker.
    ///
    /// Dead workers are swept first. The slot is reserved atomically, then
    /// the worker is asked to bind the session; if that fails the slot is
    /// given back.
    pub async fn assign_session(&self, chat_id: ChatId, locale: &str) -> Result<Assignment> {
        self.sweep().await;

        let reservation = match self.registry.reserve(
            self.policy.max_sessions_per_worker,
            chat_id,
            locale,
        ) {
            Ok(r) => r,
            Err(e) => {
                if e.is_backpressure() {
                    debug!(%chat_id, "no worker available");
                    #[cfg(feature = "metrics")]
                    howl_metrics::counter!(howl_metrics::fleet::NO_WORKER_AVAILABLE_TOTAL)
                        .increment(1);
                }
                return Err(e);
            },
        };

        let worker_id = reservation.worker.id;
        let started = Instant::now();
        let bound = reservation
            .worker
            .transport
            .bind_session(&reservation.session)
            .await;

        #[cfg(feature = "metrics")]
        howl_metrics::histogram!(howl_metrics::fleet::BIND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        if let Err(source) = bound {
            warn!(%worker_id, %chat_id, error = %source, "session bind failed, rolling back");
            self.registry.release(&worker_id, chat_id);
            return Err(FleetError::BindFailed { worker_id, source });
        }

        info!(
            %worker_id,
            %chat_id,
            session_id = %reservation.session.session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session assigned"
        );

        #[cfg(feature = "metrics")]
        howl_metrics::counter!(howl_metrics::fleet::SESSIONS_ASSIGNED_TOTAL).increment(1);

        Ok(Assignment {
            worker_id,
            session: reservation.session,
        })
    }

    /// Release a finished session's slot. Unknown pairs are ignored.
    pub fn end_session(&self, worker_id: WorkerId, chat_id: ChatId) -> Option<SessionRef> {
        let session = self.registry.release(&worker_id, chat_id);
        if session.is_some() {
            debug!(%worker_id, %chat_id, "session ended");
        }
        session
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
