use howl_common::{ChatId, WorkerId};

use crate::worker::TransportError;

/// Crate-wide result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

/// Typed fleet errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// A worker with this identity is already registered. Identities are
    /// minted per connection, so this means the transport layer is broken.
    #[error("worker {worker_id} is already registered")]
    DuplicateIdentity { worker_id: WorkerId },

    /// Every worker is draining or at capacity (or the fleet is empty).
    #[error("no worker available")]
    NoWorkerAvailable,

    /// The chat already has a running session.
    #[error("chat {chat_id} already has a session on worker {worker_id}")]
    ChatAlreadyBound { chat_id: ChatId, worker_id: WorkerId },

    #[error("unknown worker {worker_id}")]
    UnknownWorker { worker_id: WorkerId },

    /// The chosen worker could not accept the session; the reservation was
    /// rolled back.
    #[error("failed to bind session on worker {worker_id}: {source}")]
    BindFailed {
        worker_id: WorkerId,
        #[source]
        source: TransportError,
    },
}

impl FleetError {
    /// Whether the caller should treat this as backpressure (queue or reject)
    /// rather than a fault.
    #[must_use]
    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::NoWorkerAvailable)
    }
}
