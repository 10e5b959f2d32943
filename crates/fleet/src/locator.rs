//! Find which worker hosts a chat's session.

use std::sync::Arc;

use howl_common::ChatId;

use crate::{
    registry::FleetRegistry,
    worker::{SessionRef, WorkerSnapshot, WorkerState},
};

/// Read-only view over the registry for routing updates to sessions.
#[derive(Debug, Clone)]
pub struct SessionLocator {
    registry: Arc<FleetRegistry>,
}

impl SessionLocator {
    pub fn new(registry: Arc<FleetRegistry>) -> Self {
        Self { registry }
    }

    /// The worker hosting `chat_id` and the session itself.
    ///
    /// Works from one registry snapshot, so the worker and session always
    /// belong together. Workers that are being removed are never returned.
    pub fn find(&self, chat_id: ChatId) -> Option<(WorkerSnapshot, SessionRef)> {
        self.registry
            .snapshot()
            .into_iter()
            .filter(|w| w.state != WorkerState::Removed)
            .find_map(|w| {
                let session = w.session_for(chat_id)?.clone();
                Some((w, session))
            })
    }

    /// Whether `chat_id` currently has a live session.
    pub fn has_session(&self, chat_id: ChatId) -> bool {
        self.find(chat_id).is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{testutil::MockTransport, worker::WorkerHandle},
    };

    fn setup() -> (Arc<FleetRegistry>, SessionLocator) {
        let registry = Arc::new(FleetRegistry::new());
        let locator = SessionLocator::new(Arc::clone(&registry));
        (registry, locator)
    }

    #[test]
    fn finds_bound_chat() {
        let (registry, locator) = setup();
        let id = registry
            .add_worker(WorkerHandle::new(MockTransport::connected()))
            .unwrap();
        registry.reserve(60, ChatId(42), "Deutsch").unwrap();

        let (worker, session) = locator.find(ChatId(42)).unwrap();
        assert_eq!(worker.id, id);
        assert_eq!(session.chat_id, ChatId(42));
        assert_eq!(session.locale, "Deutsch");
        assert!(worker.session_for(ChatId(42)).is_some());
    }

    #[test]
    fn unknown_chat_or_empty_fleet() {
        let (registry, locator) = setup();
        assert!(locator.find(ChatId(1)).is_none());
        registry
            .add_worker(WorkerHandle::new(MockTransport::connected()))
            .unwrap();
        assert!(!locator.has_session(ChatId(1)));
    }

    #[test]
    fn hides_worker_being_removed() {
        let (registry, locator) = setup();
        let id = registry
            .add_worker(WorkerHandle::new(MockTransport::connected()))
            .unwrap();
        registry.reserve(60, ChatId(5), "English").unwrap();
        registry.begin_removal(&id).unwrap();
        assert!(locator.find(ChatId(5)).is_none());
    }

    #[test]
    fn draining_worker_still_routes() {
        let (registry, locator) = setup();
        let id = registry
            .add_worker(WorkerHandle::new(MockTransport::connected()))
            .unwrap();
        registry.reserve(60, ChatId(5), "English").unwrap();
        registry.set_draining(&id).unwrap();
        assert_eq!(locator.find(ChatId(5)).unwrap().0.id, id);
    }
}
