//! In-memory transport and dispatcher doubles for tests.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    howl_common::{ChatId, UpdatePayload},
};

use crate::{
    dispatch::{Delivery, DispatchError, Dispatcher, SendOptions},
    worker::{SessionRef, TransportError, WorkerTransport},
};

/// Worker transport that records what it was asked to do.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    closed: AtomicBool,
    fail_binds: AtomicBool,
    bound: Mutex<Vec<SessionRef>>,
    forwarded: Mutex<Vec<(SessionRef, UpdatePayload)>>,
}

impl MockTransport {
    pub fn connected() -> Arc<Self> {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        Arc::new(transport)
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Whether the controller closed this link.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn fail_binds(&self, fail: bool) {
        self.fail_binds.store(fail, Ordering::SeqCst);
    }

    pub fn bound(&self) -> Vec<SessionRef> {
        self.bound.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn forwarded(&self) -> Vec<(SessionRef, UpdatePayload)> {
        self.forwarded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl WorkerTransport for MockTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.disconnect();
    }

    async fn bind_session(&self, session: &SessionRef) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        if self.fail_binds.load(Ordering::SeqCst) {
            return Err(TransportError::send("bind refused"));
        }
        self.bound
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(session.clone());
        Ok(())
    }

    async fn forward(
        &self,
        session: &SessionRef,
        payload: &UpdatePayload,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.forwarded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((session.clone(), payload.clone()));
        Ok(())
    }
}

/// Dispatcher that records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(ChatId, String)>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
    next_id: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Calls to `send`, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn send(
        &self,
        chat_id: ChatId,
        content: &str,
        _options: &SendOptions,
    ) -> Result<Delivery, DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::delivery("send refused"));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((chat_id, content.to_string()));
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32 + 1;
        Ok(Delivery {
            chat_id,
            message_id,
        })
    }
}
