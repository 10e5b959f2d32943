//! TCP listener for worker nodes.
//!
//! Each connection runs handshake → frame loop → cleanup. Outbound frames
//! go through an unbounded channel drained by a dedicated writer task, so
//! fleet operations never wait on a worker's socket.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    howl_common::{UpdatePayload, WorkerId},
    howl_fleet::{LifecycleController, RemovalReason, SessionRef, TransportError, WorkerTransport},
    howl_protocol::{
        ControlFrame, HEARTBEAT_INTERVAL_MS, MAX_FRAME_BYTES, PROTOCOL_VERSION, WorkerFrame,
    },
    tokio::{
        net::{TcpListener, TcpStream},
        sync::mpsc,
    },
    tokio_util::{
        codec::{FramedRead, FramedWrite, LinesCodec},
        sync::CancellationToken,
    },
    tracing::{debug, info, warn},
};

// ── Transport ────────────────────────────────────────────────────────────────

/// [`WorkerTransport`] backed by one worker's TCP connection.
#[derive(Debug, Clone)]
pub struct TcpWorkerTransport {
    tx: mpsc::UnboundedSender<ControlFrame>,
    connected: Arc<AtomicBool>,
    /// Fired by [`WorkerTransport::close`]; the connection task hangs up.
    closed: CancellationToken,
}

impl TcpWorkerTransport {
    fn push(&self, frame: ControlFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        self.tx
            .send(frame)
            .map_err(|_| TransportError::Disconnected)
    }
}

#[async_trait]
impl WorkerTransport for TcpWorkerTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed.cancel();
    }

    async fn bind_session(&self, session: &SessionRef) -> Result<(), TransportError> {
        self.push(ControlFrame::BindSession {
            session_id: session.session_id,
            chat_id: session.chat_id,
            locale: session.locale.clone(),
        })
    }

    async fn forward(
        &self,
        session: &SessionRef,
        payload: &UpdatePayload,
    ) -> Result<(), TransportError> {
        self.push(ControlFrame::Forward {
            session_id: session.session_id,
            chat_id: session.chat_id,
            payload: payload.clone(),
        })
    }
}

// ── Server ───────────────────────────────────────────────────────────────────

/// Why a connection's frame loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// The control plane is shutting down.
    Shutdown,
    /// The controller already removed the worker and closed its transport.
    Evicted,
    /// EOF or read error.
    Lost,
}

#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,

    #[error("connection closed before hello")]
    Closed,

    #[error("expected hello, got {0:?}")]
    Unexpected(WorkerFrame),

    #[error(transparent)]
    Frame(#[from] howl_protocol::FrameError),

    #[error(transparent)]
    Codec(#[from] tokio_util::codec::LinesCodecError),
}

pub struct WorkerServer {
    controller: Arc<LifecycleController>,
    handshake_timeout: Duration,
    heartbeat_interval: Duration,
}

impl WorkerServer {
    pub fn new(controller: Arc<LifecycleController>, handshake_timeout: Duration) -> Self {
        Self {
            controller,
            handshake_timeout,
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
        }
    }

    /// Interval announced to workers in `welcome`.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Accept worker connections until `cancel` fires.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "worker listener started");
        }
        loop {
            let (stream, peer) = tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!(error = %e, "worker accept failed");
                        continue;
                    },
                },
            };
            let server = Arc::clone(&self);
            let cancel = cancel.child_token();
            tokio::spawn(async move { server.handle_worker(stream, peer, cancel).await });
        }
        info!("worker listener stopped");
    }

    async fn handle_worker(&self, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let (read, write) = stream.into_split();
        let mut lines = FramedRead::new(read, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
        let mut sink = FramedWrite::new(write, LinesCodec::new());

        // ── Handshake ────────────────────────────────────────────────────
        let (name, version) = match self.wait_for_hello(&mut lines).await {
            Ok(hello) => hello,
            Err(e) => {
                warn!(%peer, error = %e, "worker handshake failed");
                return;
            },
        };

        let worker_id = WorkerId::new();
        let connected = Arc::new(AtomicBool::new(true));
        let closed = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<ControlFrame>();
        let transport = Arc::new(TcpWorkerTransport {
            tx: tx.clone(),
            connected: Arc::clone(&connected),
            closed: closed.clone(),
        });

        // Welcome is queued before registration so it precedes any binding.
        let _ = tx.send(ControlFrame::Welcome {
            protocol: PROTOCOL_VERSION,
            worker_id,
            heartbeat_interval_ms: self.heartbeat_interval.as_millis() as u64,
        });
        let write_connected = Arc::clone(&connected);
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let line = match frame.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(%worker_id, error = %e, "failed to encode control frame");
                        continue;
                    },
                };
                if let Err(e) = sink.send(line).await {
                    debug!(%worker_id, error = %e, "worker write loop closed");
                    break;
                }
            }
            write_connected.store(false, Ordering::SeqCst);
        });

        if let Err(e) = self.controller.connect_as(worker_id, transport, name.clone()) {
            warn!(%peer, error = %e, "worker rejected");
            drop(tx);
            writer.abort();
            return;
        }
        info!(%worker_id, %peer, name = ?name, version = ?version, "worker connected");

        // ── Frame loop ───────────────────────────────────────────────────
        let exit = loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break LoopExit::Shutdown,
                _ = closed.cancelled() => break LoopExit::Evicted,
                line = lines.next() => line,
            };
            match line {
                Some(Ok(line)) => {
                    if !self.controller.touch(worker_id) {
                        break LoopExit::Evicted;
                    }
                    self.handle_frame(worker_id, &line);
                },
                Some(Err(e)) => {
                    warn!(%worker_id, error = %e, "worker read failed");
                    break LoopExit::Lost;
                },
                None => break LoopExit::Lost,
            }
        };

        // ── Cleanup ──────────────────────────────────────────────────────
        connected.store(false, Ordering::SeqCst);
        drop(tx);
        writer.abort();
        match exit {
            LoopExit::Shutdown => {
                debug!(%worker_id, "worker connection closed by shutdown");
                return;
            },
            LoopExit::Evicted => {
                info!(%worker_id, "worker no longer registered, connection closed");
                return;
            },
            LoopExit::Lost => {},
        }
        if let Some(report) = self
            .controller
            .remove(worker_id, RemovalReason::Disconnected)
            .await
        {
            info!(
                %worker_id,
                sessions = report.sessions,
                notices_sent = report.notices_sent,
                "worker disconnected"
            );
        }
    }

    async fn wait_for_hello(
        &self,
        lines: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, LinesCodec>,
    ) -> Result<(Option<String>, Option<String>), HandshakeError> {
        let line = tokio::time::timeout(self.handshake_timeout, lines.next())
            .await
            .map_err(|_| HandshakeError::Timeout)?
            .ok_or(HandshakeError::Closed)??;
        match WorkerFrame::decode(&line)? {
            WorkerFrame::Hello { name, version, .. } => Ok((name, version)),
            other => Err(HandshakeError::Unexpected(other)),
        }
    }

    fn handle_frame(&self, worker_id: WorkerId, line: &str) {
        let frame = match WorkerFrame::decode(line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%worker_id, error = %e, "dropping malformed worker frame");
                return;
            },
        };
        match frame {
            WorkerFrame::Heartbeat => {},
            WorkerFrame::SessionEnded { chat_id } => {
                if self.controller.end_session(worker_id, chat_id).is_none() {
                    debug!(%worker_id, %chat_id, "session end for unknown chat");
                }
            },
            WorkerFrame::ShuttingDown => {
                if let Err(e) = self.controller.drain(worker_id) {
                    warn!(%worker_id, error = %e, "drain on shutdown notice failed");
                }
            },
            WorkerFrame::Hello { .. } => {
                warn!(%worker_id, "ignoring repeated hello");
            },
        }
    }
}
