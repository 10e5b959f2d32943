//! Control-plane ↔ worker wire protocol.
//!
//! Protocol version 1. Frames are newline-delimited JSON objects over a
//! persistent TCP connection, discriminated by a `type` field.
//!
//! Frame types:
//! - `WorkerFrame`  — worker → control plane (hello, heartbeat, session end, shutdown notice)
//! - `ControlFrame` — control plane → worker (welcome, session binding, forwarded updates)

use serde::{Deserialize, Serialize};

use howl_common::{ChatId, SessionId, UpdatePayload, WorkerId};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_FRAME_BYTES: usize = 65_536; // 64 KB
/// Default time a new connection has to send `hello`.
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // 10s
/// Default interval workers are told to send heartbeats at.
pub const HEARTBEAT_INTERVAL_MS: u64 = 15_000; // 15s

// ── Worker → control plane ───────────────────────────────────────────────────

/// Frames sent by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerFrame {
    /// First frame on every connection.
    Hello {
        protocol: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<String>,
    },
    /// Liveness signal; any frame counts, this one carries nothing else.
    Heartbeat,
    /// A game finished and its chat is free again.
    SessionEnded { chat_id: ChatId },
    /// The worker is about to exit; stop assigning new sessions to it.
    ShuttingDown,
}

// ── Control plane → worker ───────────────────────────────────────────────────

/// Frames sent to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Handshake reply carrying the identity issued for this connection and
    /// how often the worker must show signs of life.
    Welcome {
        protocol: u32,
        worker_id: WorkerId,
        heartbeat_interval_ms: u64,
    },
    /// Start hosting a new session for `chat_id`.
    BindSession {
        session_id: SessionId,
        chat_id: ChatId,
        locale: String,
    },
    /// A chat update for a session this worker owns.
    Forward {
        session_id: SessionId,
        chat_id: ChatId,
        payload: UpdatePayload,
    },
}

/// Errors decoding or validating a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    TooLarge,

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WorkerFrame {
    /// Decode one line received from a worker.
    pub fn decode(line: &str) -> Result<Self, FrameError> {
        if line.len() > MAX_FRAME_BYTES {
            return Err(FrameError::TooLarge);
        }
        let frame: Self = serde_json::from_str(line)?;
        if let Self::Hello { protocol, .. } = &frame
            && *protocol != PROTOCOL_VERSION
        {
            return Err(FrameError::UnsupportedVersion(*protocol));
        }
        Ok(frame)
    }
}

impl ControlFrame {
    /// Encode as a single JSON line (without the trailing newline).
    pub fn encode(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_worker_frames() {
        let hello = WorkerFrame::decode(r#"{"type":"hello","protocol":1,"name":"node-a"}"#).unwrap();
        assert_eq!(
            hello,
            WorkerFrame::Hello {
                protocol: 1,
                name: Some("node-a".into()),
                version: None,
            }
        );
        assert_eq!(
            WorkerFrame::decode(r#"{"type":"session_ended","chat_id":-42}"#).unwrap(),
            WorkerFrame::SessionEnded {
                chat_id: ChatId(-42)
            }
        );
        assert_eq!(
            WorkerFrame::decode(r#"{"type":"shutting_down"}"#).unwrap(),
            WorkerFrame::ShuttingDown
        );
    }

    #[test]
    fn rejects_other_protocol_versions() {
        let err = WorkerFrame::decode(r#"{"type":"hello","protocol":7}"#).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedVersion(7)));
    }

    #[test]
    fn rejects_oversized_lines() {
        let line = "x".repeat(MAX_FRAME_BYTES + 1);
        assert!(matches!(
            WorkerFrame::decode(&line),
            Err(FrameError::TooLarge)
        ));
    }

    #[test]
    fn welcome_announces_heartbeat_interval() {
        let worker_id = WorkerId::new();
        let frame = ControlFrame::Welcome {
            protocol: PROTOCOL_VERSION,
            worker_id,
            heartbeat_interval_ms: HEARTBEAT_INTERVAL_MS,
        };
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "welcome");
        assert_eq!(value["worker_id"], worker_id.to_string());
        assert_eq!(value["heartbeat_interval_ms"], 15_000);
    }

    #[test]
    fn encodes_bind_session_with_type_tag() {
        let frame = ControlFrame::BindSession {
            session_id: SessionId::new(),
            chat_id: ChatId(-1001),
            locale: "English".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "bind_session");
        assert_eq!(value["chat_id"], -1001);
        assert_eq!(value["locale"], "English");
    }
}
