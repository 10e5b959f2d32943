//! Chat-platform identifiers and the inbound update envelope.

use std::fmt;

use {
    serde::{Deserialize, Serialize},
    uuid::Uuid,
};

/// Identifier of a chat or group on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Identity of one worker connection. Never reused: a reconnecting worker
/// is issued a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Worker-local game session identifier, minted by the control plane when the
/// session is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a user on the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of chat an update originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    #[must_use]
    pub fn is_group(self) -> bool {
        matches!(self, Self::Group | Self::Supergroup)
    }
}

/// Who sent an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// IETF language tag reported by the platform, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

/// Opaque update body. The control plane only inspects it to recognise
/// commands; everything else is forwarded to the owning worker untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdatePayload {
    Message { message_id: i32, text: String },
    Callback { query_id: String, data: String },
}

impl UpdatePayload {
    /// Message text, if this is a plain text message.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            Self::Callback { .. } => None,
        }
    }
}

/// One event from the chat platform's update stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundUpdate {
    pub chat_id: ChatId,
    pub chat_kind: ChatKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<Sender>,
    pub payload: UpdatePayload,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ChatKind::Private, false)]
    #[case(ChatKind::Group, true)]
    #[case(ChatKind::Supergroup, true)]
    #[case(ChatKind::Channel, false)]
    fn group_kinds(#[case] kind: ChatKind, #[case] expected: bool) {
        assert_eq!(kind.is_group(), expected);
    }

    #[test]
    fn chat_id_serializes_as_bare_integer() {
        let json = serde_json::to_string(&ChatId(-100_123)).unwrap();
        assert_eq!(json, "-100123");
    }

    #[test]
    fn worker_ids_are_unique_and_parse_back() {
        let a = WorkerId::new();
        let b = WorkerId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<WorkerId>().unwrap(), a);
    }

    #[test]
    fn payload_is_tagged() {
        let payload = UpdatePayload::Callback {
            query_id: "q1".into(),
            data: "vote:3".into(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "callback");
        assert_eq!(value["data"], "vote:3");
        assert!(payload.text().is_none());
    }
}
