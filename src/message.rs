//! Message values - what the chat-protocol client hands to the store
//!
//! Two envelope kinds share the same optional sub-records:
//! - `StoredMessageAttribute`: sender, sequence numbers, timestamp
//! - `QuotedInfo`: reference to the message being replied to

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One message element (text, face, image, ...) as an open key/value map
pub type Msg = serde_json::Map<String, serde_json::Value>;

/// Kind of a stored envelope. Group and private ids are separate namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Group,
    Private,
}

impl MessageKind {
    /// Get the string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Group => "group",
            MessageKind::Private => "private",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "group" => Ok(MessageKind::Group),
            "private" => Ok(MessageKind::Private),
            other => Err(crate::Error::Config(format!("unknown message kind: {}", other))),
        }
    }
}

/// Sender and sequencing metadata of a message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoredMessageAttribute {
    pub message_seq: i32,
    pub internal_id: i32,
    pub sender_uin: i64,
    /// Display name snapshot at send time
    pub sender_name: String,
    pub timestamp: i64,
}

/// Reference to a previously sent message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuotedInfo {
    /// Externally supplied identifier of the quoted message
    pub prev_id: String,
    pub prev_global_id: i32,
    #[serde(default)]
    pub quoted_content: Vec<Msg>,
}

/// A message sent to or received from a group
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredGroupMessage {
    pub id: i64,
    pub global_id: i32,
    #[serde(default)]
    pub attribute: Option<StoredMessageAttribute>,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub quoted_info: Option<QuotedInfo>,
    pub group_code: i64,
    #[serde(default)]
    pub anonymous_id: String,
    #[serde(default)]
    pub content: Vec<Msg>,
}

/// A message sent to or received from a single peer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoredPrivateMessage {
    pub id: i64,
    pub global_id: i32,
    #[serde(default)]
    pub attribute: Option<StoredMessageAttribute>,
    #[serde(default)]
    pub sub_type: String,
    #[serde(default)]
    pub quoted_info: Option<QuotedInfo>,
    pub session_uin: i64,
    pub target_uin: i64,
    #[serde(default)]
    pub content: Vec<Msg>,
}

/// Either kind of stored message, as returned by kind-agnostic lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredMessage {
    Group(StoredGroupMessage),
    Private(StoredPrivateMessage),
}

impl StoredMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            StoredMessage::Group(_) => MessageKind::Group,
            StoredMessage::Private(_) => MessageKind::Private,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            StoredMessage::Group(m) => m.id,
            StoredMessage::Private(m) => m.id,
        }
    }

    pub fn global_id(&self) -> i32 {
        match self {
            StoredMessage::Group(m) => m.global_id,
            StoredMessage::Private(m) => m.global_id,
        }
    }

    pub fn attribute(&self) -> Option<&StoredMessageAttribute> {
        match self {
            StoredMessage::Group(m) => m.attribute.as_ref(),
            StoredMessage::Private(m) => m.attribute.as_ref(),
        }
    }

    pub fn quoted_info(&self) -> Option<&QuotedInfo> {
        match self {
            StoredMessage::Group(m) => m.quoted_info.as_ref(),
            StoredMessage::Private(m) => m.quoted_info.as_ref(),
        }
    }

    pub fn content(&self) -> &[Msg] {
        match self {
            StoredMessage::Group(m) => &m.content,
            StoredMessage::Private(m) => &m.content,
        }
    }
}

impl From<StoredGroupMessage> for StoredMessage {
    fn from(msg: StoredGroupMessage) -> Self {
        StoredMessage::Group(msg)
    }
}

impl From<StoredPrivateMessage> for StoredMessage {
    fn from(msg: StoredPrivateMessage) -> Self {
        StoredMessage::Private(msg)
    }
}
