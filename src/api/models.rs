use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of an intercom message. Unknown kinds are kept verbatim so they can be
/// ignored by the dispatcher without failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Call,
    Phone,
    Text,
    Other(String),
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "call" => Self::Call,
            "phone" => Self::Phone,
            "text" => Self::Text,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Call => "call".into(),
            MessageType::Phone => "phone".into(),
            MessageType::Text => "text".into(),
            MessageType::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", into = "String")]
pub enum MessageStatus {
    #[default]
    None,
    Accepted,
    Rejected,
    Seen,
    Other(String),
}

impl MessageStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Seen => "seen",
            Self::Other(s) => s,
        }
    }

    /// Still waiting for the peer: nobody accepted or rejected yet.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::None | Self::Seen)
    }
}

impl From<String> for MessageStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "none" => Self::None,
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            "seen" => Self::Seen,
            _ => Self::Other(s),
        }
    }
}

impl From<MessageStatus> for String {
    fn from(s: MessageStatus) -> Self {
        s.as_str().to_string()
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntercomAttr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntercomMessage {
    pub id: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub expired_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intercom_attr: Option<IntercomAttr>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IntercomMessage {
    /// An unparsable deadline counts as already expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match parse_timestamp(&self.expired_at) {
            Some(at) => now > at,
            None => true,
        }
    }

    /// Where accepting this call should take the user.
    pub fn call_url(&self) -> Option<&str> {
        let attr = self.intercom_attr.as_ref()?;
        match self.message_type {
            MessageType::Phone => attr.owner_url.as_deref(),
            _ => attr.url.as_deref(),
        }
    }
}

/// Backend timestamps are RFC 3339, sometimes with a space separator or no
/// offset at all (then UTC).
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(at) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// A call started locally towards a contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingCall {
    pub id: String,
    pub contact_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub status: MessageStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Peer-reported state of an outgoing call, as returned by the ring endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    pub status: MessageStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Contact {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
