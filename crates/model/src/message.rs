use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier for one message.
///
/// The token is assigned by the data source and is opaque to the core: it is
/// compared for equality, never parsed or ordered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Creates a typed message identifier from a server-assigned token.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for MessageId {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

/// Which side of the conversation produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sender {
    Customer,
    Admin,
}

/// Delivery status for one message.
///
/// A well-behaved source only moves status forward (`Sending` → `Sent` →
/// `Read`), but nothing in the core relies on that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Sending,
    Sent,
    Read,
}

/// Core immutable message model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub sender: Sender,
    pub status: MessageStatus,
    /// Display/tie-break timestamp only. Identity is `id`, never this.
    pub updated_at_unix_seconds: u64,
}

impl Message {
    /// Creates a message with explicit status and timestamp.
    pub fn new(
        id: impl Into<MessageId>,
        text: impl Into<String>,
        sender: Sender,
        status: MessageStatus,
        updated_at_unix_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender,
            status,
            updated_at_unix_seconds,
        }
    }

    /// Returns a copy with a new status, everything else untouched.
    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_field_names_stay_camel_case() {
        let message = Message::new("m-1", "hi", Sender::Admin, MessageStatus::Read, 1_700_000_000);
        let serialized = serde_json::to_string(&message).unwrap();

        assert!(serialized.contains("\"updatedAtUnixSeconds\""));
        assert!(serialized.contains("\"ADMIN\""));
        assert!(serialized.contains("\"id\":\"m-1\""));
    }
}
