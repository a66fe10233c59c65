//! Message source / sink contracts consumed by the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// An inbound message as returned by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Source-unique message identifier.
    pub id: String,
    /// Chat the message belongs to (JID for WhatsApp).
    #[serde(default, alias = "chat_jid")]
    pub chat_id: String,
    /// Sender identifier.
    #[serde(default)]
    pub sender: String,
    /// Message text.
    #[serde(default)]
    pub content: String,
    /// Send time as reported by the source, unparsed.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Authored by the local account.
    #[serde(default)]
    pub is_from_me: bool,
}

impl InboundMessage {
    /// Sender, or `None` when the source left it blank.
    pub fn sender(&self) -> Option<&str> {
        Some(self.sender.as_str()).filter(|s| !s.is_empty())
    }

    /// Chat id, or `None` when the source left it blank.
    pub fn chat_id(&self) -> Option<&str> {
        Some(self.chat_id.as_str()).filter(|s| !s.is_empty())
    }
}

/// Parameters of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchQuery {
    /// Only messages newer than this.
    pub after: DateTime<Utc>,
    /// Page size.
    pub limit: usize,
    /// Whether to include surrounding conversation context.
    pub include_context: bool,
}

/// Delivery report from the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    /// Human-readable status from the sink.
    #[serde(alias = "message")]
    pub detail: String,
}

impl SendOutcome {
    pub fn delivered(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// Where inbound messages come from.
///
/// Must tolerate repeated calls with overlapping windows.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages newer than `query.after`, in source order.
    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<InboundMessage>, ChannelError>;
}

/// Where responses go.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Attempt delivery of `text` to `chat_id`.
    async fn send(&self, chat_id: &str, text: &str) -> Result<SendOutcome, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_chat_jid_alias() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"id": "m1", "chat_jid": "123@s.whatsapp.net", "sender": "123", "content": "hi"}"#,
        )
        .unwrap();
        assert_eq!(msg.chat_id, "123@s.whatsapp.net");
        assert!(!msg.is_from_me);
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn timestamp_without_offset_is_kept_verbatim() {
        let msg: InboundMessage = serde_json::from_str(
            r#"{"id": "m1", "content": "hi", "timestamp": "2026-10-16T09:00:00"}"#,
        )
        .unwrap();
        assert_eq!(msg.timestamp.as_deref(), Some("2026-10-16T09:00:00"));
    }

    #[test]
    fn blank_fields_read_as_absent() {
        let msg = InboundMessage {
            id: "m1".into(),
            chat_id: String::new(),
            sender: String::new(),
            content: "hi".into(),
            timestamp: None,
            is_from_me: false,
        };
        assert_eq!(msg.sender(), None);
        assert_eq!(msg.chat_id(), None);
    }

    #[test]
    fn send_outcome_reads_bridge_shape() {
        let outcome: SendOutcome =
            serde_json::from_str(r#"{"success": true, "message": "Message sent to 123"}"#)
                .unwrap();
        assert_eq!(outcome, SendOutcome::delivered("Message sent to 123"));
    }
}
