//! Messages as received from the queue, and the attributes that can be requested with them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System attributes that can be requested alongside each received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageAttribute {
    All,
    ApproximateFirstReceiveTimestamp,
    ApproximateReceiveCount,
    SenderId,
    SentTimestamp,
}

impl MessageAttribute {
    /// The attribute name as the queue service spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::ApproximateFirstReceiveTimestamp => "ApproximateFirstReceiveTimestamp",
            Self::ApproximateReceiveCount => "ApproximateReceiveCount",
            Self::SenderId => "SenderId",
            Self::SentTimestamp => "SentTimestamp",
        }
    }
}

/// A single message received from the queue.
///
/// The handler gets the message untouched. The `receipt_handle` is what the
/// processor needs to delete the message once the handler succeeded; a message
/// without one is never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueMessage {
    /// Queue-assigned identifier
    pub message_id: Option<String>,
    /// Acknowledgment handle required to delete the message
    pub receipt_handle: Option<String>,
    /// Raw message body
    pub body: Option<String>,
    /// System attributes keyed by their service name (e.g. `SentTimestamp`)
    pub attributes: HashMap<String, String>,
}

impl QueueMessage {
    /// Create a message with an id, a receipt handle and a body
    pub fn new(
        message_id: impl Into<String>,
        receipt_handle: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Some(message_id.into()),
            receipt_handle: Some(receipt_handle.into()),
            body: Some(body.into()),
            attributes: HashMap::new(),
        }
    }

    /// Set a system attribute (builder pattern)
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// The receipt handle, if it is usable for deletion.
    pub fn valid_receipt_handle(&self) -> Option<&str> {
        self.receipt_handle
            .as_deref()
            .filter(|handle| !handle.trim().is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn approx_receive_count(&self) -> Option<u32> {
        self.attribute("ApproximateReceiveCount")?.parse().ok()
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.attribute("SentTimestamp").and_then(parse_timestamp)
    }

    pub fn approx_first_received_at(&self) -> Option<DateTime<Utc>> {
        self.attribute("ApproximateFirstReceiveTimestamp")
            .and_then(parse_timestamp)
    }

    /// Structured fields logged for this message.
    pub(crate) fn log_payload(&self) -> MessageLogPayload<'_> {
        MessageLogPayload {
            message_id: self.message_id.as_deref(),
            approx_receive_count: self.approx_receive_count(),
            sent_at: self.sent_at(),
            approx_first_received_at: self.approx_first_received_at(),
        }
    }
}

/// Log-friendly view of a message. Absent or unparseable values stay `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MessageLogPayload<'a> {
    pub message_id: Option<&'a str>,
    pub approx_receive_count: Option<u32>,
    pub sent_at: Option<DateTime<Utc>>,
    pub approx_first_received_at: Option<DateTime<Utc>>,
}

/// Timestamps are milliseconds since the epoch.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let millis: i64 = raw.trim().parse().ok()?;
    if millis <= 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis)
}
