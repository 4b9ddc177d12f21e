//! Error types shared by the queue adapter, the batch cycle and the loop driver.

use std::any::Any;

use thiserror::Error;

/// Boxed error type used at the collaborator seams (queue client, message handler).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures talking to the queue.
///
/// Resolve and receive failures end a cycle early and make the loop driver
/// back off before trying again. Delete failures are only logged.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to resolve url for queue {queue}")]
    ResolveAddress {
        queue: String,
        #[source]
        source: BoxError,
    },

    #[error("queue {queue} resolved without an url")]
    MissingAddress { queue: String },

    #[error("failed to receive messages from {address}")]
    Receive {
        address: String,
        #[source]
        source: BoxError,
    },

    #[error("invalid response when receiving messages from {address}")]
    InvalidResponse { address: String },

    #[error("failed to delete message from {address}")]
    Delete {
        address: String,
        #[source]
        source: BoxError,
    },
}

/// A message handler panicked while processing a message.
#[derive(Debug, Error)]
#[error("message handler panicked: {message}")]
pub struct HandlerPanic {
    message: String,
}

impl HandlerPanic {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };

        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The watchdog expired more times in a row than the configured threshold.
///
/// This is the only error the processor reports to its owner. The loop has
/// halted when it is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("forced to fetch above threshold ({forced} consecutive forced batches, threshold {threshold})")]
pub struct ThresholdExceeded {
    pub forced: u32,
    pub threshold: u32,
}

/// Rejected processor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("queue_name must not be empty")]
    EmptyQueueName,

    #[error("region must not be empty")]
    EmptyRegion,

    #[error("visibility_timeout must be at most {max} seconds, got {provided}")]
    VisibilityTimeoutOutOfRange { provided: u32, max: u32 },

    #[error("wait_time_seconds must be at most {max} seconds, got {provided}")]
    WaitTimeOutOfRange { provided: u32, max: u32 },

    #[error("max_nof_messages must be between {min} and {max}, got {provided}")]
    MaxMessagesOutOfRange { provided: u32, min: u32, max: u32 },
}
