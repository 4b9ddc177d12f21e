//! One fetch → process → acknowledge pass over a single batch.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;

use crate::error::{BoxError, HandlerPanic, QueueError};
use crate::handler::MessageHandler;
use crate::message::QueueMessage;
use crate::queue::{MessageQueue, QueueClient};

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Handled and deleted from the queue
    Deleted,
    /// Handled, but the delete call failed; the message will be redelivered
    DeleteFailed,
    /// Handled, but there was no receipt handle to delete it with
    MissingReceiptHandle,
    /// The handler returned an error or panicked; the message stays on the queue
    HandlerFailed,
}

/// Counts and timings for one completed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub received: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    pub missing_receipt_handle: usize,
    pub handler_failed: usize,
    pub receive_elapsed: Duration,
    pub process_elapsed: Duration,
}

impl BatchSummary {
    fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Deleted => self.deleted += 1,
            MessageOutcome::DeleteFailed => self.delete_failed += 1,
            MessageOutcome::MissingReceiptHandle => self.missing_receipt_handle += 1,
            MessageOutcome::HandlerFailed => self.handler_failed += 1,
        }
    }
}

/// Runs batches for the processor: receives one batch, hands every message to
/// the handler in order and deletes the ones that were handled.
pub struct BatchCapture<C, H> {
    queue: MessageQueue<C>,
    handler: H,
}

impl<C, H> BatchCapture<C, H>
where
    C: QueueClient,
    H: MessageHandler,
{
    pub fn new(queue: MessageQueue<C>, handler: H) -> Self {
        Self { queue, handler }
    }

    pub fn queue(&self) -> &MessageQueue<C> {
        &self.queue
    }

    /// Receive and process one batch from `queue_name`.
    ///
    /// Only a failed receive is returned as an error. Failures of single messages
    /// are logged and counted in the summary, never returned.
    pub async fn receive_message_batch(&self, queue_name: &str) -> Result<BatchSummary, QueueError> {
        let started = Instant::now();

        let messages = match self.queue.receive_queue_messages(queue_name).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::trace!(queue = queue_name, error = %e, "error receiving messages for queue");
                return Err(e);
            }
        };

        let receive_elapsed = started.elapsed();

        if messages.is_empty() {
            return Ok(BatchSummary {
                receive_elapsed,
                ..Default::default()
            });
        }

        tracing::info!(
            queue = queue_name,
            message_count = messages.len(),
            "received message batch"
        );

        let mut summary = self.process_messages(queue_name, &messages).await;
        summary.receive_elapsed = receive_elapsed;

        tracing::info!(
            queue = queue_name,
            message_count = summary.received,
            deleted = summary.deleted,
            handler_failed = summary.handler_failed,
            receive_elapsed_ms = summary.receive_elapsed.as_millis() as u64,
            process_elapsed_ms = summary.process_elapsed.as_millis() as u64,
            "processed message batch"
        );

        Ok(summary)
    }

    /// Process `messages` one after the other, in the order they were received.
    pub async fn process_messages(&self, queue_name: &str, messages: &[QueueMessage]) -> BatchSummary {
        let started = Instant::now();
        let mut summary = BatchSummary {
            received: messages.len(),
            ..Default::default()
        };

        for message in messages {
            let outcome = self.process_message(queue_name, message).await;
            summary.record(outcome);
        }

        summary.process_elapsed = started.elapsed();
        summary
    }

    /// Run the handler for one message and act on its result.
    pub async fn process_message(&self, queue_name: &str, message: &QueueMessage) -> MessageOutcome {
        let payload = message.log_payload();
        tracing::info!(
            queue = queue_name,
            message_id = payload.message_id,
            approx_receive_count = payload.approx_receive_count,
            sent_at = payload.sent_at.map(tracing::field::display),
            approx_first_received_at = payload.approx_first_received_at.map(tracing::field::display),
            "process message"
        );

        let result = self.invoke_handler(message).await;
        self.handle_processed_message(result, queue_name, message).await
    }

    /// A panic while creating or polling the handler future is turned into an error.
    async fn invoke_handler(&self, message: &QueueMessage) -> Result<(), BoxError> {
        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.handler.handle_message(message)
        })) {
            Ok(future) => future,
            Err(payload) => return Err(Box::new(HandlerPanic::from_payload(payload)) as BoxError),
        };

        AssertUnwindSafe(future)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Box::new(HandlerPanic::from_payload(payload)) as BoxError))
    }

    /// Decide what to do with a message once its handler has finished.
    pub async fn handle_processed_message(
        &self,
        result: Result<(), BoxError>,
        queue_name: &str,
        message: &QueueMessage,
    ) -> MessageOutcome {
        if let Err(e) = result {
            tracing::trace!(
                queue = queue_name,
                message_id = message.message_id.as_deref(),
                error = %e,
                "error processing message"
            );
            return MessageOutcome::HandlerFailed;
        }

        let Some(receipt_handle) = message.valid_receipt_handle() else {
            tracing::warn!(
                queue = queue_name,
                message_id = message.message_id.as_deref(),
                "missing receipt handle on message"
            );
            return MessageOutcome::MissingReceiptHandle;
        };

        match self.queue.delete_message(queue_name, receipt_handle).await {
            Ok(()) => MessageOutcome::Deleted,
            Err(e) => {
                tracing::warn!(
                    queue = queue_name,
                    message_id = message.message_id.as_deref(),
                    error = %e,
                    "error deleting message"
                );
                MessageOutcome::DeleteFailed
            }
        }
    }
}
