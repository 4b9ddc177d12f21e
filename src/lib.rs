//! # SQS Batch Processor
//!
//! A resilient, long-running consumer loop for a message queue. It keeps pulling batches
//! of messages, hands each message to your handler, deletes the ones that were handled and
//! makes sure the loop never gets stuck, even when a batch hangs.
//!
//! ## Features
//!
//! - **Generic Design**: Works with any queue system by implementing the [`QueueClient`] trait; AWS SQS is built in (feature `sqs`)
//! - **Sequential Batches**: Messages of a batch are handled strictly one after another, in the order received
//! - **Poison Message Isolation**: A failing or panicking handler never stops the rest of the batch
//! - **Watchdog**: A batch that takes longer than the batch timeout is abandoned and the next one starts anyway
//! - **Fatal Threshold**: Too many forced batches in a row halt the loop and notify the owner
//! - **Graceful Stop**: Stopping lets the batch in flight finish
//! - **Structured Logging**: Every batch and message is logged through `tracing`
//!
//! ## Quick Start
//!
//! ```rust
//! use sqs_batch_processor::{
//!     BoxError, MessageHandler, Processor, ProcessorConfig, QueueClient, QueueMessage,
//!     ReceiveParams, ReceiveResponse,
//! };
//! use std::time::Duration;
//!
//! // 1. Implement QueueClient for your queue system (or use `sqs::SqsQueueClient`)
//! struct MyQueue;
//! impl QueueClient for MyQueue {
//!     type Error = std::io::Error;
//!
//!     async fn resolve_address(&self, queue_name: &str) -> Result<Option<String>, Self::Error> {
//!         Ok(Some(format!("memory://{queue_name}")))
//!     }
//!
//!     async fn fetch_batch(
//!         &self,
//!         _address: &str,
//!         _params: &ReceiveParams,
//!     ) -> Result<Option<ReceiveResponse>, Self::Error> {
//!         let message = QueueMessage::new("id-1", "receipt-1", "hello");
//!         Ok(Some(ReceiveResponse::with_messages(vec![message])))
//!     }
//!
//!     async fn delete_message(&self, _address: &str, receipt_handle: &str) -> Result<(), Self::Error> {
//!         println!("deleting {receipt_handle}");
//!         Ok(())
//!     }
//! }
//!
//! // 2. Implement MessageHandler for your business logic
//! struct MyHandler;
//! impl MessageHandler for MyHandler {
//!     async fn handle_message(&self, message: &QueueMessage) -> Result<(), BoxError> {
//!         println!("processing {:?}", message.body);
//!         Ok(())
//!     }
//! }
//!
//! // 3. Configure and start the processor
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProcessorConfig::new("my-queue")
//!     .with_batch_timeout(Duration::from_secs(30))
//!     .with_batch_force_threshold(5);
//!
//! let processor = Processor::new(MyQueue, MyHandler, config)?;
//! let mut fatal = processor.subscribe();
//!
//! processor.start_processing_queue();
//!
//! // 4. React to the one fatal error the processor can report
//! if let Ok(err) = fatal.recv().await {
//!     eprintln!("processor halted: {err}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`QueueClient`]**: Wire access to the queue: resolve address, receive a page, delete a message
//! - **[`MessageHandler`]**: Your per-message business logic
//! - **[`BatchCapture`]**: One receive → handle → delete pass over a single batch
//! - **[`BatchWatchdog`]**: Per-batch timer that forces progress and counts forced batches
//! - **[`Processor`]**: The loop driver that runs batch after batch
//!
//! ### How it Works
//!
//! For every iteration the processor:
//! 1. Checks that it is still running, otherwise it halts
//! 2. Arms the watchdog for the batch timeout
//! 3. Spawns the batch: resolve the queue url, receive one page, handle each message in order
//! 4. Waits for whichever finishes first
//!     - the batch: the watchdog is stopped (resetting the forced count) and the next batch starts
//!       right away, or after a one second backoff if receiving failed
//!     - the watchdog: the next batch starts right away while the slow one keeps running; once
//!       the forced count exceeds the threshold the processor halts and reports [`ThresholdExceeded`]

mod capture;
mod config;
mod error;
mod handler;
mod message;
mod processor;
mod queue;
#[cfg(feature = "sqs")]
pub mod sqs;
mod timeout;

pub use capture::{BatchCapture, BatchSummary, MessageOutcome};
pub use config::{
    DEFAULT_BATCH_FORCE_THRESHOLD, DEFAULT_BATCH_TIMEOUT, DEFAULT_MAX_NOF_MESSAGES,
    DEFAULT_REGION, DEFAULT_WAIT_TIME_SECONDS, MAX_NOF_MESSAGES, MAX_VISIBILITY_TIMEOUT_SECONDS,
    MAX_WAIT_TIME_SECONDS, ProcessorConfig,
};
pub use error::{BoxError, ConfigError, HandlerPanic, QueueError, ThresholdExceeded};
pub use handler::{HandlerFn, MessageHandler, handler_fn};
pub use message::{MessageAttribute, QueueMessage};
pub use processor::{FETCH_ERROR_BACKOFF, Processor, StopHandle};
pub use queue::{MessageQueue, QueueClient, ReceiveParams, ReceiveResponse};
pub use timeout::{BatchWatchdog, Expiry, WatchdogStop};
