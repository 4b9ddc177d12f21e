//! This module provides the trait for the caller's per-message business logic.

use std::future::Future;

use crate::error::BoxError;
use crate::message::QueueMessage;

/// Business logic applied to every received message.
///
/// The handler is called once per message, strictly one message at a time.
///
/// # Error Handling
///
/// * `Ok(())` - the message is deleted from the queue (if it has a receipt handle)
/// * `Err(_)` - the message is left on the queue and becomes visible again once its
///   visibility timeout runs out
///
/// A panic inside the handler is caught and treated exactly like an `Err`. A failing
/// message never stops the rest of the batch.
///
/// # Examples
///
/// ```rust
/// use sqs_batch_processor::{BoxError, MessageHandler, QueueMessage};
///
/// struct PrintHandler;
///
/// impl MessageHandler for PrintHandler {
///     async fn handle_message(&self, message: &QueueMessage) -> Result<(), BoxError> {
///         let body = message.body.as_deref().ok_or("message without body")?;
///         println!("processing {body}");
///         Ok(())
///     }
/// }
/// ```
pub trait MessageHandler {
    /// Process a single message
    fn handle_message(
        &self,
        message: &QueueMessage,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// A [`MessageHandler`] backed by a closure. See [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap a closure taking an owned [`QueueMessage`] into a [`MessageHandler`].
///
/// ```rust
/// use sqs_batch_processor::{handler_fn, BoxError, QueueMessage};
///
/// let handler = handler_fn(|message: QueueMessage| async move {
///     if message.body.is_none() {
///         return Err::<(), BoxError>("empty message".into());
///     }
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(QueueMessage) -> Fut,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    HandlerFn { f }
}

impl<F, Fut> MessageHandler for HandlerFn<F>
where
    F: Fn(QueueMessage) -> Fut,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    fn handle_message(
        &self,
        message: &QueueMessage,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        (self.f)(message.clone())
    }
}
