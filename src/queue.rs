//! The queue collaborator and the adapter the processor talks to it through.
//!
//! [`QueueClient`] is the raw wire access: resolve a queue name to an address,
//! receive one page of messages, delete one message. [`MessageQueue`] sits on
//! top of it and speaks in queue names: every receive and every delete resolves
//! the address again before calling the client.

use std::future::Future;

use crate::error::{BoxError, QueueError};
use crate::message::{MessageAttribute, QueueMessage};

/// Parameters for a single receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveParams {
    pub max_messages: u32,
    pub wait_time_seconds: u32,
    pub visibility_timeout: Option<u32>,
    pub attribute_names: Vec<MessageAttribute>,
}

/// What a receive call returned.
///
/// `messages: None` is a valid response with nothing in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveResponse {
    pub messages: Option<Vec<QueueMessage>>,
}

impl ReceiveResponse {
    pub fn with_messages(messages: Vec<QueueMessage>) -> Self {
        Self {
            messages: Some(messages),
        }
    }
}

/// Wire access to the queue service.
///
/// Implement this trait to plug a queue system into the processor. The SQS
/// implementation lives in [`crate::sqs`].
///
/// # Examples
///
/// ```rust
/// use sqs_batch_processor::{QueueClient, QueueMessage, ReceiveParams, ReceiveResponse};
///
/// struct StaticQueue;
///
/// impl QueueClient for StaticQueue {
///     type Error = std::io::Error;
///
///     async fn resolve_address(&self, queue_name: &str) -> Result<Option<String>, Self::Error> {
///         Ok(Some(format!("memory://{queue_name}")))
///     }
///
///     async fn fetch_batch(
///         &self,
///         _address: &str,
///         _params: &ReceiveParams,
///     ) -> Result<Option<ReceiveResponse>, Self::Error> {
///         let message = QueueMessage::new("1", "receipt-1", "hello");
///         Ok(Some(ReceiveResponse::with_messages(vec![message])))
///     }
///
///     async fn delete_message(&self, _address: &str, _receipt_handle: &str) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
/// ```
pub trait QueueClient {
    /// The error returned by every call
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resolve a queue name to the address used by the other calls.
    ///
    /// `Ok(None)` means the service answered without an address.
    fn resolve_address(
        &self,
        queue_name: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;

    /// Receive one page of messages, long-polling as configured in `params`.
    ///
    /// `Ok(None)` means the service answered without a response body, which the
    /// processor treats as an invalid response rather than an empty batch.
    fn fetch_batch(
        &self,
        address: &str,
        params: &ReceiveParams,
    ) -> impl Future<Output = Result<Option<ReceiveResponse>, Self::Error>> + Send;

    /// Delete (acknowledge) a message by its receipt handle.
    fn delete_message(
        &self,
        address: &str,
        receipt_handle: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Name-based access to one queue service, built on a [`QueueClient`].
pub struct MessageQueue<C> {
    client: C,
    params: ReceiveParams,
}

impl<C> MessageQueue<C>
where
    C: QueueClient,
{
    pub fn new(client: C, params: ReceiveParams) -> Self {
        Self { client, params }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Receive the next batch for `queue_name`.
    ///
    /// A response without a message list is an empty batch; a missing response is
    /// [`QueueError::InvalidResponse`].
    pub async fn receive_queue_messages(
        &self,
        queue_name: &str,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let address = self.resolve(queue_name).await?;

        let response = match self.client.fetch_batch(&address, &self.params).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(queue = queue_name, address = %address, error = %e, "error receiving messages");
                return Err(QueueError::Receive {
                    address,
                    source: Box::new(e),
                });
            }
        };

        match response {
            Some(ReceiveResponse {
                messages: Some(messages),
            }) => Ok(messages),
            Some(ReceiveResponse { messages: None }) => Ok(Vec::new()),
            None => {
                tracing::warn!(
                    queue = queue_name,
                    address = %address,
                    "no data in response when receiving messages"
                );
                Err(QueueError::InvalidResponse { address })
            }
        }
    }

    /// Delete one message from `queue_name`.
    pub async fn delete_message(
        &self,
        queue_name: &str,
        receipt_handle: &str,
    ) -> Result<(), QueueError> {
        let address = self.resolve(queue_name).await?;

        self.client
            .delete_message(&address, receipt_handle)
            .await
            .map_err(|e| QueueError::Delete {
                address,
                source: Box::new(e) as BoxError,
            })
    }

    async fn resolve(&self, queue_name: &str) -> Result<String, QueueError> {
        match self.client.resolve_address(queue_name).await {
            Ok(Some(address)) => Ok(address),
            Ok(None) => {
                tracing::warn!(queue = queue_name, "queue resolved without an url");
                Err(QueueError::MissingAddress {
                    queue: queue_name.to_string(),
                })
            }
            Err(e) => {
                tracing::warn!(queue = queue_name, error = %e, "error loading url for queue");
                Err(QueueError::ResolveAddress {
                    queue: queue_name.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }
}
