//! AWS SQS implementation of [`QueueClient`] and the one-call [`create`] entry point.

use aws_sdk_sqs::types::{Message, MessageSystemAttributeName};

use crate::config::ProcessorConfig;
use crate::error::ConfigError;
use crate::handler::MessageHandler;
use crate::message::QueueMessage;
use crate::processor::Processor;
use crate::queue::{QueueClient, ReceiveParams, ReceiveResponse};

/// [`QueueClient`] backed by the AWS SDK.
#[derive(Clone, Debug)]
pub struct SqsQueueClient {
    inner: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { inner: client }
    }

    /// Build a client from the default AWS configuration chain for `region`.
    pub async fn from_region(region: &str) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_sqs::config::Region::new(region.to_string()))
            .load()
            .await;

        Self::new(aws_sdk_sqs::Client::new(&aws_config))
    }
}

impl QueueClient for SqsQueueClient {
    type Error = aws_sdk_sqs::Error;

    async fn resolve_address(&self, queue_name: &str) -> Result<Option<String>, Self::Error> {
        let output = self
            .inner
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await?;

        Ok(output.queue_url)
    }

    async fn fetch_batch(
        &self,
        address: &str,
        params: &ReceiveParams,
    ) -> Result<Option<ReceiveResponse>, Self::Error> {
        let attribute_names = params
            .attribute_names
            .iter()
            .map(|name| MessageSystemAttributeName::from(name.as_str()))
            .collect::<Vec<_>>();

        let output = self
            .inner
            .receive_message()
            .queue_url(address)
            .wait_time_seconds(params.wait_time_seconds as i32)
            .max_number_of_messages(params.max_messages as i32)
            .set_visibility_timeout(params.visibility_timeout.map(|seconds| seconds as i32))
            .set_message_system_attribute_names(Some(attribute_names))
            .send()
            .await?;

        Ok(Some(ReceiveResponse {
            messages: output
                .messages
                .map(|messages| messages.into_iter().map(into_queue_message).collect()),
        }))
    }

    async fn delete_message(&self, address: &str, receipt_handle: &str) -> Result<(), Self::Error> {
        self.inner
            .delete_message()
            .queue_url(address)
            .receipt_handle(receipt_handle)
            .send()
            .await?;

        Ok(())
    }
}

fn into_queue_message(message: Message) -> QueueMessage {
    QueueMessage {
        message_id: message.message_id,
        receipt_handle: message.receipt_handle,
        body: message.body,
        attributes: message
            .attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| (name.as_str().to_string(), value))
            .collect(),
    }
}

/// Validate `config`, build an SQS client for `config.region` and return a processor
/// ready to be started.
///
/// ```rust,no_run
/// use sqs_batch_processor::{handler_fn, sqs, BoxError, ProcessorConfig, QueueMessage};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let handler = handler_fn(|message: QueueMessage| async move {
///     println!("{:?}", message.body);
///     Ok::<(), BoxError>(())
/// });
///
/// let processor = sqs::create(handler, ProcessorConfig::new("orders")).await?;
/// processor.start_processing_queue();
/// # Ok(())
/// # }
/// ```
pub async fn create<H>(
    handler: H,
    config: ProcessorConfig,
) -> Result<Processor<SqsQueueClient, H>, ConfigError>
where
    H: MessageHandler + Send + Sync + 'static,
{
    config.validate()?;
    let client = SqsQueueClient::from_region(&config.region).await;
    Processor::new(client, handler, config)
}
