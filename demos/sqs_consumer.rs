use std::time::Duration;

use anyhow::Context;
use sqs_batch_processor::{BoxError, MessageHandler, ProcessorConfig, QueueMessage, sqs};
use tracing_subscriber::EnvFilter;

pub struct SleepingHandler;

impl MessageHandler for SleepingHandler {
    async fn handle_message(&self, message: &QueueMessage) -> Result<(), BoxError> {
        let body = message.body.as_deref().ok_or("message without body")?;
        tracing::info!(body, "processing message");

        // Bodies are the number of seconds to pretend to work
        let wait_time = body.trim().parse::<u64>()?;
        tokio::time::sleep(Duration::from_secs(wait_time)).await;

        tracing::info!(body, "done processing message");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_line_number(true)
        .init();

    let queue_name = std::env::var("SQS_QUEUE_NAME").context("SQS_QUEUE_NAME is not set")?;
    let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "eu-west-1".to_string());

    let config = ProcessorConfig::new(queue_name)
        .with_region(region)
        .with_batch_timeout(Duration::from_secs(120))
        .with_batch_force_threshold(5)
        .with_wait_time_seconds(20);

    let processor = sqs::create(SleepingHandler, config).await?;
    let mut fatal = processor.subscribe();

    processor.start_processing_queue();
    tracing::info!(queue = processor.queue_name(), "processor started");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!("shutdown requested, finishing current batch");
            processor.stop_after_current_batch();
            processor.stopped().await;
        }
        received = fatal.recv() => {
            let err = received.context("fatal error channel closed")?;
            return Err(err).context("processor halted");
        }
    }

    println!("done");

    Ok(())
}
