//! NATS JetStream subscriber for job triggers.

use anyhow::Result;
use async_nats::jetstream::{
    self,
    consumer::{pull::Config as ConsumerConfig, Consumer},
    AckKind, Context, Message,
};
use futures::StreamExt;
use std::time::Duration;

use ymm_core::{JobTrigger, RunOptions, WorkflowResult};

/// NATS JetStream subscriber for job triggers.
pub struct NatsSubscriber {
    /// Durable pull consumer.
    consumer: Consumer<ConsumerConfig>,

    /// Consumer name.
    name: String,
}

impl NatsSubscriber {
    /// Connect to NATS, ensuring the stream and the durable consumer exist.
    ///
    /// `ack_wait` and `max_deliver` only apply when the consumer is created
    /// here; an existing durable consumer keeps its settings.
    pub async fn connect(
        nats_url: &str,
        stream: &str,
        subject: &str,
        consumer: &str,
        ack_wait: Duration,
        max_deliver: i64,
    ) -> Result<Self> {
        let client = async_nats::connect(nats_url).await?;
        let js = jetstream::new(client);

        ensure_stream(&js, stream, subject).await?;

        let stream_handle = js.get_stream(stream).await?;
        let consumer_handle = match stream_handle.get_consumer(consumer).await {
            Ok(c) => c,
            Err(_) => {
                let config = consumer_config(subject, consumer, ack_wait, max_deliver);
                let c = stream_handle.create_consumer(config).await?;
                tracing::info!(
                    consumer = %consumer,
                    ack_wait_secs = ack_wait.as_secs(),
                    max_deliver,
                    "Created NATS consumer"
                );
                c
            }
        };

        Ok(Self {
            consumer: consumer_handle,
            name: consumer.to_string(),
        })
    }

    /// Consumer name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch the next message, if one is waiting.
    pub async fn receive(&self) -> Result<Option<Message>> {
        let mut messages = self.consumer.fetch().max_messages(1).messages().await?;

        if let Some(msg) = messages.next().await {
            let msg = msg.map_err(|e| anyhow::anyhow!("Failed to receive message: {}", e))?;
            return Ok(Some(msg));
        }

        Ok(None)
    }

    /// Decode a trigger from a message body.
    pub fn decode(msg: &Message) -> WorkflowResult<(JobTrigger, RunOptions)> {
        JobTrigger::parse(&msg.payload)
    }

    /// Acknowledge a message.
    pub async fn ack(msg: &Message) -> Result<()> {
        msg.ack()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to ack message: {}", e))?;
        Ok(())
    }

    /// Tell NATS the job is still running, restarting its ack timer.
    pub async fn progress(msg: &Message) -> Result<()> {
        msg.ack_with(AckKind::Progress)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send progress: {}", e))?;
        Ok(())
    }

    /// Negatively acknowledge a message (will be redelivered).
    pub async fn nack(msg: &Message) -> Result<()> {
        msg.ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to nack message: {}", e))?;
        Ok(())
    }
}

/// Durable pull consumer settings for the trigger subject.
pub fn consumer_config(
    subject: &str,
    consumer: &str,
    ack_wait: Duration,
    max_deliver: i64,
) -> ConsumerConfig {
    ConsumerConfig {
        durable_name: Some(consumer.to_string()),
        filter_subject: subject.to_string(),
        ack_wait,
        max_deliver,
        ..Default::default()
    }
}

/// Create the stream if it does not exist yet.
pub async fn ensure_stream(js: &Context, stream: &str, subject: &str) -> Result<()> {
    match js.get_stream(stream).await {
        Ok(_) => {
            tracing::debug!(stream = %stream, "Using existing NATS stream");
        }
        Err(_) => {
            let config = jetstream::stream::Config {
                name: stream.to_string(),
                subjects: vec![subject.to_string()],
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            };
            js.create_stream(config).await?;
            tracing::info!(stream = %stream, subject = %subject, "Created NATS stream");
        }
    }
    Ok(())
}
