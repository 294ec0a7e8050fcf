//! NATS job trigger publisher.
//!
//! Publishes `{jobId, runMode?, skipSteps?}` messages that workers consume
//! from the job stream.

use async_nats::jetstream::{self, Context};
use thiserror::Error;

use ymm_core::JobTrigger;
use ymm_worker::nats::{DEFAULT_STREAM, DEFAULT_SUBJECT};

/// Errors that can occur during NATS operations.
#[derive(Debug, Error)]
pub enum NatsError {
    #[error("NATS connection error: {0}")]
    Connection(String),

    #[error("JetStream error: {0}")]
    JetStream(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

/// JetStream publisher for job triggers.
#[derive(Clone)]
pub struct JobPublisher {
    js: Context,
    subject: String,
}

impl JobPublisher {
    /// Connect and make sure the job stream exists.
    pub async fn connect(
        nats_url: &str,
        subject: Option<&str>,
        stream_name: Option<&str>,
    ) -> Result<Self, NatsError> {
        let subject = subject.unwrap_or(DEFAULT_SUBJECT).to_string();
        let stream = stream_name.unwrap_or(DEFAULT_STREAM);

        let client = async_nats::connect(nats_url)
            .await
            .map_err(|e| NatsError::Connection(e.to_string()))?;
        let js = jetstream::new(client);

        ymm_worker::nats::ensure_stream(&js, stream, &subject)
            .await
            .map_err(|e| NatsError::JetStream(e.to_string()))?;

        Ok(Self { js, subject })
    }

    /// Publish a trigger and wait for the stream acknowledgement.
    pub async fn publish(&self, trigger: &JobTrigger) -> Result<(), NatsError> {
        let payload = encode(trigger)?;

        self.js
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| NatsError::Publish(e.to_string()))?
            .await
            .map_err(|e| NatsError::Publish(e.to_string()))?;

        tracing::debug!(
            job_id = %trigger.job_id,
            subject = %self.subject,
            "Published job trigger"
        );

        Ok(())
    }
}

fn encode(trigger: &JobTrigger) -> Result<Vec<u8>, NatsError> {
    serde_json::to_vec(trigger).map_err(|e| NatsError::Publish(format!("Serialization error: {}", e)))
}
