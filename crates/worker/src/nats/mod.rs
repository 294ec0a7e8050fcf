//! NATS JetStream integration.

mod subscriber;

pub use subscriber::{ensure_stream, NatsSubscriber};

/// Default subject for job triggers.
pub const DEFAULT_SUBJECT: &str = "ymm.jobs";

/// Default JetStream stream name.
pub const DEFAULT_STREAM: &str = "ymm_jobs";
