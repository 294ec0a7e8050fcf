//! YMM Pipeline Worker
//!
//! Runs production pipeline jobs triggered over NATS.
//!
//! This crate provides:
//! - NATS JetStream subscriber for job triggers
//! - PostgreSQL adapters for step state, jobs and project files
//! - Job runner with per-job serialisation
//! - Environment-based configuration

pub mod config;
pub mod db;
pub mod error;
pub mod nats;
pub mod runner;
pub mod worker;

pub use config::{DatabaseConfig, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use runner::{JobRunner, RunError};
pub use worker::Worker;
