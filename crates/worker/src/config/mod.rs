//! Configuration loaded from the environment.

mod database;
mod worker;

pub use database::DatabaseConfig;
pub use worker::WorkerConfig;
