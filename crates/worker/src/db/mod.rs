//! PostgreSQL persistence for jobs, step state and project files.

pub mod models;
pub mod pool;
pub mod queries;
mod store;

pub use pool::{create_pool, health_check, DbPool};
pub use store::PgStore;
