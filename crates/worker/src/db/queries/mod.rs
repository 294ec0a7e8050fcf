//! Raw SQL queries, grouped by table.

pub mod job;
pub mod project_file;
pub mod step;
