//! SQLite storage plumbing

mod database;
pub mod schema;

pub use database::Database;
