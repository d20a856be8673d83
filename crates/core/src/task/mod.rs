//! Task module
//!
//! This module contains task-related types, the task table boundary with
//! its storage engines, and the service that owns task reads and writes.

mod file_store;
mod model;
mod query;
mod repository;
mod seed;
mod service;
mod sqlite_store;

pub use file_store::FileTaskTable;
pub use model::*;
pub use query::*;
pub use repository::{ChangeSet, TaskChange, TaskTable, TaskUnitOfWork};
pub use seed::seed_default_tasks;
pub use service::TaskService;
pub use sqlite_store::SqliteTaskTable;
