//! Core library for the task board
//!
//! This crate contains the core business logic, including:
//! - Task model, query options and paged results
//! - The task table persistence boundary and its storage engines
//! - The task service that owns every task read and write

pub mod clock;
pub mod error;
pub mod storage;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
