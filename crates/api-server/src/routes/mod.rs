//! Route handlers

pub mod health;
pub mod task;
