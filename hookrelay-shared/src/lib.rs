//! # Hookrelay Shared Library
//!
//! This crate contains the types, database layer, and scheduling logic shared
//! between the Hookrelay worker and the REST façade that fronts it.
//!
//! ## Module Organization
//!
//! - `models`: database models, the task state machine, and the retry policy
//! - `db`: connection pool and migrations
//! - `cron`: 5-field cron parsing and next-fire computation

pub mod cron;
pub mod db;
pub mod models;

/// Current version of the Hookrelay shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
