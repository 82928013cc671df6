//! Storage abstraction and implementations for Stepwise.
//!
//! This crate provides the trait-based interfaces the progression engine
//! consumes, with in-memory and JSON-file backends and an optional SQLite
//! backend behind the `sqlite` feature.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
#[cfg(feature = "json")]
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{LearnerStore, ProgressStore, ProjectCatalog, Result, StorageError};
pub use memory::MemoryStorage;
#[cfg(feature = "json")]
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
