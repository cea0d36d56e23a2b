//! Durable adapters for the core key-value port.

pub mod file_store;

pub use file_store::{FileKeyValueStore, StorageError};
