//! Storage abstractions for service layer
//!
//! `FileStore` persists the whole record set to a single JSON file and
//! reloads it on every call. `MemoryStore` keeps the record set in process.
//! Handlers only see the `KvStore` trait, so the backing store can change
//! without touching the routing layer.

use async_trait::async_trait;

use crate::errors::StoreError;

pub mod file_store;
pub mod memory_store;

pub use file_store::FileStore;
pub use memory_store::MemoryStore;

/// Key-addressed get/set/delete over raw bytes. An absent key reads as an empty value.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError>;
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    /// Removing a key that does not exist is not an error.
    async fn delete(&self, key: &[u8]) -> Result<(), StoreError>;
}
