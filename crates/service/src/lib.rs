//! Storage layer for the key-value server.
//! - `codec` turns a record set into its persisted JSON form and back.
//! - `storage` owns the load/mutate/save cycle and its locking.
//! - `errors` carries the I/O and decode failures up to the HTTP layer.

pub mod codec;
pub mod errors;
pub mod storage;

pub use codec::Records;
pub use errors::StoreError;
pub use storage::{FileStore, KvStore, MemoryStore};
