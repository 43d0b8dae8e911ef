use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::KvStore;
use crate::codec::Records;
use crate::errors::StoreError;

/// In-process record set under the same shared-read / exclusive-write
/// discipline as `FileStore`. Nothing is persisted.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_records(records: Records) -> Arc<Self> {
        Arc::new(Self { inner: RwLock::new(records) })
    }

    /// Copy of the current record set.
    pub async fn snapshot(&self) -> Records {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        let map = self.inner.read().await;
        Ok(map.get(key).cloned().unwrap_or_default())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut map = self.inner.write().await;
        map.remove(key);
        Ok(())
    }
}
