use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt, sync::RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::KvStore;
use crate::codec::{self, Records};
use crate::errors::StoreError;

/// JSON file-backed key-value store.
///
/// The data file is the only source of truth: every operation reloads it,
/// and every mutation rewrites it whole. One store-wide `RwLock` orders the
/// callers in this process:
/// - `get` and `load` hold it shared;
/// - `set`, `delete`, `update` and `save` hold it exclusive for the whole
///   load/mutate/save sequence, so concurrent writers never drop each other's keys.
///
/// Saves go to a sibling temp file that is synced and then renamed over the
/// data file; the directory is synced after the rename. A successful write
/// is on disk, and a crash mid-write leaves the previous version intact.
/// Other processes writing the same file are not coordinated with.
pub struct FileStore {
    dir: PathBuf,
    file_name: String,
    file_path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    /// Build a store over `<dir>/<file_name>`. Nothing touches the disk until the first call.
    pub fn new<P: Into<PathBuf>>(dir: P, file_name: &str) -> Arc<Self> {
        let dir = dir.into();
        let file_path = dir.join(file_name);
        Arc::new(Self { dir, file_name: file_name.to_string(), file_path, lock: RwLock::new(()) })
    }

    pub fn data_path(&self) -> &Path {
        &self.file_path
    }

    /// Read and decode the current record set, creating an empty data file if needed.
    pub async fn load(&self) -> Result<Records, StoreError> {
        let _guard = self.lock.read().await;
        self.read_records().await
    }

    /// Replace the data file with `records`.
    pub async fn save(&self, records: &Records) -> Result<(), StoreError> {
        let _guard = self.lock.write().await;
        self.write_records(records).await
    }

    /// Apply one mutation to a freshly loaded snapshot and persist it.
    pub async fn update<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Records) + Send,
    {
        let _guard = self.lock.write().await;
        let mut records = self.read_records().await?;
        f(&mut records);
        self.write_records(&records).await
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).await.map_err(|e| StoreError::io(&self.dir, e))
    }

    async fn read_records(&self) -> Result<Records, StoreError> {
        self.ensure_dir().await?;
        let bytes = match fs::read(&self.file_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.file_path.display(), "data file missing; initializing empty record set");
                let empty = codec::encode(&Records::new());
                self.replace_file(&empty).await?;
                empty
            }
            Err(e) => return Err(StoreError::io(&self.file_path, e)),
        };
        codec::decode(&bytes).map_err(|e| {
            warn!(path = %self.file_path.display(), error = %e, "data file failed to decode");
            StoreError::from(e)
        })
    }

    async fn write_records(&self, records: &Records) -> Result<(), StoreError> {
        self.ensure_dir().await?;
        let bytes = codec::encode(records);
        self.replace_file(&bytes).await?;
        debug!(path = %self.file_path.display(), records = records.len(), bytes = bytes.len(), "record set saved");
        Ok(())
    }

    async fn replace_file(&self, bytes: &[u8]) -> Result<(), StoreError> {
        // unique per call: readers may initialize a missing file concurrently
        let tmp = self.dir.join(format!(".{}.{}.tmp", self.file_name, Uuid::new_v4()));
        if let Err(e) = write_synced(&tmp, bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.file_path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::io(&self.file_path, e));
        }
        sync_dir(&self.dir).await.map_err(|e| StoreError::io(&self.dir, e))
    }

    fn is_temp_name(&self, name: &str) -> bool {
        name.strip_prefix('.')
            .and_then(|rest| rest.strip_prefix(self.file_name.as_str()))
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| rest.ends_with(".tmp"))
    }

    /// Delete temp files left by a process that died between write and rename.
    /// Returns how many were removed. A missing directory means nothing to clean.
    pub async fn remove_stale_temp_files(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.write().await;
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&self.dir, e))? {
            let name = entry.file_name();
            if !name.to_str().is_some_and(|n| self.is_temp_name(n)) {
                continue;
            }
            let path = entry.path();
            fs::remove_file(&path).await.map_err(|e| StoreError::io(&path, e))?;
            warn!(path = %path.display(), "removed stale temp file");
            removed += 1;
        }
        Ok(removed)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

// Persist the rename itself; directories cannot be opened for syncing on Windows.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>, StoreError> {
        let records = self.load().await?;
        Ok(records.get(key).cloned().unwrap_or_default())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.update(|records| {
            records.insert(key.to_vec(), value.to_vec());
        })
        .await
    }

    async fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.update(|records| {
            records.remove(key);
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE, Engine as _};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("file_store_{}", Uuid::new_v4()))
    }

    fn records(pairs: &[(&[u8], &[u8])]) -> Records {
        pairs.iter().map(|(k, v)| (k.to_vec(), v.to_vec())).collect()
    }

    async fn dir_names(dir: &Path) -> Result<Vec<String>, anyhow::Error> {
        let mut entries = fs::read_dir(dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    #[tokio::test]
    async fn get_set_delete_cycle() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");

        assert_eq!(store.get(b"hell").await?, b"");

        store.set(b"hell", b"world").await?;
        assert_eq!(store.get(b"hell").await?, b"world");

        store.delete(b"hell").await?;
        assert_eq!(store.get(b"hell").await?, b"");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn fresh_store_creates_nested_dir_and_empty_file() -> Result<(), anyhow::Error> {
        let root = temp_dir();
        let dir = root.join("nested").join("deeper");
        let store = FileStore::new(&dir, "data.json");

        assert!(store.get(b"any-key").await?.is_empty());
        assert_eq!(fs::read(store.data_path()).await?, b"{}");

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn delete_of_absent_key_succeeds() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");

        store.set(b"kept", b"yes").await?;
        store.delete(b"never-written").await?;
        assert_eq!(store.get(b"kept").await?, b"yes");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn binary_keys_and_values_survive() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");
        let png_head = [0x89u8, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0xff];

        store.set(b"img", &png_head).await?;
        store.set(&[0xffu8, 0xfe], b"odd key").await?;

        let reopened = FileStore::new(&dir, "data.json");
        assert_eq!(reopened.get(b"img").await?, png_head);
        assert_eq!(reopened.get(&[0xffu8, 0xfe]).await?, b"odd key");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn reads_hand_written_file() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await?;
        let encoded: std::collections::HashMap<String, String> = [("key1", "value1"), ("key2", "value2")]
            .iter()
            .map(|(k, v)| (URL_SAFE.encode(k), URL_SAFE.encode(v)))
            .collect();
        fs::write(dir.join("data.json"), serde_json::to_vec(&encoded)?).await?;

        let store = FileStore::new(&dir, "data.json");
        assert_eq!(store.get(b"key1").await?, b"value1");
        assert_eq!(store.get(b"key2").await?, b"value2");
        assert!(store.get(b"key3").await?.is_empty());

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn file_with_binary_value_stays_readable() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await?;
        // "bin" -> 0xff, "key1" -> "value1"
        fs::write(dir.join("data.json"), br#"{"Ymlu":"_w==","a2V5MQ==":"dmFsdWUx"}"#).await?;

        let store = FileStore::new(&dir, "data.json");
        assert_eq!(store.get(b"key1").await?, b"value1");
        assert_eq!(store.get(b"bin").await?, [0xffu8]);

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn save_replaces_whole_record_set() -> Result<(), anyhow::Error> {
        let root = temp_dir();
        let dir = root.join("created-by-save");
        let store = FileStore::new(&dir, "data.json");

        let first = records(&[(b"a", b"1"), (b"b", &[0x00, 0xff])]);
        store.save(&first).await?;
        assert_eq!(store.load().await?, first);

        // a second save overwrites, it does not merge
        let second = records(&[(b"c", b"3")]);
        store.save(&second).await?;
        assert_eq!(store.load().await?, second);
        assert!(store.get(b"a").await?.is_empty());

        assert_eq!(dir_names(&dir).await?, vec!["data.json".to_string()]);

        let _ = fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn state_survives_a_new_store_instance() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");
        store.set("ünï".as_bytes(), b"line\nbreak \"quoted\"").await?;
        drop(store);

        let reopened = FileStore::new(&dir, "data.json");
        assert_eq!(reopened.get("ünï".as_bytes()).await?, b"line\nbreak \"quoted\"");
        assert_eq!(reopened.load().await?.len(), 1);

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn every_call_rereads_the_file() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");
        store.set(b"a", b"1").await?;

        // an out-of-band replacement is visible on the next call
        fs::write(store.data_path(), codec::encode(&records(&[(b"b", b"2")]))).await?;

        assert!(store.get(b"a").await?.is_empty());
        assert_eq!(store.get(b"b").await?, b"2");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn corrupted_file_fails_every_operation() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join("data.json"), b"{\"truncated").await?;
        let store = FileStore::new(&dir, "data.json");

        assert!(matches!(store.load().await, Err(e) if e.is_decode()));
        assert!(matches!(store.get(b"k").await, Err(e) if e.is_decode()));
        assert!(matches!(store.set(b"k", b"v").await, Err(e) if e.is_decode()));
        assert!(matches!(store.delete(b"k").await, Err(e) if e.is_decode()));

        // the failed mutations must not have overwritten the file
        assert_eq!(fs::read(dir.join("data.json")).await?, b"{\"truncated");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn invalid_alphabet_is_a_decode_error() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join("data.json"), br#"{"not base64!":"dmFsdWUx"}"#).await?;
        let store = FileStore::new(&dir, "data.json");

        let err = store.get(b"k").await.unwrap_err();
        assert!(err.is_decode(), "unexpected error: {err}");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn unwritable_dir_is_an_io_error() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        fs::create_dir_all(&dir).await?;
        // a regular file where the storage directory should be
        let blocker = dir.join("blocker");
        fs::write(&blocker, b"").await?;
        let store = FileStore::new(blocker.join("sub"), "data.json");

        let err = store.get(b"k").await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }), "unexpected error: {err}");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn stale_temp_files_are_removed() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");
        store.set(b"k", b"v").await?;

        fs::write(dir.join(format!(".data.json.{}.tmp", Uuid::new_v4())), b"{\"half").await?;
        fs::write(dir.join(format!(".data.json.{}.tmp", Uuid::new_v4())), b"").await?;
        // unrelated files stay
        fs::write(dir.join(".other.json.x.tmp"), b"").await?;
        fs::write(dir.join("notes.tmp"), b"").await?;

        assert_eq!(store.remove_stale_temp_files().await?, 2);
        assert_eq!(
            dir_names(&dir).await?,
            vec![".other.json.x.tmp".to_string(), "data.json".to_string(), "notes.tmp".to_string()]
        );
        assert_eq!(store.get(b"k").await?, b"v");

        let missing = FileStore::new(temp_dir(), "data.json");
        assert_eq!(missing.remove_stale_temp_files().await?, 0);

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sets_to_distinct_keys_are_all_kept() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.set(format!("key-{i}").as_bytes(), format!("value-{i}").as_bytes()).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let records = store.load().await?;
        assert_eq!(records.len(), 32);
        for i in 0..32 {
            assert_eq!(
                records.get(format!("key-{i}").as_bytes()),
                Some(&format!("value-{i}").into_bytes())
            );
        }

        // no temp files left behind
        assert_eq!(dir_names(&dir).await?, vec!["data.json".to_string()]);

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }

    #[tokio::test]
    async fn update_applies_closure_atomically() -> Result<(), anyhow::Error> {
        let dir = temp_dir();
        let store = FileStore::new(&dir, "data.json");
        store.set(b"counter", b"1").await?;

        store
            .update(|m| {
                if let Some(v) = m.get_mut(b"counter".as_slice()) {
                    *v = b"2".to_vec();
                }
                m.insert(b"other".to_vec(), b"x".to_vec());
            })
            .await?;

        assert_eq!(store.get(b"counter").await?, b"2");
        assert_eq!(store.get(b"other").await?, b"x");

        let _ = fs::remove_dir_all(&dir).await;
        Ok(())
    }
}
