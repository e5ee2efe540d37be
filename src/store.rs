//! ProgressStore trait and its RocksDB / in-memory implementations
//!
//! One checkpoint record per scan unit, addressed by `"<chain>:<protocol>"`.
//! A missing record is a valid state and reads back as the zero checkpoint.

use crate::error::ScanError;
use crate::keys::{decode_checkpoint_key, encode_checkpoint_key};
use crate::records::{Checkpoint, ScanUnitKey};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

/// Persists scan progress per scan unit.
///
/// Disjoint keys may be read and written concurrently. Each scan unit is the
/// only writer of its own key, so no cross-key coordination is needed.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Get the checkpoint for a scan unit.
    ///
    /// Returns the zero checkpoint if none was ever written (no error).
    async fn get_checkpoint(&self, key: &ScanUnitKey) -> Result<Checkpoint, ScanError>;

    /// Store the checkpoint for a scan unit.
    async fn set_checkpoint(
        &self,
        key: &ScanUnitKey,
        checkpoint: Checkpoint,
    ) -> Result<(), ScanError>;
}

const CHECKPOINTS_CF: &str = "checkpoints";

/// RocksDB-backed implementation of ProgressStore.
///
/// Records live in the `checkpoints` column family, postcard-encoded.
pub struct RocksProgressStore {
    db: DB,
}

impl RocksProgressStore {
    /// Open or create a RocksDB database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![ColumnFamilyDescriptor::new(
            CHECKPOINTS_CF,
            Options::default(),
        )];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    fn get_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CHECKPOINTS_CF)
            .with_context(|| format!("Column family '{}' not found", CHECKPOINTS_CF))
    }

    /// Read a checkpoint record, `None` if absent.
    pub fn read(&self, key: &ScanUnitKey) -> Result<Option<Checkpoint>> {
        let cf = self.get_cf()?;
        match self
            .db
            .get_cf(cf, encode_checkpoint_key(key))
            .context("Failed to get checkpoint")?
        {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .with_context(|| format!("Failed to deserialize checkpoint for {}", key))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Write a checkpoint record.
    pub fn write(&self, key: &ScanUnitKey, checkpoint: &Checkpoint) -> Result<()> {
        let cf = self.get_cf()?;
        let value = postcard::to_allocvec(checkpoint).context("Failed to serialize checkpoint")?;
        self.db
            .put_cf(cf, encode_checkpoint_key(key), &value)
            .context("Failed to put checkpoint")?;
        Ok(())
    }

    /// Remove a checkpoint record so the unit restarts from height 0.
    pub fn delete_checkpoint(&self, key: &ScanUnitKey) -> Result<()> {
        let cf = self.get_cf()?;
        self.db
            .delete_cf(cf, encode_checkpoint_key(key))
            .context("Failed to delete checkpoint")?;
        Ok(())
    }

    /// All stored checkpoints, ordered by key.
    pub fn list_checkpoints(&self) -> Result<Vec<(ScanUnitKey, Checkpoint)>> {
        let cf = self.get_cf()?;
        let mut out = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let unit = decode_checkpoint_key(&key).context("Failed to decode checkpoint key")?;
            let checkpoint: Checkpoint = postcard::from_bytes(&value)
                .with_context(|| format!("Failed to deserialize checkpoint for {}", unit))?;
            out.push((unit, checkpoint));
        }
        Ok(out)
    }
}

#[async_trait]
impl ProgressStore for RocksProgressStore {
    async fn get_checkpoint(&self, key: &ScanUnitKey) -> Result<Checkpoint, ScanError> {
        Ok(self.read(key).map_err(ScanError::store)?.unwrap_or_default())
    }

    async fn set_checkpoint(
        &self,
        key: &ScanUnitKey,
        checkpoint: Checkpoint,
    ) -> Result<(), ScanError> {
        self.write(key, &checkpoint).map_err(ScanError::store)
    }
}

/// In-memory checkpoint store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryProgressStore {
    data: Mutex<BTreeMap<ScanUnitKey, Checkpoint>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored checkpoint, `None` if the key was never written.
    pub fn peek(&self, key: &ScanUnitKey) -> Option<Checkpoint> {
        self.data.lock().ok()?.get(key).copied()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get_checkpoint(&self, key: &ScanUnitKey) -> Result<Checkpoint, ScanError> {
        let data = self
            .data
            .lock()
            .map_err(|_| ScanError::store(anyhow::anyhow!("checkpoint map poisoned")))?;
        Ok(data.get(key).copied().unwrap_or_default())
    }

    async fn set_checkpoint(
        &self,
        key: &ScanUnitKey,
        checkpoint: Checkpoint,
    ) -> Result<(), ScanError> {
        let mut data = self
            .data
            .lock()
            .map_err(|_| ScanError::store(anyhow::anyhow!("checkpoint map poisoned")))?;
        data.insert(key.clone(), checkpoint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksProgressStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksProgressStore::open(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_missing_checkpoint_returns_zero() {
        let (store, _temp_dir) = create_test_store();
        let key = ScanUnitKey::new("Ethereum", "EtherFi");

        let cp = store.get_checkpoint(&key).await.unwrap();
        assert_eq!(cp, Checkpoint::default());
        assert_eq!(store.read(&key).unwrap(), None);
    }

    #[tokio::test]
    async fn test_checkpoint_set_get() {
        let (store, _temp_dir) = create_test_store();
        let key = ScanUnitKey::new("Ethereum", "EtherFi");

        store.set_checkpoint(&key, Checkpoint::new(100, 2)).await.unwrap();
        assert_eq!(store.get_checkpoint(&key).await.unwrap(), Checkpoint::new(100, 2));

        // Last write wins
        store.set_checkpoint(&key, Checkpoint::new(101, 0)).await.unwrap();
        assert_eq!(store.get_checkpoint(&key).await.unwrap(), Checkpoint::new(101, 0));
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let (store, _temp_dir) = create_test_store();
        let a = ScanUnitKey::new("Ethereum", "EtherFi");
        let b = ScanUnitKey::new("Arbitrum", "EtherFi");

        store.set_checkpoint(&a, Checkpoint::new(7, 1)).await.unwrap();
        assert_eq!(store.get_checkpoint(&b).await.unwrap(), Checkpoint::default());
    }

    #[test]
    fn test_checkpoint_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let key = ScanUnitKey::new("Ethereum", "EtherFi");
        {
            let store = RocksProgressStore::open(temp_dir.path()).unwrap();
            store.write(&key, &Checkpoint::new(55, 3)).unwrap();
        }
        let store = RocksProgressStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.read(&key).unwrap(), Some(Checkpoint::new(55, 3)));
    }

    #[test]
    fn test_list_and_delete() {
        let (store, _temp_dir) = create_test_store();
        let a = ScanUnitKey::new("Arbitrum", "EtherFi");
        let b = ScanUnitKey::new("Ethereum", "EtherFi");
        store.write(&b, &Checkpoint::new(2, 0)).unwrap();
        store.write(&a, &Checkpoint::new(1, 4)).unwrap();

        let all = store.list_checkpoints().unwrap();
        assert_eq!(
            all,
            vec![(a.clone(), Checkpoint::new(1, 4)), (b.clone(), Checkpoint::new(2, 0))]
        );

        store.delete_checkpoint(&a).unwrap();
        assert_eq!(store.read(&a).unwrap(), None);
        assert_eq!(store.list_checkpoints().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryProgressStore::new();
        let key = ScanUnitKey::new("Ethereum", "EtherFi");
        assert_eq!(store.peek(&key), None);
        assert_eq!(store.get_checkpoint(&key).await.unwrap(), Checkpoint::default());

        store.set_checkpoint(&key, Checkpoint::new(3, 1)).await.unwrap();
        assert_eq!(store.peek(&key), Some(Checkpoint::new(3, 1)));
    }
}
