use std::path::Path;
use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;

use crate::constants::DEVICE_TREE;
use crate::DeviceRecord;
use crate::DeviceStore;
use crate::Result;
use crate::StorageError;

/// One sled tree, one JSON document per device keyed by client id.
#[derive(Clone)]
pub struct SledDeviceStore {
    db: Arc<sled::Db>,
    tree: Arc<sled::Tree>,
}

impl std::fmt::Debug for SledDeviceStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledDeviceStore")
            .field("tree_len", &self.tree.len())
            .finish()
    }
}

impl SledDeviceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref()).map_err(StorageError::SledError)?;
        info!("opened device store at {}", path.as_ref().display());
        Self::new(Arc::new(db))
    }

    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let tree = db.open_tree(DEVICE_TREE).map_err(StorageError::SledError)?;
        Ok(Self {
            db,
            tree: Arc::new(tree),
        })
    }

    fn flush(&self) -> Result<usize> {
        Ok(self.db.flush().map_err(StorageError::SledError)?)
    }

    fn flush_logged(&self) {
        match self.flush() {
            Ok(bytes) => debug!("flushed device store, {} bytes", bytes),
            Err(e) => error!("failed to flush device store: {}", e),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tree.len()
    }
}

impl DeviceStore for SledDeviceStore {
    fn load_all_client_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(self.tree.len());
        for key in self.tree.iter().keys() {
            let key = key.map_err(StorageError::SledError)?;
            ids.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(ids)
    }

    fn load_device(
        &self,
        client_id: &str,
    ) -> Result<Option<DeviceRecord>> {
        let Some(bytes) = self.tree.get(client_id).map_err(StorageError::SledError)? else {
            return Ok(None);
        };
        let record = serde_json::from_slice::<DeviceRecord>(&bytes).map_err(|source| {
            StorageError::Corrupted {
                client_id: client_id.to_string(),
                source,
            }
        })?;
        Ok(Some(record))
    }

    fn save_device(
        &self,
        record: &DeviceRecord,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(StorageError::Encode)?;
        self.tree
            .insert(record.client_id.as_bytes(), bytes)
            .map_err(StorageError::SledError)?;
        debug!(client_id = %record.client_id, "device record saved");
        self.flush_logged();
        Ok(())
    }

    fn remove_device(
        &self,
        client_id: &str,
    ) -> Result<()> {
        self.tree.remove(client_id).map_err(StorageError::SledError)?;
        debug!(%client_id, "device record removed");
        self.flush_logged();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.tree.clear().map_err(StorageError::SledError)?;
        self.flush_logged();
        Ok(())
    }
}
