use std::collections::HashMap;

use parking_lot::RwLock;

use crate::DeviceRecord;
use crate::DeviceStore;
use crate::Result;

/// Volatile store. Records live only as long as the process.
#[derive(Debug, Default)]
pub struct MemDeviceStore {
    records: RwLock<HashMap<String, DeviceRecord>>,
}

impl MemDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl DeviceStore for MemDeviceStore {
    fn load_all_client_ids(&self) -> Result<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }

    fn load_device(
        &self,
        client_id: &str,
    ) -> Result<Option<DeviceRecord>> {
        Ok(self.records.read().get(client_id).cloned())
    }

    fn save_device(
        &self,
        record: &DeviceRecord,
    ) -> Result<()> {
        self.records.write().insert(record.client_id.clone(), record.clone());
        Ok(())
    }

    fn remove_device(
        &self,
        client_id: &str,
    ) -> Result<()> {
        self.records.write().remove(client_id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.records.write().clear();
        Ok(())
    }
}
