//! Device record persistence.
//!
//! The gateway only ever needs four operations from its backing store, so the
//! seam is a small synchronous trait. Two adaptors ship with the crate:
//! [`SledDeviceStore`] for durable deployments and [`MemDeviceStore`] for
//! tests and throwaway gateways.

mod mem_store;
mod sled_store;

pub use mem_store::*;
pub use sled_store::*;


#[cfg(test)]
use mockall::automock;

use crate::DeviceRecord;
use crate::Result;

#[cfg_attr(test, automock)]
pub trait DeviceStore: Send + Sync + 'static {
    /// Client ids of every persisted device.
    fn load_all_client_ids(&self) -> Result<Vec<String>>;

    fn load_device(
        &self,
        client_id: &str,
    ) -> Result<Option<DeviceRecord>>;

    /// Inserts or replaces the record stored under its client id.
    fn save_device(
        &self,
        record: &DeviceRecord,
    ) -> Result<()>;

    /// Removing an absent record is not an error.
    fn remove_device(
        &self,
        client_id: &str,
    ) -> Result<()>;

    /// Drops every stored record.
    fn clear(&self) -> Result<()>;
}
