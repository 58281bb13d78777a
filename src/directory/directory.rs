use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CheckMode;
use super::DeviceAttrs;
use super::DeviceRecord;
use super::DeviceStatus;
use super::LifeChecker;
use crate::metrics::track_status;
use crate::DeviceStore;
use crate::GatewayEvent;
use crate::LifecycleEvent;
use crate::ProtocolError;
use crate::Result;

/// A record plus the deadline that watches it.
#[derive(Debug)]
pub struct DeviceSlot {
    pub record: DeviceRecord,
    checker: LifeChecker,
}

/// What happened to a device that dropped offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineOutcome {
    /// Registered device: kept and persisted as offline.
    Persisted,
    /// Never finished registering: forgotten entirely.
    Removed,
    /// Device was not in a state that goes offline.
    Unchanged,
}

/// Known devices by client id, with a secondary index by mac.
///
/// Each record sits behind its own mutex; there is no directory-wide lock.
pub struct DeviceDirectory {
    devices: DashMap<String, Arc<Mutex<DeviceSlot>>>,
    by_mac: DashMap<String, BTreeSet<String>>,
    store: Arc<dyn DeviceStore>,
    expiry_tx: mpsc::UnboundedSender<LifecycleEvent>,
    events: broadcast::Sender<GatewayEvent>,
    sleep_grace: Duration,
}

impl std::fmt::Debug for DeviceDirectory {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("DeviceDirectory")
            .field("devices", &self.devices.len())
            .finish()
    }
}

impl DeviceDirectory {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        expiry_tx: mpsc::UnboundedSender<LifecycleEvent>,
        events: broadcast::Sender<GatewayEvent>,
        sleep_grace: Duration,
    ) -> Self {
        Self {
            devices: DashMap::new(),
            by_mac: DashMap::new(),
            store,
            expiry_tx,
            events,
            sleep_grace,
        }
    }

    fn slot(
        &self,
        client_id: &str,
    ) -> Option<Arc<Mutex<DeviceSlot>>> {
        self.devices.get(client_id).map(|entry| entry.value().clone())
    }

    fn emit(
        &self,
        event: GatewayEvent,
    ) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn index_mac(
        &self,
        mac: &str,
        client_id: &str,
    ) {
        if mac.is_empty() {
            return;
        }
        self.by_mac.entry(mac.to_string()).or_default().insert(client_id.to_string());
    }

    fn unindex_mac(
        &self,
        mac: &str,
        client_id: &str,
    ) {
        if let Some(mut ids) = self.by_mac.get_mut(mac) {
            ids.remove(client_id);
        }
        self.by_mac.remove_if(mac, |_, ids| ids.is_empty());
    }

    fn insert_slot(
        &self,
        record: DeviceRecord,
    ) -> Arc<Mutex<DeviceSlot>> {
        let client_id = record.client_id.clone();
        let mut checker = LifeChecker::new(&client_id, self.expiry_tx.clone());
        checker.arm(CheckMode::Liveness, Duration::from_secs(record.lifetime));

        self.index_mac(&record.mac, &client_id);
        track_status(None, Some(record.status));

        let slot = Arc::new(Mutex::new(DeviceSlot { record, checker }));
        if let Some(previous) = self.devices.insert(client_id.clone(), slot.clone()) {
            let mut previous = previous.lock();
            previous.checker.disarm();
            track_status(Some(previous.record.status), None);
            if previous.record.mac != slot.lock().record.mac {
                self.unindex_mac(&previous.record.mac, &client_id);
            }
        }
        slot
    }

    /// Creates the record for a newly registering device, replacing any
    /// previous record under the same client id. The device starts `online`
    /// with its liveness deadline armed.
    pub fn register(
        &self,
        client_id: &str,
        attrs: &DeviceAttrs,
    ) -> Result<DeviceRecord> {
        let Some(obj_list) = attrs.obj_list.clone() else {
            return Err(ProtocolError::InvalidArgument(format!(
                "register from {client_id} carries no object list"
            ))
            .into());
        };
        let record = DeviceRecord::new(client_id, obj_list, attrs);
        self.insert_slot(record.clone());
        info!(%client_id, mac = %record.mac, lifetime = record.lifetime, "device record created");
        Ok(record)
    }

    /// Loads every persisted record. Restored devices are `offline` until
    /// they prove liveness again.
    pub fn load_from_store(&self) -> Result<usize> {
        let mut loaded = 0;
        for client_id in self.store.load_all_client_ids()? {
            let Some(mut record) = self.store.load_device(&client_id)? else {
                warn!(%client_id, "listed device record is missing");
                continue;
            };
            record.status = DeviceStatus::Offline;
            self.insert_slot(record);
            loaded += 1;
        }
        info!("restored {} device records", loaded);
        Ok(loaded)
    }

    pub fn contains(
        &self,
        client_id: &str,
    ) -> bool {
        self.devices.contains_key(client_id)
    }

    /// Snapshot of a record.
    pub fn lookup(
        &self,
        client_id: &str,
    ) -> Option<DeviceRecord> {
        self.slot(client_id).map(|slot| slot.lock().record.clone())
    }

    pub fn lookup_by_mac(
        &self,
        mac: &str,
    ) -> Vec<DeviceRecord> {
        let ids: Vec<String> = self
            .by_mac
            .get(mac)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.lookup(id)).collect()
    }

    pub fn list(&self) -> Vec<DeviceRecord> {
        let slots: Vec<_> = self.devices.iter().map(|entry| entry.value().clone()).collect();
        let mut records: Vec<_> = slots.iter().map(|slot| slot.lock().record.clone()).collect();
        records.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        records
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Runs `f` against the live record under its lock.
    pub fn with_record<R>(
        &self,
        client_id: &str,
        f: impl FnOnce(&mut DeviceRecord) -> R,
    ) -> Option<R> {
        let slot = self.slot(client_id)?;
        let mut slot = slot.lock();
        let old_mac = slot.record.mac.clone();
        let result = f(&mut slot.record);
        if slot.record.mac != old_mac {
            self.unindex_mac(&old_mac, client_id);
            self.index_mac(&slot.record.mac, client_id);
        }
        Some(result)
    }

    /// Persists the current state of a record.
    pub fn persist(
        &self,
        client_id: &str,
    ) -> Result<()> {
        match self.lookup(client_id) {
            Some(record) => self.store.save_device(&record),
            None => Ok(()),
        }
    }

    /// Forgets a device: cancels its deadline, drops it from both indices and
    /// from persistence.
    pub fn remove(
        &self,
        client_id: &str,
    ) -> Result<Option<DeviceRecord>> {
        let removed = self.devices.remove(client_id).map(|(_, slot)| {
            let mut slot = slot.lock();
            slot.checker.disarm();
            slot.record.clone()
        });
        if let Some(record) = &removed {
            self.unindex_mac(&record.mac, client_id);
            track_status(Some(record.status), None);
            info!(%client_id, "device removed");
        }
        self.store.remove_device(client_id)?;
        Ok(removed)
    }

    /// Inbound traffic proves the device is alive: rearm its liveness
    /// deadline and wake it if it was sleeping or offline.
    pub fn touch_liveness(
        &self,
        client_id: &str,
    ) -> bool {
        let Some(slot) = self.slot(client_id) else {
            return false;
        };
        let mut slot = slot.lock();
        let lifetime = Duration::from_secs(slot.record.lifetime);
        slot.checker.arm(CheckMode::Liveness, lifetime);
        self.transition(&mut slot.record, DeviceStatus::Online);
        true
    }

    /// Device declared it is going to sleep. The liveness deadline is
    /// suspended; with a known duration a sleep deadline (plus grace) is
    /// armed instead.
    pub fn enter_sleep(
        &self,
        client_id: &str,
        duration: Option<Duration>,
    ) -> bool {
        let Some(slot) = self.slot(client_id) else {
            return false;
        };
        let mut slot = slot.lock();
        match duration {
            Some(duration) => slot.checker.arm(CheckMode::Sleep, duration.saturating_add(self.sleep_grace)),
            None => slot.checker.disarm(),
        }
        self.transition(&mut slot.record, DeviceStatus::Sleeping);
        true
    }

    /// Sets a status directly. Entering `offline` cancels the deadline and
    /// persists the record; entering `online` rearms liveness.
    pub fn set_status(
        &self,
        client_id: &str,
        status: DeviceStatus,
    ) -> Result<bool> {
        let Some(slot) = self.slot(client_id) else {
            return Ok(false);
        };
        let snapshot = {
            let mut slot = slot.lock();
            match status {
                DeviceStatus::Online => {
                    let lifetime = Duration::from_secs(slot.record.lifetime);
                    slot.checker.arm(CheckMode::Liveness, lifetime);
                }
                DeviceStatus::Offline => slot.checker.disarm(),
                DeviceStatus::Sleeping => {}
            }
            self.transition(&mut slot.record, status);
            (status == DeviceStatus::Offline).then(|| slot.record.clone())
        };
        if let Some(record) = snapshot {
            self.store.save_device(&record)?;
        }
        Ok(true)
    }

    /// Takes a device offline after inactivity, a disconnect or a last will.
    /// A device that never finished registering is removed instead.
    pub fn go_offline(
        &self,
        client_id: &str,
    ) -> Result<OfflineOutcome> {
        let Some(record) = self.lookup(client_id) else {
            return Ok(OfflineOutcome::Unchanged);
        };
        if !record.is_registered() {
            self.remove(client_id)?;
            return Ok(OfflineOutcome::Removed);
        }
        if record.status == DeviceStatus::Offline {
            return Ok(OfflineOutcome::Unchanged);
        }
        self.set_status(client_id, DeviceStatus::Offline)?;
        Ok(OfflineOutcome::Persisted)
    }

    /// Handles a life checker expiry. Notices from an older arming are
    /// ignored.
    pub fn on_lifetime_expired(
        &self,
        client_id: &str,
        epoch: u64,
    ) -> Result<OfflineOutcome> {
        let Some(slot) = self.slot(client_id) else {
            return Ok(OfflineOutcome::Unchanged);
        };
        let expired = {
            let mut slot = slot.lock();
            if slot.checker.epoch() != epoch || !slot.checker.is_armed() {
                debug!(%client_id, epoch, "stale life checker expiry");
                return Ok(OfflineOutcome::Unchanged);
            }
            let mode = slot.checker.mode();
            slot.checker.disarm();
            match (mode, slot.record.status) {
                (Some(CheckMode::Liveness), DeviceStatus::Online) => true,
                (Some(CheckMode::Sleep), DeviceStatus::Sleeping) => true,
                (_, DeviceStatus::Offline) => !slot.record.is_registered(),
                _ => false,
            }
        };
        if !expired {
            return Ok(OfflineOutcome::Unchanged);
        }
        info!(%client_id, "device lifetime expired");
        self.go_offline(client_id)
    }

    /// Cancels every deadline. Used when the gateway stops.
    pub fn disarm_all(&self) {
        for entry in self.devices.iter() {
            entry.value().lock().checker.disarm();
        }
    }

    /// Drops every in-memory record without touching persistence.
    pub fn clear(&self) {
        let ids: Vec<String> = self.devices.iter().map(|entry| entry.key().clone()).collect();
        for client_id in ids {
            if let Some((_, slot)) = self.devices.remove(&client_id) {
                let mut slot = slot.lock();
                slot.checker.disarm();
                track_status(Some(slot.record.status), None);
            }
        }
        self.by_mac.clear();
    }

    pub(crate) fn store(&self) -> &Arc<dyn DeviceStore> {
        &self.store
    }

    fn transition(
        &self,
        record: &mut DeviceRecord,
        status: DeviceStatus,
    ) {
        if record.status == status {
            return;
        }
        debug!(client_id = %record.client_id, from = %record.status, to = %status, "status transition");
        track_status(Some(record.status), Some(status));
        record.status = status;
        self.emit(GatewayEvent::StatusChanged {
            client_id: record.client_id.clone(),
            status,
        });
    }
}
