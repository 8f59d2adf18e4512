//! Last-known status per device.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::types::DeviceStatusRecord;

/// Shared registry of device status records keyed by device id.
///
/// Writes are last-write-wins and entries are never deleted.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    records: Arc<Mutex<HashMap<String, DeviceStatusRecord>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_status(&self, device_id: impl Into<String>, record: DeviceStatusRecord) {
        self.lock().insert(device_id.into(), record);
    }

    pub fn get_status(&self, device_id: &str) -> Option<DeviceStatusRecord> {
        self.lock().get(device_id).cloned()
    }

    /// Owned snapshot of every record, ordered by device id.
    pub fn all_statuses(&self) -> BTreeMap<String, DeviceStatusRecord> {
        self.lock()
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Replace the record for `device_id` with `f(previous)` under one lock.
    pub fn upsert_with<F>(&self, device_id: &str, f: F) -> DeviceStatusRecord
    where
        F: FnOnce(Option<&DeviceStatusRecord>) -> DeviceStatusRecord,
    {
        let mut records = self.lock();
        let next = f(records.get(device_id));
        records.insert(device_id.to_string(), next.clone());
        next
    }

    /// At least one device has reported.
    pub fn is_ready(&self) -> bool {
        !self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DeviceStatusRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
