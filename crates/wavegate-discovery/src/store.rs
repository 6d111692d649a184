//! In-memory device store.
//!
//! One record per device id. All mutations go through [`DeviceStore::update`],
//! which holds the per-key shard lock for the duration of the closure, so a
//! sighting and an approval racing on the same id serialize instead of
//! interleaving.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::device::{DeviceRecord, DeviceType, Membership, Protocol};

/// Optional filters for device listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub protocol: Option<Protocol>,
    pub device_type: Option<DeviceType>,
    pub manufacturer: Option<String>,
}

impl DeviceFilter {
    pub fn matches(&self, record: &DeviceRecord) -> bool {
        if let Some(protocol) = self.protocol {
            if record.protocol != protocol {
                return false;
            }
        }
        if let Some(device_type) = self.device_type {
            if record.device_type != device_type {
                return false;
            }
        }
        if let Some(manufacturer) = &self.manufacturer {
            if !record.manufacturer.eq_ignore_ascii_case(manufacturer) {
                return false;
            }
        }
        true
    }
}

/// Counts per membership set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipCounts {
    pub discovered: usize,
    pub pending: usize,
    pub integrated: usize,
    pub rejected: usize,
}

impl MembershipCounts {
    pub fn total(&self) -> usize {
        self.discovered + self.pending + self.integrated + self.rejected
    }
}

/// Indexed store of device records keyed by device id.
#[derive(Default)]
pub struct DeviceStore {
    devices: DashMap<String, DeviceRecord>,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self {
            devices: DashMap::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Insert a record if its id is novel. Returns false if it already
    /// existed (the caller should refresh instead).
    pub fn insert_new(&self, record: DeviceRecord) -> bool {
        match self.devices.entry(record.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(record);
                true
            }
        }
    }

    /// Clone the record for an id.
    pub fn get(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.get(id).map(|r| r.clone())
    }

    /// Mutate a record under its shard lock. Returns `None` if the id is
    /// unknown.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut DeviceRecord) -> R) -> Option<R> {
        self.devices.get_mut(id).map(|mut record| f(&mut record))
    }

    /// Remove a record, returning it.
    pub fn remove(&self, id: &str) -> Option<DeviceRecord> {
        self.devices.remove(id).map(|(_, record)| record)
    }

    /// Clone all records in a membership set, optionally filtered.
    pub fn list(&self, membership: Membership, filter: &DeviceFilter) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .devices
            .iter()
            .filter(|r| r.membership() == membership && filter.matches(r))
            .map(|r| r.clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Clone every record.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.devices.iter().map(|r| r.clone()).collect()
    }

    /// Ids of records matching a predicate. Used by sweeps so the
    /// iteration lock is released before any per-id mutation.
    pub fn ids_where(&self, predicate: impl Fn(&DeviceRecord) -> bool) -> Vec<String> {
        self.devices
            .iter()
            .filter(|r| predicate(r))
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn counts(&self) -> MembershipCounts {
        let mut counts = MembershipCounts::default();
        for record in self.devices.iter() {
            match record.membership() {
                Membership::Discovered => counts.discovered += 1,
                Membership::Pending => counts.pending += 1,
                Membership::Integrated => counts.integrated += 1,
                Membership::Rejected => counts.rejected += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceStatus, RawDescriptor};
    use chrono::Utc;

    fn record(address: &str) -> DeviceRecord {
        let descriptor = RawDescriptor::new(Protocol::Ble, address);
        DeviceRecord::from_descriptor(&descriptor, Utc::now())
    }

    #[test]
    fn test_insert_new_rejects_duplicates() {
        let store = DeviceStore::new();
        assert!(store.insert_new(record("a")));
        assert!(!store.insert_new(record("a")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_each_id_in_exactly_one_membership_set() {
        let store = DeviceStore::new();
        for (i, status) in [
            DeviceStatus::Discovered,
            DeviceStatus::Quarantined,
            DeviceStatus::PendingApproval,
            DeviceStatus::Integrated,
            DeviceStatus::Rejected,
        ]
        .iter()
        .enumerate()
        {
            let mut rec = record(&format!("addr-{i}"));
            rec.status = *status;
            store.insert_new(rec);
        }

        let counts = store.counts();
        assert_eq!(counts.total(), store.len());
        // Quarantined counts as discovered.
        assert_eq!(counts.discovered, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.integrated, 1);
        assert_eq!(counts.rejected, 1);
    }

    #[test]
    fn test_update_mutates_in_place() {
        let store = DeviceStore::new();
        let rec = record("a");
        let id = rec.id.clone();
        store.insert_new(rec);

        let prev = store.update(&id, |r| {
            let prev = r.status;
            r.status = DeviceStatus::Integrated;
            prev
        });
        assert_eq!(prev, Some(DeviceStatus::Discovered));
        assert_eq!(store.get(&id).unwrap().status, DeviceStatus::Integrated);
    }

    #[test]
    fn test_list_filters() {
        let store = DeviceStore::new();
        let mut a = record("a");
        a.device_type = DeviceType::Sensor;
        let mut b = record("b");
        b.device_type = DeviceType::SmartLight;
        store.insert_new(a);
        store.insert_new(b);

        let filter = DeviceFilter {
            device_type: Some(DeviceType::Sensor),
            ..Default::default()
        };
        let listed = store.list(Membership::Discovered, &filter);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].device_type, DeviceType::Sensor);
    }
}
