//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared per-device fleet entries read by aggregation passes."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use pmfleet_common::DeviceConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Static device metadata used by filters and group keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub address: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_id: Option<u8>,
}

impl From<&DeviceConfig> for EntryInfo {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            pos: device.pos.clone(),
            container: device.container.clone(),
            address: device.address.clone(),
            port: device.port,
            unit_id: device.unit_id,
        }
    }
}

/// Outcome of the most recent polls. `snap` survives a failed poll.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastPoll {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snap: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetEntry {
    pub id: String,
    pub info: EntryInfo,
    #[serde(default)]
    pub last: LastPoll,
}

impl FleetEntry {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Device id → entry, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct FleetState {
    inner: Arc<RwLock<IndexMap<String, FleetEntry>>>,
}

impl FleetState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &str, info: EntryInfo) {
        self.inner.write().insert(
            id.to_owned(),
            FleetEntry {
                id: id.to_owned(),
                info,
                last: LastPoll::default(),
            },
        );
    }

    pub fn record_snapshot(&self, id: &str, snap: Value, ts: DateTime<Utc>) {
        if let Some(entry) = self.inner.write().get_mut(id) {
            entry.last = LastPoll {
                snap: Some(snap),
                ts: Some(ts),
                err: None,
            };
        }
    }

    /// Keep the previous snapshot and note why the latest poll failed.
    pub fn record_error(&self, id: &str, err: String) {
        if let Some(entry) = self.inner.write().get_mut(id) {
            entry.last.err = Some(err);
        }
    }

    pub fn get(&self, id: &str) -> Option<FleetEntry> {
        self.inner.read().get(id).cloned()
    }

    pub fn entries(&self) -> Vec<FleetEntry> {
        self.inner.read().values().cloned().collect()
    }

    /// Entries as JSON, the shape aggregation operators read.
    pub fn values(&self) -> Vec<Value> {
        self.inner.read().values().map(FleetEntry::to_value).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
