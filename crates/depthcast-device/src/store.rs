//! Bookkeeping of the physical configuration applied to each device.

use std::collections::{BTreeMap, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use depthcast_protocol::{DeviceStreamConfig, StreamConfig, StreamType};

/// Merge `new` into `existing`, deduplicating by stream type.
///
/// Existing entries win ties; new types are appended in order.
pub fn merge_configs(existing: &[StreamConfig], new: &[StreamConfig]) -> Vec<StreamConfig> {
    let mut merged = existing.to_vec();
    for config in new {
        if !merged.iter().any(|c| c.stream_type == config.stream_type) {
            merged.push(config.clone());
        }
    }
    merged
}

/// `true` if a `pointcloud` config is present.
pub fn has_point_cloud(configs: &[StreamConfig]) -> bool {
    configs.iter().any(|c| c.stream_type.is_point_cloud())
}

/// `true` if `a` and `b` ask the driver for the same physical streams,
/// in any order.
pub fn same_physical(a: &[StreamConfig], b: &[StreamConfig]) -> bool {
    let a: Vec<&StreamConfig> = a.iter().filter(|c| c.is_physical()).collect();
    let b: Vec<&StreamConfig> = b.iter().filter(|c| c.is_physical()).collect();
    a.len() == b.len() && a.iter().all(|c| b.contains(c))
}

/// The before/after of removing stream types from a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub previous: Vec<StreamConfig>,
    pub remaining: Vec<StreamConfig>,
}

impl RemovalPlan {
    /// `true` if nothing is left and the device should stop.
    pub fn stops_device(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[derive(Debug, Clone)]
struct DeviceEntry {
    configs: Vec<StreamConfig>,
    started_at: SystemTime,
}

/// `device → {configs, started_at}`.
///
/// Pure bookkeeping: the store records what was (or is about to be)
/// applied and never talks to the driver. An entry never holds an empty
/// config list.
#[derive(Debug, Default)]
pub struct DeviceConfigStore {
    devices: HashMap<String, DeviceEntry>,
}

impl DeviceConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configs(&self, device_id: &str) -> Option<&[StreamConfig]> {
        self.devices.get(device_id).map(|e| e.configs.as_slice())
    }

    /// Current configs for `device_id` merged with `new`.
    pub fn merged_with(&self, device_id: &str, new: &[StreamConfig]) -> Vec<StreamConfig> {
        merge_configs(self.configs(device_id).unwrap_or_default(), new)
    }

    /// What the device looks like after dropping `removed`.
    ///
    /// `None` if the device has no recorded configuration.
    pub fn removal_plan(&self, device_id: &str, removed: &[StreamType]) -> Option<RemovalPlan> {
        let previous = self.configs(device_id)?.to_vec();
        let remaining = previous
            .iter()
            .filter(|c| !removed.contains(&c.stream_type))
            .cloned()
            .collect();
        Some(RemovalPlan {
            previous,
            remaining,
        })
    }

    /// Record `configs` as applied. An empty list removes the entry.
    ///
    /// The start time is kept when the physical streams are unchanged,
    /// since the device does not restart for a `pointcloud` change.
    pub fn commit(&mut self, device_id: &str, configs: Vec<StreamConfig>) {
        if configs.is_empty() {
            self.devices.remove(device_id);
            return;
        }
        let started_at = match self.devices.get(device_id) {
            Some(entry) if same_physical(&entry.configs, &configs) => entry.started_at,
            _ => SystemTime::now(),
        };
        self.devices.insert(
            device_id.to_string(),
            DeviceEntry {
                configs,
                started_at,
            },
        );
    }

    pub fn started_at(&self, device_id: &str) -> Option<SystemTime> {
        self.devices.get(device_id).map(|e| e.started_at)
    }

    /// Put back a start time recorded earlier. No-op for unknown devices.
    pub fn restore_started_at(&mut self, device_id: &str, started_at: SystemTime) {
        if let Some(entry) = self.devices.get_mut(device_id) {
            entry.started_at = started_at;
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, DeviceStreamConfig> {
        self.devices
            .iter()
            .map(|(device, entry)| {
                let started_at = entry
                    .started_at
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default();
                (
                    device.clone(),
                    DeviceStreamConfig {
                        configs: entry.configs.clone(),
                        started_at,
                    },
                )
            })
            .collect()
    }
}
