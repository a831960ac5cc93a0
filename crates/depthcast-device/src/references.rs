//! Per-device, per-stream-type reference counting.
//!
//! Every live session holds one reference on each stream type it
//! requested. The physical device configuration only has to change when a
//! type gains its first holder or loses its last one, and this counter is
//! what detects those edges.
//!
//! `pointcloud` is computed from depth frames, so a `pointcloud` holder
//! also holds `depth`.
//!
//! The counter is plain data. The session manager keeps it behind its
//! single lock, which is what makes `ensure` and `release` atomic.

use std::collections::{BTreeMap, HashMap};

use depthcast_protocol::{StreamConfig, StreamType};

/// Result of [`StreamReferenceCounter::ensure`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// `true` if at least one type had no holder before this call.
    pub needs_reconfig: bool,
    /// Configurations for the newly referenced types, in request order.
    pub new_configs: Vec<StreamConfig>,
}

/// `device → stream type → refcount`. Zero entries never persist.
#[derive(Debug, Default)]
pub struct StreamReferenceCounter {
    counts: HashMap<String, BTreeMap<StreamType, usize>>,
}

/// Requested types plus the `depth` that each `pointcloud` implies.
fn expand(stream_types: &[StreamType]) -> impl Iterator<Item = StreamType> + '_ {
    stream_types.iter().flat_map(|&t| {
        let implied = t.is_point_cloud().then_some(StreamType::Depth);
        std::iter::once(t).chain(implied)
    })
}

impl StreamReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference per requested type on `device_id`.
    pub fn ensure(&mut self, device_id: &str, stream_types: &[StreamType]) -> EnsureOutcome {
        let device = self.counts.entry(device_id.to_string()).or_default();
        let mut outcome = EnsureOutcome::default();

        for t in expand(stream_types) {
            let count = device.entry(t).or_insert(0);
            if *count == 0 {
                outcome.needs_reconfig = true;
                outcome
                    .new_configs
                    .push(StreamConfig::for_type(device_id, t));
            }
            *count += 1;
        }

        if device.is_empty() {
            self.counts.remove(device_id);
        }
        outcome
    }

    /// Drop one reference per type. Returns the types whose count reached
    /// zero, in the order they were released.
    ///
    /// Types without a reference are ignored.
    pub fn release(&mut self, device_id: &str, stream_types: &[StreamType]) -> Vec<StreamType> {
        let Some(device) = self.counts.get_mut(device_id) else {
            return Vec::new();
        };

        let mut removed = Vec::new();
        for t in expand(stream_types) {
            let Some(count) = device.get_mut(&t) else {
                continue;
            };
            *count -= 1;
            if *count == 0 {
                device.remove(&t);
                removed.push(t);
            }
        }

        if device.is_empty() {
            self.counts.remove(device_id);
        }
        removed
    }

    pub fn count(&self, device_id: &str, stream_type: StreamType) -> usize {
        self.counts
            .get(device_id)
            .and_then(|d| d.get(&stream_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<StreamType, usize>> {
        self.counts
            .iter()
            .map(|(device, types)| (device.clone(), types.clone()))
            .collect()
    }
}
