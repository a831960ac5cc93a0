//! Periodic eviction of stale sessions.

use std::time::Duration;

use depthcast_device::DeviceDriver;
use depthcast_tick::TickScheduler;
use depthcast_transport::RtcEngine;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::WeakStreamManager;

/// Sweep every `interval` until cancelled or the manager is dropped.
///
/// Holds only a weak handle, so a forgotten manager is not kept alive by
/// its own reaper.
pub(crate) async fn run<D: DeviceDriver, E: RtcEngine>(
    weak: WeakStreamManager<D, E>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = TickScheduler::every(interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticks.wait_for_tick() => {}
        }

        let Some(manager) = weak.upgrade() else {
            break;
        };
        let evicted = manager.reap_now().await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), sessions = ?evicted, "reaped stale sessions");
        }
        ticks.record_tick_end();
    }
    debug!("reaper stopped");
}
