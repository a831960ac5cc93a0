//! Drives the device driver when the demanded stream set changes.
//!
//! The coordinator performs the slow, fallible I/O half of a
//! reconfiguration. The caller decides *what* the device should look like
//! (via [`crate::DeviceConfigStore`]) under its lock, releases the lock,
//! and then asks the coordinator to make it so.

use std::sync::Arc;

use depthcast_protocol::StreamConfig;
use tracing::{info, warn};

use crate::store::{has_point_cloud, same_physical, RemovalPlan};
use crate::{DeviceDriver, DeviceError};

pub struct DeviceStreamCoordinator<D: DeviceDriver> {
    driver: Arc<D>,
}

impl<D: DeviceDriver> Clone for DeviceStreamCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<D: DeviceDriver> DeviceStreamCoordinator<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    /// Move `device_id` from `previous` to `configs`.
    ///
    /// Stops the device first if it was configured before, then starts it
    /// with the physical subset of `configs`. When the physical subset is
    /// unchanged (only `pointcloud` came or went) the device keeps running.
    /// Point-cloud computation is switched when `pointcloud` appears or
    /// disappears.
    ///
    /// Not atomic: on error the device may be stopped. The caller is
    /// responsible for rolling back its reference counts.
    pub async fn apply(
        &self,
        device_id: &str,
        previous: Option<&[StreamConfig]>,
        configs: &[StreamConfig],
    ) -> Result<(), DeviceError> {
        let restart = previous.is_none_or(|previous| !same_physical(previous, configs));

        if restart {
            if previous.is_some() {
                self.driver.stop_stream(device_id).await?;
            }
            let physical: Vec<StreamConfig> =
                configs.iter().filter(|c| c.is_physical()).cloned().collect();
            self.driver
                .start_stream(device_id, &physical)
                .await
                .map_err(|e| match e {
                    DeviceError::StartFailed { .. } => e,
                    other => DeviceError::StartFailed {
                        device_id: device_id.to_string(),
                        reason: other.to_string(),
                    },
                })?;
        }

        let had_point_cloud = previous.is_some_and(has_point_cloud);
        let wants_point_cloud = has_point_cloud(configs);
        if had_point_cloud != wants_point_cloud {
            self.driver
                .activate_point_cloud(device_id, wants_point_cloud)?;
        }

        info!(
            device_id,
            stream_count = configs.len(),
            restarted = restart && previous.is_some(),
            "device stream configured"
        );
        Ok(())
    }

    /// Apply a [`RemovalPlan`]: stop the device if nothing remains,
    /// otherwise move it to the remaining configs.
    ///
    /// If the restart fails, one attempt is made to restore the previous
    /// configuration before the original error is returned.
    pub async fn remove_types(&self, device_id: &str, plan: &RemovalPlan) -> Result<(), DeviceError> {
        if plan.stops_device() {
            if has_point_cloud(&plan.previous) {
                if let Err(e) = self.driver.activate_point_cloud(device_id, false) {
                    warn!(device_id, error = %e, "failed to disable point cloud");
                }
            }
            self.driver.stop_stream(device_id).await?;
            info!(device_id, "device stream stopped, no remaining stream types");
            return Ok(());
        }

        match self
            .apply(device_id, Some(&plan.previous), &plan.remaining)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(device_id, error = %e, "device restart failed, restoring previous configuration");
                if let Err(restore_err) = self
                    .apply(device_id, Some(&plan.remaining), &plan.previous)
                    .await
                {
                    warn!(device_id, error = %restore_err, "restoring previous configuration failed");
                }
                Err(e)
            }
        }
    }
}
