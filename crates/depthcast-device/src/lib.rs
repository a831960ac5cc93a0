//! Camera stream coordination for depthcast.
//!
//! Many viewers share a few physical devices. This crate keeps the
//! device configuration equal to the union of what they demand.
//!
//! # Key types
//!
//! - [`DeviceDriver`]: the external camera driver
//! - [`StreamReferenceCounter`]: who holds which stream type
//! - [`DeviceConfigStore`]: what is configured on each device
//! - [`DeviceStreamCoordinator`]: applies configuration changes to the driver
//! - [`DeviceTrack`]: a media track reading one device stream

mod coordinator;
mod driver;
mod error;
mod references;
mod store;
mod track;

pub use coordinator::DeviceStreamCoordinator;
pub use driver::{DeviceDriver, FrameSource, PointCloudMetadata, StreamStatus};
pub use error::DeviceError;
pub use references::{EnsureOutcome, StreamReferenceCounter};
pub use store::{has_point_cloud, merge_configs, DeviceConfigStore, RemovalPlan};
pub use track::DeviceTrack;
