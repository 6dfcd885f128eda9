//! Cached liveness checks for the services the depot sits next to.

pub mod cache;
pub mod probe;

pub use cache::{ServiceTarget, StatusCache, StatusSnapshot};
pub use probe::{DeviceStatusSource, HttpProber, ServiceProbe};
