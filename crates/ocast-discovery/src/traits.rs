//! Trait definitions for device discovery (enables mocking in tests).

use std::time::Duration;

use async_trait::async_trait;
use ocast_core::Device;

use crate::scanner::Reliability;

/// Observer for inventory changes.
#[async_trait]
pub trait DiscoveryListener: Send + Sync {
    /// A device appeared, or an already-known device changed.
    async fn on_device_added(&self, device: &Device);
    /// A device stopped responding and was pruned.
    async fn on_device_removed(&self, device: &Device);
}

/// Trait for discovery implementations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Start continuous scanning at the given reliability.
    async fn start(&self, reliability: Reliability);

    /// Stop all scanning activity.
    async fn stop(&self);

    /// Perform a one-shot scan and collect the devices found within
    /// the timeout.
    async fn scan(&self, timeout: Duration) -> Vec<Device>;

    /// Get a specific device by uuid if currently known.
    async fn device_by_uuid(&self, uuid: &str) -> Option<Device>;

    /// Get all currently known devices.
    async fn devices(&self) -> Vec<Device>;
}
