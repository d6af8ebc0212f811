//! Authoritative set of currently-known devices.

use std::collections::HashMap;
use std::sync::Arc;

use ocast_core::Device;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, warn};
use url::Url;

use crate::resolver::Resolve;

/// Discovery notification delivered to consumers.
///
/// A device whose description changed is re-announced as [`BrowseEvent::Added`];
/// there is no separate "changed" notification.
#[derive(Debug, Clone)]
pub enum BrowseEvent {
    Added(Device),
    Removed(Device),
}

/// Thread-safe index of discovered devices, keyed by description location
/// and deduplicated by device uuid.
pub struct DeviceInventory {
    resolver: Arc<dyn Resolve>,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    events: mpsc::UnboundedSender<BrowseEvent>,
}

impl DeviceInventory {
    pub fn new(
        resolver: Arc<dyn Resolve>,
        events: mpsc::UnboundedSender<BrowseEvent>,
    ) -> Self {
        DeviceInventory {
            resolver,
            devices: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    /// Snapshot of every currently-known device.
    pub async fn devices(&self) -> Vec<Device> {
        self.devices.read().await.values().cloned().collect()
    }

    pub async fn device_by_uuid(&self, uuid: &str) -> Option<Device> {
        self.devices
            .read()
            .await
            .values()
            .find(|d| d.uuid == uuid)
            .cloned()
    }

    /// A probe response arrived for `location`: fetch its description and
    /// merge the result into the index.
    pub async fn on_found(&self, location: &str) {
        let url = match Url::parse(location) {
            Ok(url) => url,
            Err(e) => {
                warn!("ignoring unusable location {location}: {e}");
                return;
            }
        };
        match self.resolver.resolve(&url).await {
            Ok(device) => self.merge(location, device).await,
            // Some hardware misses description fetches now and then; the
            // device stays until it misses enough scan cycles.
            Err(e) => error!("could not fetch {location}: {e}"),
        }
    }

    /// The location missed too many scan cycles: drop its record.
    pub async fn on_lost(&self, location: &str) {
        let removed = self.devices.write().await.remove(location);
        if let Some(device) = removed {
            let _ = self.events.send(BrowseEvent::Removed(device));
        }
    }

    async fn merge(&self, location: &str, device: Device) {
        let mut devices = self.devices.write().await;
        let known = devices
            .values()
            .find(|d| d.same_identity(&device))
            .cloned();
        match known {
            None => {
                debug!("looks like a brand new device at {location}");
                devices.insert(location.to_owned(), device.clone());
                let _ = self.events.send(BrowseEvent::Added(device));
            }
            Some(known) if known != device => {
                debug!("looks like a device that changed");
                devices.insert(location.to_owned(), device.clone());
                let _ = self.events.send(BrowseEvent::Added(device));
            }
            // Unchanged: the scanner already refreshed its liveness.
            Some(_) => {}
        }
    }
}
