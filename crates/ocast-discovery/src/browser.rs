//! High-level discovery facade.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use ocast_core::error::DiscoveryError;
use ocast_core::Device;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::Stream;
use tracing::warn;

use crate::inventory::{BrowseEvent, DeviceInventory};
use crate::resolver::{DescriptionResolver, Resolve};
use crate::scanner::{DiscoveryScanner, Reliability, ScanSignal};
use crate::traits::{Discovery, DiscoveryListener};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Discovers OCast receivers and maintains the device inventory.
///
/// Wires the scanner's found/lost signals into the inventory and fans the
/// resulting added/removed notifications out to the registered listener and
/// to [`DeviceBrowser::browse`] streams.
pub struct DeviceBrowser {
    scanner: DiscoveryScanner,
    inventory: Arc<DeviceInventory>,
    listener: Arc<RwLock<Option<Arc<dyn DiscoveryListener>>>>,
    events: broadcast::Sender<BrowseEvent>,
    // Receivers handed to the pump tasks on first start.
    pump: Mutex<Option<(mpsc::UnboundedReceiver<ScanSignal>, mpsc::UnboundedReceiver<BrowseEvent>)>>,
}

impl DeviceBrowser {
    /// Create a browser for the given search targets.
    pub fn new(
        targets: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, DiscoveryError> {
        Self::with_resolver(targets, Arc::new(DescriptionResolver::new()?))
    }

    /// Create a browser with a custom description resolver.
    pub fn with_resolver(
        targets: impl IntoIterator<Item = impl Into<String>>,
        resolver: Arc<dyn Resolve>,
    ) -> Result<Self, DiscoveryError> {
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(DeviceBrowser {
            scanner: DiscoveryScanner::new(targets, scan_tx),
            inventory: Arc::new(DeviceInventory::new(resolver, event_tx)),
            listener: Arc::new(RwLock::new(None)),
            events: broadcast_tx,
            pump: Mutex::new(Some((scan_rx, event_rx))),
        })
    }

    /// Register the listener receiving added/removed notifications.
    pub fn set_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(listener);
        }
    }

    pub fn is_running(&self) -> bool {
        self.scanner.is_running()
    }

    /// Change the reliability parameters, restarting the probe cadence
    /// without losing inventory state.
    pub fn set_reliability(&self, reliability: Reliability) {
        self.scanner.set_reliability(reliability);
    }

    /// Continuous stream of added/removed events.
    ///
    /// Every call returns an independent subscription; slow consumers may
    /// miss events once the channel lags.
    pub fn browse(&self) -> impl Stream<Item = BrowseEvent> + Send {
        let mut events = self.events.subscribe();
        async_stream::stream! {
            loop {
                match events.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("browse stream lagged, {missed} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    fn start_pumps(&self) {
        let Ok(mut pump) = self.pump.lock() else {
            return;
        };
        let Some((mut scan_rx, mut event_rx)) = pump.take() else {
            return;
        };

        // Scanner signals into the inventory. Resolutions run concurrently;
        // the inventory's own lock keeps the index consistent.
        let inventory = Arc::clone(&self.inventory);
        tokio::spawn(async move {
            while let Some(signal) = scan_rx.recv().await {
                match signal {
                    ScanSignal::Found(location) => {
                        let inventory = Arc::clone(&inventory);
                        tokio::spawn(async move { inventory.on_found(&location).await });
                    }
                    ScanSignal::Lost(location) => inventory.on_lost(&location).await,
                }
            }
        });

        // Inventory events out to the listener and the browse streams.
        let listener = Arc::clone(&self.listener);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let _ = events.send(event.clone());
                let registered = listener.read().ok().and_then(|slot| slot.clone());
                if let Some(listener) = registered {
                    match &event {
                        BrowseEvent::Added(device) => listener.on_device_added(device).await,
                        BrowseEvent::Removed(device) => listener.on_device_removed(device).await,
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Discovery for DeviceBrowser {
    async fn start(&self, reliability: Reliability) {
        self.start_pumps();
        self.scanner.start(reliability);
    }

    async fn stop(&self) {
        self.scanner.stop();
    }

    async fn scan(&self, timeout: Duration) -> Vec<Device> {
        self.start(Reliability {
            timeout,
            ..Reliability::HIGH
        })
        .await;
        tokio::time::sleep(timeout).await;
        self.stop().await;
        self.devices().await
    }

    async fn device_by_uuid(&self, uuid: &str) -> Option<Device> {
        self.inventory.device_by_uuid(uuid).await
    }

    async fn devices(&self) -> Vec<Device> {
        self.inventory.devices().await
    }
}
