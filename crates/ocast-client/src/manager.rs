//! Per-device facade and the driver-factory registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ocast_core::dial::DialService;
use ocast_core::error::{DialError, Error, ParseError, SessionError};
use ocast_core::Device;
use ocast_session::{Driver, DriverListener, Failure, Module, SslConfig};
use tracing::debug;
use url::Url;

use crate::application::{read_dial_response, ApplicationController};

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure surfaced by a device manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailure {
    DeviceLost,
}

/// Observer for device-level failures.
#[async_trait]
pub trait DeviceManagerListener: Send + Sync {
    async fn on_failure(&self, failure: DeviceFailure);
}

/// Creates drivers for a device family.
pub trait DriverFactory: Send + Sync {
    fn create(
        &self,
        device: &Device,
        listener: Arc<dyn DriverListener>,
        ssl: Option<SslConfig>,
    ) -> Arc<dyn Driver>;
}

/// Registry mapping manufacturer ids to driver factories.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<String, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, manufacturer: impl Into<String>, factory: Arc<dyn DriverFactory>) {
        self.factories.insert(manufacturer.into(), factory);
    }

    fn create(
        &self,
        device: &Device,
        listener: Arc<dyn DriverListener>,
        ssl: Option<SslConfig>,
    ) -> Option<Arc<dyn Driver>> {
        self.factories
            .get(&device.manufacturer)
            .map(|factory| factory.create(device, listener, ssl))
    }
}

/// Forwards driver failures to the manager's owner.
struct ManagerRelay {
    listener: Arc<dyn DeviceManagerListener>,
}

#[async_trait]
impl DriverListener for ManagerRelay {
    async fn on_failure(&self, failure: Failure) {
        debug!("driver failure: {failure:?}");
        match failure {
            Failure::Lost => self.listener.on_failure(DeviceFailure::DeviceLost).await,
        }
    }
}

/// Facade over one discovered device: owns its driver and hands out
/// application controllers and settings bindings.
pub struct DeviceManager {
    device: Device,
    driver: Arc<dyn Driver>,
    http: reqwest::Client,
}

impl DeviceManager {
    /// Create a manager for `device`, using the factory registered for its
    /// manufacturer.
    pub fn new(
        registry: &DriverRegistry,
        device: Device,
        listener: Arc<dyn DeviceManagerListener>,
        ssl: Option<SslConfig>,
    ) -> Result<Self, Error> {
        let relay = Arc::new(ManagerRelay { listener });
        let driver = registry
            .create(&device, relay, ssl)
            .ok_or_else(|| SessionError::NoDriver(device.manufacturer.clone()))?;
        Ok(DeviceManager {
            device,
            driver,
            http: reqwest::Client::builder()
                .connect_timeout(HTTP_CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn driver(&self) -> Arc<dyn Driver> {
        Arc::clone(&self.driver)
    }

    /// Fetch the DIAL description of `app_id` and build its controller.
    pub async fn application_controller(
        &self,
        app_id: &str,
    ) -> Result<Arc<ApplicationController>, Error> {
        let url = application_url(&self.device, app_id)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;
        let body = read_dial_response(response).await?;
        let service = DialService::parse(&url, &body)
            .map_err(|e| DialError::InternalError(e.to_string()))?;
        Ok(ApplicationController::new(service, Arc::clone(&self.driver)))
    }

    pub async fn connect_public_settings(&self) -> Result<(), Error> {
        Ok(self.driver.connect(Module::PublicSettings, None).await?)
    }

    pub async fn release_public_settings(&self) -> Result<(), Error> {
        Ok(self.driver.disconnect(Module::PublicSettings).await?)
    }

    pub async fn connect_private_settings(&self) -> Result<(), Error> {
        Ok(self.driver.connect(Module::PrivateSettings, None).await?)
    }

    pub async fn release_private_settings(&self) -> Result<(), Error> {
        Ok(self.driver.disconnect(Module::PrivateSettings).await?)
    }
}

fn application_url(device: &Device, app_id: &str) -> Result<Url, Error> {
    let base = device.dial_url.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/{app_id}"))
        .map_err(|e| ParseError::InvalidUrl(format!("{base}/{app_id}: {e}")).into())
}
