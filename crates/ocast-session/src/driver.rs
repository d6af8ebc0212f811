//! Module-to-link binding and the reference driver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use ocast_core::dial::AdditionalData;
use ocast_core::error::SessionError;
use ocast_core::Device;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::link::SessionLink;
use crate::profile::{LinkProfile, SslConfig};
use crate::traits::{DriverEvent, Link, LinkListener};

/// Search target answered by OCast receivers.
pub const SEARCH_TARGET: &str = "urn:cast-ocast-org:service:cast:1";

/// Command domain answered by the device settings component.
pub const SETTINGS_DOMAIN: &str = "settings";

const SETTINGS_PORT: u16 = 4433;
const SETTINGS_PATH: &str = "ocast";
const BROWSER_DOMAIN: &str = "browser";

/// Logical functional channel multiplexed over a session link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Module {
    Application,
    PublicSettings,
    PrivateSettings,
}

/// Driver-level failure surfaced to the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// The device's link died while in use.
    Lost,
}

/// Observer for driver-level failures.
#[async_trait]
pub trait DriverListener: Send + Sync {
    async fn on_failure(&self, failure: Failure);
}

/// Receives inbound browser frames decoded from the application link.
#[async_trait]
pub trait BrowserListener: Send + Sync {
    async fn on_data(&self, data: Value);
}

/// Capability interface over a device's control session.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Bind `module`, opening its session link unless an existing link
    /// already serves the same endpoint.
    async fn connect(
        &self,
        module: Module,
        additional_data: Option<&AdditionalData>,
    ) -> Result<(), SessionError>;

    /// Unbind `module`, closing its link once no other module references it.
    async fn disconnect(&self, module: Module) -> Result<(), SessionError>;

    /// Send a browser payload on the application link.
    async fn send_browser_data(&self, data: Value) -> Result<Value, SessionError>;

    /// Send a settings payload on a settings link.
    async fn send_settings_data(
        &self,
        module: Module,
        domain: &str,
        data: Value,
    ) -> Result<Value, SessionError>;

    /// Register the sink for inbound browser events.
    fn register_browser(&self, listener: Arc<dyn BrowserListener>);
}

/// Forwards link signals to the driver's owner.
struct DriverRelay {
    listener: Arc<dyn DriverListener>,
    browser: RwLock<Option<Arc<dyn BrowserListener>>>,
}

#[async_trait]
impl LinkListener for DriverRelay {
    async fn on_failure(&self, error: SessionError) {
        debug!("link failure: {error}");
        self.listener.on_failure(Failure::Lost).await;
    }

    async fn on_event(&self, event: DriverEvent) {
        if event.source == BROWSER_DOMAIN {
            let registered = self.browser.read().ok().and_then(|slot| slot.clone());
            match registered {
                Some(browser) => browser.on_data(event.data).await,
                None => warn!("browser event with no registered listener"),
            }
        } else {
            trace!(source = %event.source, "event outside the browser domain");
        }
    }
}

type LinkFactory = dyn Fn(LinkProfile, Arc<dyn LinkListener>) -> Arc<dyn Link> + Send + Sync;

/// Reference driver for OCast receivers.
///
/// Settings modules share one `wss` endpoint on the device; the application
/// module connects to the app2app URL from the DIAL additional data. Links
/// are shared between modules bound to the same endpoint and closed only
/// when the last binding goes away.
pub struct ReferenceDriver {
    host: String,
    ssl: Option<SslConfig>,
    links: Mutex<HashMap<Module, Arc<dyn Link>>>,
    relay: Arc<DriverRelay>,
    link_factory: Box<LinkFactory>,
}

impl ReferenceDriver {
    pub fn new(
        device: &Device,
        listener: Arc<dyn DriverListener>,
        ssl: Option<SslConfig>,
    ) -> Self {
        Self::with_link_factory(
            device,
            listener,
            ssl,
            Box::new(|profile, listener| Arc::new(SessionLink::new(profile, listener))),
        )
    }

    pub(crate) fn with_link_factory(
        device: &Device,
        listener: Arc<dyn DriverListener>,
        ssl: Option<SslConfig>,
        link_factory: Box<LinkFactory>,
    ) -> Self {
        ReferenceDriver {
            host: device.host().to_owned(),
            ssl,
            links: Mutex::new(HashMap::new()),
            relay: Arc::new(DriverRelay {
                listener,
                browser: RwLock::new(None),
            }),
            link_factory,
        }
    }

    fn profile_for(
        &self,
        module: Module,
        additional_data: Option<&AdditionalData>,
    ) -> Result<LinkProfile, SessionError> {
        let profile = match module {
            Module::Application => {
                let data = additional_data.ok_or_else(|| {
                    SessionError::UnsupportedModule(
                        "application module requires dial additional data".to_owned(),
                    )
                })?;
                LinkProfile::new(data.app2app_url.clone())
            }
            Module::PublicSettings | Module::PrivateSettings => LinkProfile::new(format!(
                "wss://{}:{}/{}",
                self.host, SETTINGS_PORT, SETTINGS_PATH
            )),
        };
        Ok(match &self.ssl {
            Some(ssl) => profile.with_ssl(ssl.clone()),
            None => profile,
        })
    }

    fn bound_link(&self, module: Module) -> Result<Arc<dyn Link>, SessionError> {
        lock(&self.links)
            .get(&module)
            .cloned()
            .ok_or(SessionError::NotConnected)
    }
}

#[async_trait]
impl Driver for ReferenceDriver {
    async fn connect(
        &self,
        module: Module,
        additional_data: Option<&AdditionalData>,
    ) -> Result<(), SessionError> {
        let profile = self.profile_for(module, additional_data)?;

        let existing = lock(&self.links)
            .values()
            .find(|link| link.url() == profile.app2app_url())
            .cloned();
        let link = match existing {
            // Endpoint already open: bind without opening a new socket.
            Some(link) => link,
            None => {
                let listener: Arc<dyn LinkListener> = self.relay.clone();
                let link = (self.link_factory)(profile, listener);
                link.connect().await?;
                link
            }
        };
        lock(&self.links).insert(module, link);
        Ok(())
    }

    async fn disconnect(&self, module: Module) -> Result<(), SessionError> {
        let removable = {
            let links = lock(&self.links);
            let Some(link) = links.get(&module) else {
                return Ok(());
            };
            let shared = links
                .iter()
                .any(|(bound, other)| *bound != module && Arc::ptr_eq(other, link));
            (!shared).then(|| Arc::clone(link))
        };
        if let Some(link) = removable {
            link.disconnect().await?;
        }
        lock(&self.links).remove(&module);
        Ok(())
    }

    async fn send_browser_data(&self, data: Value) -> Result<Value, SessionError> {
        self.bound_link(Module::Application)?
            .send_payload(BROWSER_DOMAIN, data)
            .await
    }

    async fn send_settings_data(
        &self,
        module: Module,
        domain: &str,
        data: Value,
    ) -> Result<Value, SessionError> {
        if module == Module::Application {
            return Err(SessionError::UnsupportedModule(
                "settings payloads go to a settings module".to_owned(),
            ));
        }
        self.bound_link(module)?.send_payload(domain, data).await
    }

    fn register_browser(&self, listener: Arc<dyn BrowserListener>) {
        if let Ok(mut slot) = self.relay.browser.write() {
            *slot = Some(listener);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
