//! Message routing registry keyed by service name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ocast_core::error::{Error, ParseError};
use ocast_session::{BrowserListener, Driver};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::stream::DataStream;

const KEY_SERVICE: &str = "service";
const KEY_DATA: &str = "data";

/// Demultiplexes inbound browser frames to registered data streams and
/// wraps outbound service data into the browser envelope.
pub struct Browser {
    driver: Arc<dyn Driver>,
    streams: RwLock<HashMap<String, Arc<dyn DataStream>>>,
}

impl Browser {
    /// Create the registry and hook it into `driver`'s browser events.
    pub fn new(driver: Arc<dyn Driver>) -> Arc<Self> {
        let browser = Arc::new(Browser {
            driver,
            streams: RwLock::new(HashMap::new()),
        });
        browser
            .driver
            .register_browser(Arc::clone(&browser) as Arc<dyn BrowserListener>);
        browser
    }

    pub fn register_stream(&self, stream: Arc<dyn DataStream>) {
        if let Ok(mut streams) = self.streams.write() {
            streams.insert(stream.service_name().to_owned(), stream);
        }
    }

    pub fn unregister_stream(&self, service_name: &str) {
        if let Ok(mut streams) = self.streams.write() {
            streams.remove(service_name);
        }
    }

    /// Send `data` for `service` over the application link, unwrapping the
    /// reply envelope.
    pub async fn send_data(&self, service: &str, data: Value) -> Result<Value, Error> {
        let envelope = json!({ KEY_SERVICE: service, KEY_DATA: data });
        let reply = self.driver.send_browser_data(envelope).await?;
        reply
            .get(KEY_DATA)
            .cloned()
            .ok_or_else(|| Error::Parse(ParseError::MissingField(KEY_DATA)))
    }
}

#[async_trait]
impl BrowserListener for Browser {
    async fn on_data(&self, data: Value) {
        let Some(service) = data.get(KEY_SERVICE).and_then(Value::as_str) else {
            warn!("browser frame without a service key");
            return;
        };
        let Some(message) = data.get(KEY_DATA) else {
            warn!("browser frame without a data member");
            return;
        };
        let stream = self
            .streams
            .read()
            .ok()
            .and_then(|streams| streams.get(service).cloned());
        match stream {
            Some(stream) => stream.on_message(message.clone()).await,
            None => debug!("no stream registered for service {service}"),
        }
    }
}
