//! Application lifecycle control over DIAL and the session link.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ocast_core::dial::{AppState, DialService};
use ocast_core::error::{DialError, Error};
use ocast_session::{Driver, Module};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::browser::Browser;
use crate::stream::DataStream;

/// Service name of the receiver-side web application channel.
pub const SERVICE_WEBAPP: &str = "org.ocast.webapp";

const KEY_NAME: &str = "name";
const KEY_CONNECTION_STATUS: &str = "connectionStatus";
const KEY_PARAMS: &str = "params";
const KEY_STATUS: &str = "status";
const STATE_CONNECTED: &str = "connected";

const CONNECTED_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives start/join/stop of a receiver application.
///
/// Starting combines the DIAL POST with an asynchronous wait for the
/// application's `connectionStatus: connected` event on the session link;
/// HTTP success alone is not success.
pub struct ApplicationController {
    service: RwLock<DialService>,
    driver: Arc<dyn Driver>,
    browser: Arc<Browser>,
    http: reqwest::Client,
    connected: watch::Sender<bool>,
    connected_timeout: Duration,
}

impl ApplicationController {
    pub fn new(service: DialService, driver: Arc<dyn Driver>) -> Arc<Self> {
        Self::with_connected_timeout(service, driver, CONNECTED_TIMEOUT)
    }

    /// Build a controller with a custom connected-event timeout.
    pub fn with_connected_timeout(
        service: DialService,
        driver: Arc<dyn Driver>,
        connected_timeout: Duration,
    ) -> Arc<Self> {
        let browser = Browser::new(Arc::clone(&driver));
        let (connected, _) = watch::channel(false);
        let controller = Arc::new(ApplicationController {
            service: RwLock::new(service),
            driver,
            browser,
            http: reqwest::Client::builder()
                .connect_timeout(HTTP_CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
            connected,
            connected_timeout,
        });
        controller
            .browser
            .register_stream(Arc::clone(&controller) as Arc<dyn DataStream>);
        controller
    }

    /// Start the application.
    ///
    /// Opens the application module's link, POSTs the application resource
    /// (following a `201 Created` with a GET for the running description)
    /// and waits for the connected event before declaring success.
    pub async fn start(&self) -> Result<(), Error> {
        let (base_url, additional_data) = {
            let service = self.service.read().await;
            (service.base_url.clone(), service.additional_data.clone())
        };
        self.driver
            .connect(Module::Application, additional_data.as_ref())
            .await?;

        // Arm the connected wait before the receiver can answer.
        self.connected.send_replace(false);
        let mut connected = self.connected.subscribe();

        let response = self
            .http
            .post(base_url.clone())
            .body("")
            .send()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;
        // A created application is re-fetched from the application resource
        // itself; this is redirect-by-convention, not an HTTP redirect.
        let response = if response.status() == StatusCode::CREATED {
            self.http
                .get(base_url.clone())
                .send()
                .await
                .map_err(|e| DialError::NetworkError(e.to_string()))?
        } else {
            response
        };
        let body = read_dial_response(response).await?;

        let wait = tokio::time::timeout(self.connected_timeout, async {
            loop {
                if *connected.borrow_and_update() {
                    break;
                }
                if connected.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        if wait.is_err() {
            return Err(DialError::Timeout.into());
        }

        let service = DialService::parse(&base_url, &body)
            .map_err(|e| DialError::InternalError(e.to_string()))?;
        *self.service.write().await = service;
        Ok(())
    }

    /// Join an application that is already running.
    pub async fn join(&self) -> Result<(), Error> {
        let (base_url, additional_data) = {
            let service = self.service.read().await;
            (service.base_url.clone(), service.additional_data.clone())
        };
        self.driver
            .connect(Module::Application, additional_data.as_ref())
            .await?;

        let response = self
            .http
            .get(base_url.clone())
            .send()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;
        let body = read_dial_response(response).await?;
        let service = DialService::parse(&base_url, &body)
            .map_err(|e| DialError::InternalError(e.to_string()))?;
        if service.state != AppState::Running {
            return Err(DialError::ApplicationNotRunning.into());
        }
        *self.service.write().await = service;
        Ok(())
    }

    /// Stop the running application instance and release the module.
    pub async fn stop(&self) -> Result<(), Error> {
        let run_link = self
            .service
            .read()
            .await
            .run_link
            .clone()
            .ok_or(DialError::ApplicationNotRunning)?;
        let response = self
            .http
            .delete(run_link)
            .send()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))?;
        read_dial_response(response).await?;
        self.driver.disconnect(Module::Application).await?;
        Ok(())
    }

    /// Register a feature stream with the browser registry.
    pub fn manage_stream(&self, stream: Arc<dyn DataStream>) {
        self.browser.register_stream(stream);
    }

    /// Send a message to the web application.
    pub async fn send_message(&self, message: Value) -> Result<Value, Error> {
        self.browser.send_data(SERVICE_WEBAPP, message).await
    }

    /// Snapshot of the last fetched application description.
    pub async fn service(&self) -> DialService {
        self.service.read().await.clone()
    }

    pub fn browser(&self) -> &Arc<Browser> {
        &self.browser
    }

    fn is_connected_event(message: &Value) -> bool {
        message.get(KEY_NAME).and_then(Value::as_str) == Some(KEY_CONNECTION_STATUS)
            && message
                .get(KEY_PARAMS)
                .and_then(|params| params.get(KEY_STATUS))
                .and_then(Value::as_str)
                == Some(STATE_CONNECTED)
    }
}

#[async_trait]
impl DataStream for ApplicationController {
    fn service_name(&self) -> &str {
        SERVICE_WEBAPP
    }

    async fn on_message(&self, message: Value) {
        if Self::is_connected_event(&message) {
            debug!("application reported connected");
            self.connected.send_replace(true);
        }
    }
}

/// Map a DIAL response per protocol: 2xx yields the body, 404 means the
/// application resource does not exist, anything else is internal.
pub(crate) async fn read_dial_response(response: reqwest::Response) -> Result<String, DialError> {
    let status = response.status();
    if status.is_success() {
        response
            .text()
            .await
            .map_err(|e| DialError::NetworkError(e.to_string()))
    } else if status == StatusCode::NOT_FOUND {
        Err(DialError::ApplicationNotFound)
    } else {
        Err(DialError::InternalError(format!(
            "status {}",
            status.as_u16()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        http_response, running_service_xml, serve_script, stopped_service_xml, RecordingDriver,
    };
    use serde_json::json;
    use url::Url;

    fn service_at(addr: std::net::SocketAddr, run_link: Option<&str>) -> DialService {
        let base_url = Url::parse(&format!("http://{addr}/apps/org.ocast.webapp")).unwrap();
        DialService {
            base_url: base_url.clone(),
            name: SERVICE_WEBAPP.to_string(),
            state: AppState::Unknown,
            run_link: run_link.map(|link| base_url.join(link).unwrap()),
            additional_data: None,
        }
    }

    fn connected_event() -> Value {
        json!({"name": "connectionStatus", "params": {"status": "connected"}})
    }

    mod start {
        use super::*;

        #[tokio::test]
        async fn http_success_without_connected_event_is_a_timeout() {
            let addr = serve_script(vec![
                http_response("201 Created", ""),
                http_response("200 OK", running_service_xml()),
            ])
            .await;
            let driver = Arc::new(RecordingDriver::default());
            let controller = ApplicationController::with_connected_timeout(
                service_at(addr, None),
                driver,
                Duration::from_millis(100),
            );

            let result = controller.start().await;
            assert!(matches!(result, Err(Error::Dial(DialError::Timeout))));
        }

        #[tokio::test]
        async fn start_succeeds_once_the_connected_event_arrives() {
            let addr = serve_script(vec![
                http_response("201 Created", ""),
                http_response("200 OK", running_service_xml()),
            ])
            .await;
            let driver = Arc::new(RecordingDriver::default());
            let controller = ApplicationController::with_connected_timeout(
                service_at(addr, None),
                driver.clone(),
                Duration::from_secs(2),
            );

            let signaller = Arc::clone(&controller);
            tokio::spawn(async move {
                signaller.on_message(connected_event()).await;
            });

            controller.start().await.unwrap();

            // The running description replaced the initial snapshot.
            let service = controller.service().await;
            assert_eq!(service.state, AppState::Running);
            assert!(service.run_link.is_some());
            assert_eq!(
                driver.connects.lock().unwrap().as_slice(),
                &[Module::Application]
            );
        }

        #[tokio::test]
        async fn missing_application_maps_to_not_found() {
            let addr = serve_script(vec![http_response("404 Not Found", "")]).await;
            let controller = ApplicationController::with_connected_timeout(
                service_at(addr, None),
                Arc::new(RecordingDriver::default()),
                Duration::from_millis(100),
            );

            let result = controller.start().await;
            assert!(matches!(
                result,
                Err(Error::Dial(DialError::ApplicationNotFound))
            ));
        }

        #[tokio::test]
        async fn other_http_errors_map_to_internal() {
            let addr = serve_script(vec![http_response("503 Service Unavailable", "")]).await;
            let controller = ApplicationController::with_connected_timeout(
                service_at(addr, None),
                Arc::new(RecordingDriver::default()),
                Duration::from_millis(100),
            );

            let result = controller.start().await;
            assert!(matches!(
                result,
                Err(Error::Dial(DialError::InternalError(_)))
            ));
        }

        #[tokio::test]
        async fn unreachable_endpoint_is_a_network_error() {
            // Nothing listens on port 9.
            let service = DialService {
                base_url: Url::parse("http://127.0.0.1:9/apps/org.ocast.webapp").unwrap(),
                name: SERVICE_WEBAPP.to_string(),
                state: AppState::Unknown,
                run_link: None,
                additional_data: None,
            };
            let controller = ApplicationController::with_connected_timeout(
                service,
                Arc::new(RecordingDriver::default()),
                Duration::from_millis(100),
            );

            let result = controller.start().await;
            assert!(matches!(
                result,
                Err(Error::Dial(DialError::NetworkError(_)))
            ));
        }
    }

    mod join {
        use super::*;

        #[tokio::test]
        async fn join_succeeds_when_the_application_runs() {
            let addr =
                serve_script(vec![http_response("200 OK", running_service_xml())]).await;
            let driver = Arc::new(RecordingDriver::default());
            let controller =
                ApplicationController::new(service_at(addr, None), driver.clone());

            controller.join().await.unwrap();
            assert_eq!(controller.service().await.state, AppState::Running);
        }

        #[tokio::test]
        async fn join_fails_when_the_application_is_stopped() {
            let addr =
                serve_script(vec![http_response("200 OK", stopped_service_xml())]).await;
            let controller = ApplicationController::new(
                service_at(addr, None),
                Arc::new(RecordingDriver::default()),
            );

            let result = controller.join().await;
            assert!(matches!(
                result,
                Err(Error::Dial(DialError::ApplicationNotRunning))
            ));
        }
    }

    mod stop {
        use super::*;

        #[tokio::test]
        async fn stop_without_a_run_link_is_not_running() {
            let controller = ApplicationController::new(
                service_at("127.0.0.1:9".parse().unwrap(), None),
                Arc::new(RecordingDriver::default()),
            );

            let result = controller.stop().await;
            assert!(matches!(
                result,
                Err(Error::Dial(DialError::ApplicationNotRunning))
            ));
        }

        #[tokio::test]
        async fn stop_deletes_the_run_link_and_releases_the_module() {
            let addr = serve_script(vec![http_response("200 OK", "")]).await;
            let driver = Arc::new(RecordingDriver::default());
            let controller =
                ApplicationController::new(service_at(addr, Some("run")), driver.clone());

            controller.stop().await.unwrap();
            assert_eq!(
                driver.disconnects.lock().unwrap().as_slice(),
                &[Module::Application]
            );
        }
    }

    mod messaging {
        use super::*;

        #[tokio::test]
        async fn send_message_goes_through_the_browser_envelope() {
            let controller = ApplicationController::new(
                service_at("127.0.0.1:9".parse().unwrap(), None),
                Arc::new(RecordingDriver::default()),
            );

            let reply = controller.send_message(json!({"name": "ping"})).await.unwrap();
            assert_eq!(reply, json!({}));
        }
    }

    mod connected_event_detection {
        use super::*;

        #[test]
        fn recognizes_the_connected_event() {
            assert!(ApplicationController::is_connected_event(&connected_event()));
        }

        #[test]
        fn rejects_other_statuses_and_names() {
            assert!(!ApplicationController::is_connected_event(
                &json!({"name": "connectionStatus", "params": {"status": "disconnected"}})
            ));
            assert!(!ApplicationController::is_connected_event(
                &json!({"name": "playbackStatus", "params": {"status": "connected"}})
            ));
            assert!(!ApplicationController::is_connected_event(&json!({})));
        }
    }
}
