//! Shared fixtures for the crate's tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ocast_core::dial::AdditionalData;
use ocast_core::error::SessionError;
use ocast_session::{BrowserListener, Driver, Module};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Serve scripted HTTP responses, one connection per entry.
pub(crate) async fn serve_script(responses: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut buffer = [0u8; 4096];
            let _ = stream.read(&mut buffer).await;
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    addr
}

pub(crate) fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

pub(crate) fn running_service_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<service xmlns="urn:dial-multiscreen-org:schemas:dial" xmlns:ocast="urn:cast-ocast-org:service:cast:1">
  <name>org.ocast.webapp</name>
  <state>running</state>
  <link rel="run" href="run"/>
  <additionalData>
    <ocast:X_OCAST_App2AppURL>wss://192.168.1.48:4433/ocast</ocast:X_OCAST_App2AppURL>
  </additionalData>
</service>"#
}

pub(crate) fn stopped_service_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<service xmlns="urn:dial-multiscreen-org:schemas:dial">
  <name>org.ocast.webapp</name>
  <state>stopped</state>
</service>"#
}

/// Driver stub recording module bindings.
#[derive(Default)]
pub(crate) struct RecordingDriver {
    pub(crate) connects: Mutex<Vec<Module>>,
    pub(crate) disconnects: Mutex<Vec<Module>>,
}

#[async_trait]
impl Driver for RecordingDriver {
    async fn connect(
        &self,
        module: Module,
        _additional_data: Option<&AdditionalData>,
    ) -> Result<(), SessionError> {
        self.connects.lock().unwrap().push(module);
        Ok(())
    }

    async fn disconnect(&self, module: Module) -> Result<(), SessionError> {
        self.disconnects.lock().unwrap().push(module);
        Ok(())
    }

    async fn send_browser_data(&self, _data: Value) -> Result<Value, SessionError> {
        Ok(json!({"data": {}}))
    }

    async fn send_settings_data(
        &self,
        _module: Module,
        _domain: &str,
        _data: Value,
    ) -> Result<Value, SessionError> {
        Ok(json!({}))
    }

    fn register_browser(&self, _listener: Arc<dyn BrowserListener>) {}
}
