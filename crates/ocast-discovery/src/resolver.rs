//! HTTP retrieval of device description documents.

use std::time::Duration;

use async_trait::async_trait;
use ocast_core::error::DiscoveryError;
use ocast_core::Device;
use tracing::debug;
use url::Url;

use crate::parser;

const APP_DIAL_URL_HEADER: &str = "Application-DIAL-URL";
const APP_URL_HEADER: &str = "Application-URL";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Seam for device description resolution.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Fetch and parse the description document at `location`.
    async fn resolve(&self, location: &Url) -> Result<Device, DiscoveryError>;
}

/// Fetches device description documents over HTTP.
pub struct DescriptionResolver {
    client: reqwest::Client,
}

impl DescriptionResolver {
    pub fn new() -> Result<Self, DiscoveryError> {
        Self::with_timeouts(DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|e| DiscoveryError::Client(e.to_string()))?;
        Ok(DescriptionResolver { client })
    }
}

#[async_trait]
impl Resolve for DescriptionResolver {
    async fn resolve(&self, location: &Url) -> Result<Device, DiscoveryError> {
        debug!(%location, "retrieving device description");
        let failed = |reason: String| DiscoveryError::ResolveFailed {
            location: location.to_string(),
            reason,
        };

        let response = self
            .client
            .get(location.clone())
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("status {}", response.status().as_u16())));
        }

        // The endpoint header takes precedence over anything in the body.
        let app_url = response
            .headers()
            .get(APP_DIAL_URL_HEADER)
            .or_else(|| response.headers().get(APP_URL_HEADER))
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        parser::parse_device_description(&body, app_url.as_deref(), location)
            .map_err(|e| failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <friendlyName>LaCleTV</friendlyName>
    <manufacturer>Innopia</manufacturer>
    <modelName>cleTV</modelName>
    <UDN>uuid:c4323fee-db4b-4227-9039-fa4b71589e26</UDN>
  </device>
</root>"#;

    /// Serve one HTTP response on an ephemeral port, then close.
    async fn serve_once(status_line: &'static str, extra_headers: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = [0u8; 2048];
            let _ = stream.read(&mut buffer).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n{DESCRIPTION}",
                DESCRIPTION.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn resolves_device_using_dial_url_header() {
        let addr = serve_once(
            "200 OK",
            "Application-DIAL-URL: http://192.168.1.48:8008/apps\r\n",
        )
        .await;
        let resolver = DescriptionResolver::new().unwrap();
        let location = Url::parse(&format!("http://{addr}/dd.xml")).unwrap();

        let device = resolver.resolve(&location).await.unwrap();
        assert_eq!(device.uuid, "c4323fee-db4b-4227-9039-fa4b71589e26");
        assert_eq!(device.dial_url.as_str(), "http://192.168.1.48:8008/apps");
        assert_eq!(device.location, location);
    }

    #[tokio::test]
    async fn falls_back_to_application_url_header() {
        let addr = serve_once(
            "200 OK",
            "Application-URL: http://192.168.1.48:8009/apps\r\n",
        )
        .await;
        let resolver = DescriptionResolver::new().unwrap();
        let location = Url::parse(&format!("http://{addr}/dd.xml")).unwrap();

        let device = resolver.resolve(&location).await.unwrap();
        assert_eq!(device.dial_url.as_str(), "http://192.168.1.48:8009/apps");
    }

    #[tokio::test]
    async fn non_success_status_is_tagged_with_the_location() {
        let addr = serve_once("500 Internal Server Error", "").await;
        let resolver = DescriptionResolver::new().unwrap();
        let location = Url::parse(&format!("http://{addr}/dd.xml")).unwrap();

        let result = resolver.resolve(&location).await;
        match result {
            Err(DiscoveryError::ResolveFailed { location: l, reason }) => {
                assert!(l.contains("dd.xml"));
                assert!(reason.contains("500"));
            }
            other => panic!("expected ResolveFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_resolve_failure() {
        let resolver = DescriptionResolver::with_timeouts(
            Duration::from_millis(200),
            Duration::from_millis(200),
        )
        .unwrap();
        // Port 9 on localhost: nothing listens there.
        let location = Url::parse("http://127.0.0.1:9/dd.xml").unwrap();
        let result = resolver.resolve(&location).await;
        assert!(matches!(result, Err(DiscoveryError::ResolveFailed { .. })));
    }
}
