//! Link profiles and the opaque TLS bundle.

use std::fmt;
use std::sync::Arc;

use url::Url;

/// TLS material for secure links, consumed as an opaque bundle.
///
/// Construction of the client configuration (trust anchors, client
/// certificates, hostname verification) is the integrator's concern.
#[derive(Clone)]
pub struct SslConfig {
    client_config: Arc<rustls::ClientConfig>,
}

impl SslConfig {
    pub fn new(client_config: Arc<rustls::ClientConfig>) -> Self {
        SslConfig { client_config }
    }

    pub(crate) fn client_config(&self) -> Arc<rustls::ClientConfig> {
        Arc::clone(&self.client_config)
    }
}

impl fmt::Debug for SslConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SslConfig(..)")
    }
}

/// Describes how to open a session link.
///
/// Two profiles address the same link exactly when their endpoint URLs
/// match.
#[derive(Debug, Clone)]
pub struct LinkProfile {
    app2app_url: String,
    ssl: Option<SslConfig>,
}

impl LinkProfile {
    pub fn new(app2app_url: impl Into<String>) -> Self {
        LinkProfile {
            app2app_url: app2app_url.into(),
            ssl: None,
        }
    }

    pub fn with_ssl(mut self, ssl: SslConfig) -> Self {
        self.ssl = Some(ssl);
        self
    }

    /// The WebSocket endpoint this profile addresses.
    pub fn app2app_url(&self) -> &str {
        &self.app2app_url
    }

    pub fn ssl(&self) -> Option<&SslConfig> {
        self.ssl.as_ref()
    }

    /// Host part of the endpoint URL.
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.app2app_url)
            .ok()?
            .host_str()
            .map(str::to_owned)
    }
}
