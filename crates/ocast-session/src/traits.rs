//! Capability traits for session links.

use async_trait::async_trait;
use ocast_core::error::SessionError;
use serde_json::Value;

/// Unsolicited event forwarded from a link to its owner.
#[derive(Debug, Clone)]
pub struct DriverEvent {
    /// Source id of the emitting component (`browser`, `settings`, ...).
    pub source: String,
    pub data: Value,
}

/// Observer for link-level signals.
#[async_trait]
pub trait LinkListener: Send + Sync {
    /// Transport-level failure while the link was connecting or connected.
    async fn on_failure(&self, error: SessionError);

    /// Event addressed to this controller.
    async fn on_event(&self, event: DriverEvent);
}

/// A persistent duplex message channel to one device endpoint.
#[async_trait]
pub trait Link: Send + Sync {
    /// Open the channel. Resolves once the transport reports it open.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Close the channel gracefully. Resolves only on the closed signal.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Endpoint URL this link is bound to.
    fn url(&self) -> &str;

    /// Send a command on `domain` and resolve with the reply message.
    async fn send_payload(&self, domain: &str, message: Value) -> Result<Value, SessionError>;
}
