//! Data stream seam for feature-specific channels.

use async_trait::async_trait;
use serde_json::Value;

/// A feature-specific channel (media, settings, custom) multiplexed over the
/// browser registry by its service name.
#[async_trait]
pub trait DataStream: Send + Sync {
    /// Service key this stream registers under.
    fn service_name(&self) -> &str;

    /// Inbound message addressed to this service.
    async fn on_message(&self, message: Value);
}
