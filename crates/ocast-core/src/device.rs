//! Device representation for discovered cast receivers.

use url::Url;

/// A cast receiver discovered on the network.
///
/// The `uuid` is the stable identity used to deduplicate records; equality
/// over the remaining fields is what drives change detection in the
/// inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Stable identity parsed from the description's `UDN` element.
    pub uuid: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    /// Base URL of the DIAL application resource.
    pub dial_url: Url,
    /// Location of the device description document this record was built from.
    pub location: Url,
}

impl Device {
    /// Hostname of the DIAL endpoint, used to derive settings link URLs.
    pub fn host(&self) -> &str {
        self.dial_url.host_str().unwrap_or_default()
    }

    /// Whether `other` describes the same physical device.
    pub fn same_identity(&self, other: &Device) -> bool {
        self.uuid == other.uuid
    }
}
