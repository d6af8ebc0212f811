//! Device description document parsing.

use ocast_core::error::ParseError;
use ocast_core::Device;
use url::Url;

const TAG_ROOT: &str = "root";
const TAG_FRIENDLY_NAME: &str = "friendlyName";
const TAG_MANUFACTURER: &str = "manufacturer";
const TAG_MODEL_NAME: &str = "modelName";
const TAG_UDN: &str = "UDN";
const TAG_URL_BASE: &str = "URLBase";

/// Parse a UPnP device description document into a [`Device`].
///
/// The application control endpoint comes from the `Application-DIAL-URL`
/// (or `Application-URL`) response header when one was sent; the document's
/// `URLBase` element is only consulted otherwise.
pub fn parse_device_description(
    xml: &str,
    app_url_header: Option<&str>,
    location: &Url,
) -> Result<Device, ParseError> {
    let doc =
        roxmltree::Document::parse(xml).map_err(|e| ParseError::InvalidDocument(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != TAG_ROOT {
        return Err(ParseError::InvalidDocument(format!(
            "expected <{TAG_ROOT}>, got <{}>",
            root.tag_name().name()
        )));
    }

    let mut friendly_name = None;
    let mut manufacturer = None;
    let mut model_name = None;
    let mut uuid = None;
    let mut url_base = None;

    for node in root.descendants().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            TAG_FRIENDLY_NAME => friendly_name = node.text().map(str::to_owned),
            TAG_MANUFACTURER => manufacturer = node.text().map(str::to_owned),
            TAG_MODEL_NAME => model_name = node.text().map(str::to_owned),
            TAG_UDN => uuid = node.text().map(strip_uuid_prefix).map(str::to_owned),
            TAG_URL_BASE if app_url_header.is_none() => {
                url_base = node.text().map(str::to_owned)
            }
            _ => {}
        }
    }

    let dial_url = app_url_header
        .map(str::to_owned)
        .or(url_base)
        .ok_or(ParseError::MissingField(TAG_URL_BASE))?;
    let dial_url =
        Url::parse(&dial_url).map_err(|e| ParseError::InvalidUrl(format!("{dial_url}: {e}")))?;

    Ok(Device {
        uuid: uuid.ok_or(ParseError::MissingField(TAG_UDN))?,
        friendly_name: friendly_name.unwrap_or_default(),
        manufacturer: manufacturer.unwrap_or_default(),
        model_name: model_name.unwrap_or_default(),
        dial_url,
        location: location.clone(),
    })
}

/// `uuid:c4323fee-…` → `c4323fee-…`; bare ids pass through untouched.
fn strip_uuid_prefix(udn: &str) -> &str {
    match udn.strip_prefix("uuid:") {
        Some(rest) => rest.split(':').next().unwrap_or(rest),
        None => udn,
    }
}
