//! DIAL application description model and parsing.

use url::Url;

use crate::error::ParseError;

const TAG_SERVICE: &str = "service";
const TAG_NAME: &str = "name";
const TAG_STATE: &str = "state";
const TAG_LINK: &str = "link";
const TAG_ADDITIONAL_DATA: &str = "additionalData";
const TAG_APP2APP_URL: &str = "X_OCAST_App2AppURL";
const TAG_VERSION: &str = "X_OCAST_Version";

/// Run state advertised by a DIAL application resource.
///
/// This is a snapshot from the last fetch, not a push-updated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Unknown,
    Running,
    Stopped,
}

impl AppState {
    fn from_text(text: &str) -> Self {
        if text.eq_ignore_ascii_case("running") {
            AppState::Running
        } else if text.eq_ignore_ascii_case("stopped") {
            AppState::Stopped
        } else {
            AppState::Unknown
        }
    }
}

/// Session bootstrap data carried in the OCast `<additionalData>` extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalData {
    /// WebSocket endpoint for the application module's session link.
    pub app2app_url: String,
    /// Protocol version advertised by the receiver.
    pub version: Option<String>,
}

/// Parsed DIAL application description.
#[derive(Debug, Clone)]
pub struct DialService {
    /// URL of the application resource this description was fetched from.
    pub base_url: Url,
    pub name: String,
    pub state: AppState,
    /// URL identifying the running instance, used to stop it.
    pub run_link: Option<Url>,
    pub additional_data: Option<AdditionalData>,
}

impl DialService {
    /// Parse a DIAL service document fetched from `base_url`.
    ///
    /// A relative `<link rel="run">` href resolves against `base_url`.
    pub fn parse(base_url: &Url, xml: &str) -> Result<Self, ParseError> {
        let doc = roxmltree::Document::parse(xml)
            .map_err(|e| ParseError::InvalidDocument(e.to_string()))?;
        let root = doc.root_element();
        if root.tag_name().name() != TAG_SERVICE {
            return Err(ParseError::InvalidDocument(format!(
                "expected <{}>, got <{}>",
                TAG_SERVICE,
                root.tag_name().name()
            )));
        }

        let mut name = None;
        let mut state = AppState::Unknown;
        let mut run_link = None;
        let mut additional_data = None;

        for node in root.children().filter(|n| n.is_element()) {
            match node.tag_name().name() {
                TAG_NAME => name = node.text().map(str::to_owned),
                TAG_STATE => state = AppState::from_text(node.text().unwrap_or_default()),
                TAG_LINK => {
                    if node.attribute("rel") == Some("run") {
                        if let Some(href) = node.attribute("href") {
                            run_link = Some(resolve_link(base_url, href)?);
                        }
                    }
                }
                TAG_ADDITIONAL_DATA => additional_data = Some(parse_additional_data(&node)?),
                _ => {}
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or(ParseError::MissingField(TAG_NAME))?;

        Ok(DialService {
            base_url: base_url.clone(),
            name,
            state,
            run_link,
            additional_data,
        })
    }
}

fn resolve_link(base_url: &Url, href: &str) -> Result<Url, ParseError> {
    if let Ok(url) = Url::parse(href) {
        return Ok(url);
    }
    // Relative href: resolve against the application resource itself.
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|b| b.join(href))
        .map_err(|e| ParseError::InvalidUrl(format!("{href}: {e}")))
}

fn parse_additional_data(node: &roxmltree::Node) -> Result<AdditionalData, ParseError> {
    let mut app2app_url = None;
    let mut version = None;
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            TAG_APP2APP_URL => app2app_url = child.text().map(str::to_owned),
            TAG_VERSION => version = child.text().map(str::to_owned),
            _ => {}
        }
    }
    let app2app_url = app2app_url.ok_or(ParseError::MissingField(TAG_APP2APP_URL))?;
    Ok(AdditionalData {
        app2app_url,
        version,
    })
}
