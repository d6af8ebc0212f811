//! SSDP probe message codec.
//!
//! Only M-SEARCH requests and their responses matter for DIAL discovery;
//! unsolicited NOTIFY announcements are recognized but carry no extra
//! handling here.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use ocast_core::error::ParseError;

/// Multicast group reserved for SSDP by IANA.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// Port reserved for SSDP by IANA.
pub const SSDP_PORT: u16 = 1900;

/// Header carrying the URL of the device description document.
pub const HEADER_LOCATION: &str = "LOCATION";
/// Header carrying the search target.
pub const HEADER_SEARCH_TARGET: &str = "ST";

const HEADER_HOST: &str = "HOST";
const HEADER_MAN: &str = "MAN";
const HEADER_MAX_WAIT: &str = "MX";
const HEADER_USN: &str = "USN";

const DISCOVER_EXTENSION: &str = "\"ssdp:discover\"";
const CRLF: &str = "\r\n";

/// Message kind, inferred from the request/status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpKind {
    /// `M-SEARCH` request.
    Search,
    /// Response to a search.
    Response,
    /// Unsolicited announcement.
    Notify,
}

impl SsdpKind {
    /// The literal request/status line for this kind.
    pub fn start_line(&self) -> &'static str {
        match self {
            SsdpKind::Search => "M-SEARCH * HTTP/1.1",
            SsdpKind::Response => "HTTP/1.1 200 OK",
            SsdpKind::Notify => "NOTIFY * HTTP/1.1",
        }
    }

    fn from_start_line(line: &str) -> Option<Self> {
        [SsdpKind::Search, SsdpKind::Response, SsdpKind::Notify]
            .into_iter()
            .find(|kind| line.eq_ignore_ascii_case(kind.start_line()))
    }
}

/// An SSDP message: a start line plus `Header: value` pairs.
#[derive(Debug, Clone)]
pub struct SsdpMessage {
    kind: SsdpKind,
    headers: HashMap<String, String>,
}

impl SsdpMessage {
    /// Build an M-SEARCH request for `search_target`, telling responders to
    /// wait at most `max_wait_secs` before answering.
    pub fn search(search_target: &str, max_wait_secs: u64) -> Self {
        let mut headers = HashMap::new();
        headers.insert(
            HEADER_HOST.to_string(),
            format!("{SSDP_MULTICAST_ADDR}:{SSDP_PORT}"),
        );
        headers.insert(HEADER_MAN.to_string(), DISCOVER_EXTENSION.to_string());
        headers.insert(HEADER_MAX_WAIT.to_string(), max_wait_secs.to_string());
        headers.insert(
            HEADER_SEARCH_TARGET.to_string(),
            search_target.to_string(),
        );
        SsdpMessage {
            kind: SsdpKind::Search,
            headers,
        }
    }

    /// Parse a message from its wire text.
    ///
    /// The first line selects the kind; an unknown line is a parse error, as
    /// is a response without a `LOCATION` header. Header lines that carry no
    /// colon are skipped.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut lines = text.split(CRLF);
        let start_line = lines.next().unwrap_or_default().trim();
        let kind = SsdpKind::from_start_line(start_line)
            .ok_or_else(|| ParseError::UnexpectedStartLine(start_line.to_string()))?;

        let mut headers = HashMap::new();
        for line in lines {
            let line = line.trim();
            if let Some((name, value)) = line.split_once(':') {
                if !name.is_empty() {
                    headers.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }

        let message = SsdpMessage { kind, headers };
        if message.kind == SsdpKind::Response && message.location().is_none() {
            return Err(ParseError::MissingHeader(HEADER_LOCATION));
        }
        Ok(message)
    }

    pub fn kind(&self) -> SsdpKind {
        self.kind
    }

    /// Look up a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The device description URL of a response.
    pub fn location(&self) -> Option<&str> {
        self.header(HEADER_LOCATION).filter(|v| !v.is_empty())
    }

    /// The search target this message relates to.
    pub fn search_target(&self) -> Option<&str> {
        self.header(HEADER_SEARCH_TARGET)
    }

    /// The unique id embedded in the `USN` header.
    ///
    /// A header of `uuid:c4323fee-db4b-4227-9039-fa4b71589e26::urn:...`
    /// yields `c4323fee-db4b-4227-9039-fa4b71589e26`.
    pub fn uuid(&self) -> Option<&str> {
        let usn = self.header(HEADER_USN)?;
        match usn.strip_prefix("uuid:") {
            Some(rest) => rest.split(':').next(),
            None => Some(usn),
        }
    }
}

impl fmt::Display for SsdpMessage {
    /// Wire serialization: start line, headers, blank line, CRLF throughout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.start_line(), CRLF)?;
        // Sorted for deterministic output.
        let mut headers: Vec<_> = self.headers.iter().collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        for (name, value) in headers {
            write!(f, "{name}: {value}{CRLF}")?;
        }
        write!(f, "{CRLF}")
    }
}
