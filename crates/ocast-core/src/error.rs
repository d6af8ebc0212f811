//! Error types for the OCast sender SDK.

use thiserror::Error;

/// Primary error type for all OCast operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("DIAL error: {0}")]
    Dial(#[from] DialError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

/// Errors during SSDP discovery and device description resolution.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("could not fetch device description at {location}: {reason}")]
    ResolveFailed { location: String, reason: String },
}

/// Errors on a session link or its module bindings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("link is not connected")]
    NotConnected,

    #[error("could not open link to {url}: {reason}")]
    ConnectFailed { url: String, reason: String },

    #[error("payload could not be transmitted")]
    SendFailed,

    #[error("link closed before a reply arrived")]
    Closed,

    #[error("link failure: {0}")]
    Failed(String),

    #[error("device rejected the command: {0}")]
    CommandFailure(String),

    #[error("unsupported module: {0}")]
    UnsupportedModule(String),

    #[error("no driver registered for manufacturer: {0}")]
    NoDriver(String),
}

/// Errors from the DIAL application control endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialError {
    #[error("application not found")]
    ApplicationNotFound,

    #[error("application is not running")]
    ApplicationNotRunning,

    #[error("timed out waiting for the application to connect")]
    Timeout,

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

/// Parsing errors for the various wire and document formats.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("unexpected start line: {0}")]
    UnexpectedStartLine(String),

    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed document: {0}")]
    InvalidDocument(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] serde_json::Error),
}

/// Convenience Result type.
pub type Result<T> = std::result::Result<T, Error>;
