//! # ocast-session
//!
//! Session protocol implementation for OCast receivers.
//!
//! This crate provides:
//! - The JSON payload codec exchanged over a session link
//! - `SessionLink`, a persistent WebSocket channel with command/reply
//!   correlation and event fan-out
//! - The `Driver` capability trait and its reference implementation,
//!   sharing one physical link across modules bound to the same endpoint

mod driver;
mod link;
mod payload;
mod profile;
mod traits;

pub use driver::{
    BrowserListener, Driver, DriverListener, Failure, Module, ReferenceDriver, SEARCH_TARGET,
    SETTINGS_DOMAIN,
};
pub use link::{LinkState, SessionLink};
pub use payload::{Payload, PayloadKind, ReplyStatus, DST_BROADCAST, SRC_SETTINGS};
pub use profile::{LinkProfile, SslConfig};
pub use traits::{DriverEvent, Link, LinkListener};
