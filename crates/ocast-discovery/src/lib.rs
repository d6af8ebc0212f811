//! # ocast-discovery
//!
//! SSDP discovery for OCast receivers.
//!
//! This crate provides:
//! - The SSDP probe message codec and multicast transport
//! - A periodic discovery scanner with liveness-based pruning
//! - HTTP resolution of device description documents
//! - The authoritative inventory of currently-known devices
//!
//! ## Example
//!
//! ```ignore
//! use ocast_discovery::{DeviceBrowser, Reliability};
//! use std::time::Duration;
//!
//! let browser = DeviceBrowser::new(["urn:cast-ocast-org:service:cast:1"]);
//! let devices = browser.scan(Duration::from_secs(5)).await?;
//! for device in devices {
//!     println!("Found: {} ({})", device.friendly_name, device.model_name);
//! }
//! ```

mod browser;
mod inventory;
mod message;
mod parser;
mod resolver;
mod scanner;
mod socket;
mod traits;

pub use browser::DeviceBrowser;
pub use inventory::{BrowseEvent, DeviceInventory};
pub use message::{SsdpKind, SsdpMessage, SSDP_MULTICAST_ADDR, SSDP_PORT};
pub use parser::parse_device_description;
pub use resolver::{DescriptionResolver, Resolve};
pub use scanner::{DiscoveryScanner, Reliability, ScanSignal};
pub use socket::SsdpSocket;
pub use traits::{Discovery, DiscoveryListener};
