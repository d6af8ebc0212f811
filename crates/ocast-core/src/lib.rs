//! # ocast-core
//!
//! Core types, traits, and error definitions shared across all OCast crates.
//!
//! This crate provides:
//! - Device representation for discovered cast receivers
//! - DIAL application description model and parser
//! - Common error types

pub mod device;
pub mod dial;
pub mod error;

pub use device::Device;
pub use dial::{AdditionalData, AppState, DialService};
pub use error::{DialError, DiscoveryError, Error, ParseError, Result, SessionError};
