//! # ocast-client
//!
//! High-level control API for OCast receivers.
//!
//! This crate provides:
//! - `ApplicationController`, the DIAL application lifecycle state machine
//! - The `Browser` registry routing inbound messages to feature streams
//! - `DeviceManager`, the per-device facade with a driver-factory registry

mod application;
mod browser;
mod manager;
mod stream;

#[cfg(test)]
mod testing;

pub use application::{ApplicationController, SERVICE_WEBAPP};
pub use browser::Browser;
pub use manager::{DeviceFailure, DeviceManager, DeviceManagerListener, DriverFactory, DriverRegistry};
pub use stream::DataStream;
