//! Aerolink - drone-side perception and reliable radio telemetry.
//!
//! This library fuses object detections from onboard and peer sensors into
//! geolocated tracks, and delivers telemetry to a ground station over a
//! lossy half-duplex LoRa-class radio with acknowledgements and retries.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use aerolink::config::ConfigFile;
//! use aerolink::radio::{SimulatedDevice, SimulatedDeviceConfig};
//! use aerolink::service::AerolinkService;
//!
//! let device = SimulatedDevice::new(SimulatedDeviceConfig::default());
//! let mut service = AerolinkService::start(ConfigFile::default(), Box::new(device));
//!
//! service.submit_detection(detection)?;
//! let events = service.take_events().unwrap();
//! ```

pub mod config;
pub mod events;
pub mod geo;
pub mod localization;
pub mod logging;
pub mod radio;
pub mod service;

/// Version of the aerolink library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
