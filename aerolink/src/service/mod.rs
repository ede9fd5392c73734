//! High-level service facade.
//!
//! [`AerolinkService`] encapsulates the component wiring: it builds the
//! radio scheduler and the localization daemon from one configuration,
//! spawns them, and exposes the handful of calls an embedding application
//! needs (submit detections, send messages, read objects and link stats,
//! drain telemetry events).

mod daemon;
mod error;
mod facade;

pub use daemon::{LocalizationDaemon, SharedObjects, SharedTrajectories};
pub use error::ServiceError;
pub use facade::AerolinkService;
