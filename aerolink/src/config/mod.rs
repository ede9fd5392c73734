//! Core configuration.
//!
//! Settings are plain data assembled by the embedding application (the CLI
//! builds its own from flags). The service keeps the active configuration
//! behind a [`ConfigHandle`]; daemons snapshot it at the top of each cycle,
//! so a replaced configuration takes effect on the next cycle without
//! locking anything mid-cycle.

pub mod defaults;
pub mod settings;

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub use settings::{
    ChannelSettings, ConfigFile, LocalizationSettings, LoggingSettings, RadioSettings,
};

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            radio: RadioSettings::default(),
            localization: LocalizationSettings::default(),
            channels: ChannelSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            ack_timeout_secs: defaults::DEFAULT_ACK_TIMEOUT_SECS,
            retry_count: defaults::DEFAULT_RETRY_COUNT,
            write_timeout_ms: defaults::DEFAULT_WRITE_TIMEOUT_MS,
            poll_interval_ms: defaults::DEFAULT_POLL_INTERVAL_MS,
            ping_interval_secs: defaults::DEFAULT_PING_INTERVAL_SECS,
            quality_window_secs: defaults::DEFAULT_QUALITY_WINDOW_SECS,
            silence_threshold_secs: defaults::DEFAULT_SILENCE_THRESHOLD_SECS,
            degraded_snr_db: defaults::DEFAULT_DEGRADED_SNR_DB,
            degraded_rssi_dbm: defaults::DEFAULT_DEGRADED_RSSI_DBM,
        }
    }
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        Self {
            min_detections: defaults::DEFAULT_MIN_DETECTIONS,
            min_confidence: defaults::DEFAULT_MIN_CONFIDENCE,
            position_smoothing: defaults::DEFAULT_POSITION_SMOOTHING,
            max_age_secs: defaults::DEFAULT_MAX_AGE_SECS,
            association_window_secs: defaults::DEFAULT_ASSOCIATION_WINDOW_SECS,
            max_association_distance_m: defaults::DEFAULT_MAX_ASSOCIATION_DISTANCE_M,
            assumed_range_m: defaults::DEFAULT_ASSUMED_RANGE_M,
            fusion_interval_ms: defaults::DEFAULT_FUSION_INTERVAL_MS,
        }
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            detection_queue: defaults::DEFAULT_DETECTION_QUEUE,
            outbound_queue: defaults::DEFAULT_OUTBOUND_QUEUE,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(defaults::DEFAULT_LOG_DIRECTORY),
            file: defaults::DEFAULT_LOG_FILE.to_string(),
        }
    }
}

/// Shared handle to the active configuration.
///
/// Readers take a cheap `Arc` snapshot; `replace` swaps the whole
/// configuration atomically.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<ConfigFile>>>,
}

impl ConfigHandle {
    /// Wraps a configuration in a shared handle.
    pub fn new(config: ConfigFile) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Returns a snapshot of the current configuration.
    pub fn snapshot(&self) -> Arc<ConfigFile> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            // A poisoned lock still holds a valid snapshot.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replaces the active configuration. Daemons pick it up on their next
    /// cycle.
    pub fn replace(&self, config: ConfigFile) {
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(ConfigFile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = ConfigFile::default();
        assert_eq!(config.radio.ack_timeout_secs, 2.0);
        assert_eq!(config.radio.retry_count, 3);
        assert_eq!(config.localization.min_detections, 2);
        assert_eq!(config.localization.position_smoothing, 0.3);
        assert_eq!(config.channels.outbound_queue, 64);
    }

    #[test]
    fn test_snapshot_is_stable_across_replace() {
        let handle = ConfigHandle::default();
        let before = handle.snapshot();

        let mut next = ConfigFile::default();
        next.radio.retry_count = 7;
        handle.replace(next);

        assert_eq!(before.radio.retry_count, 3);
        assert_eq!(handle.snapshot().radio.retry_count, 7);
    }
}
