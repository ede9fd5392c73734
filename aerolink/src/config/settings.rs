//! Settings structs for all configuration sections.
//!
//! Pure data types with no parsing logic. Components never read these
//! mid-cycle: the service hands out immutable snapshots through
//! [`ConfigHandle`](super::ConfigHandle) and each daemon loop picks up the
//! current snapshot at the top of its cycle.

use std::path::PathBuf;
use std::time::Duration;

/// Complete core configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    /// Radio transport settings.
    pub radio: RadioSettings,
    /// Localization engine settings.
    pub localization: LocalizationSettings,
    /// Submission channel settings.
    pub channels: ChannelSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

/// Radio transport configuration.
#[derive(Debug, Clone)]
pub struct RadioSettings {
    /// How long to wait for an acknowledgement before a retry.
    /// Default: 2.0 seconds. Doubled while the link is degraded.
    pub ack_timeout_secs: f64,
    /// Maximum transmission attempts per message (first try included).
    /// Default: 3
    pub retry_count: u8,
    /// Bound on how long the device may take to accept a write.
    /// Default: 500 ms
    pub write_timeout_ms: u64,
    /// Scheduler cycle interval: inbound polling, timer checks, dequeue.
    /// Default: 20 ms
    pub poll_interval_ms: u64,
    /// Send a keep-alive ping after this much link idle time.
    /// Default: 15 seconds
    pub ping_interval_secs: u64,
    /// Rolling window for link quality averages.
    /// Default: 30 seconds
    pub quality_window_secs: u64,
    /// No inbound frame for this long means the link is unreachable.
    /// Default: 45 seconds
    pub silence_threshold_secs: u64,
    /// Average SNR below this (dB) marks the link degraded.
    /// Default: 0.0
    pub degraded_snr_db: f64,
    /// Average RSSI below this (dBm) marks the link degraded.
    /// Default: -110
    pub degraded_rssi_dbm: f64,
}

impl RadioSettings {
    /// Ack timeout as a `Duration`.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.ack_timeout_secs)
    }

    /// Device write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Scheduler cycle interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Keep-alive idle threshold as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

/// Localization engine configuration.
#[derive(Debug, Clone)]
pub struct LocalizationSettings {
    /// Observations required within the association window before a
    /// position estimate is computed. Default: 2
    pub min_detections: usize,
    /// Fused estimates below this confidence are discarded. Default: 0.5
    pub min_confidence: f64,
    /// Exponential smoothing factor α: weight of the new raw estimate.
    /// Default: 0.3
    pub position_smoothing: f64,
    /// Tracks unrefreshed for longer than this are stale; history entries
    /// older than this are evicted. Default: 30.0 seconds
    pub max_age_secs: f64,
    /// Detections older than this are ignored at fusion time.
    /// Default: 5.0 seconds
    pub association_window_secs: f64,
    /// A detection associates with a track only within this distance.
    /// Default: 150 meters
    pub max_association_distance_m: f64,
    /// Assumed range for single-ray projection when triangulation is not
    /// possible. Default: 300 meters
    pub assumed_range_m: f64,
    /// Interval between fusion cycles. Default: 500 ms
    pub fusion_interval_ms: u64,
}

impl LocalizationSettings {
    /// Track/history age limit as a chrono duration.
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.max_age_secs * 1000.0) as i64)
    }

    /// Association window as a chrono duration.
    pub fn association_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.association_window_secs * 1000.0) as i64)
    }

    /// Fusion cycle interval as a `Duration`.
    pub fn fusion_interval(&self) -> Duration {
        Duration::from_millis(self.fusion_interval_ms)
    }
}

/// Bounded submission channel configuration.
///
/// Submissions beyond these bounds are rejected with `QueueFull` rather
/// than growing memory without limit.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Capacity of the detection ingestion channel. Default: 64
    pub detection_queue: usize,
    /// Capacity of the outbound message submission channel. Default: 64
    pub outbound_queue: usize,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Directory for log files.
    pub directory: PathBuf,
    /// Log file name.
    pub file: String,
}
