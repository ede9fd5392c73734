//! Default values for all configuration settings.

/// Default ack timeout in seconds.
pub const DEFAULT_ACK_TIMEOUT_SECS: f64 = 2.0;

/// Default maximum transmission attempts per message.
pub const DEFAULT_RETRY_COUNT: u8 = 3;

/// Default device write timeout in milliseconds.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 500;

/// Default scheduler cycle interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;

/// Default keep-alive idle threshold in seconds.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 15;

/// Default link quality averaging window in seconds.
pub const DEFAULT_QUALITY_WINDOW_SECS: u64 = 30;

/// Default inbound silence threshold in seconds.
pub const DEFAULT_SILENCE_THRESHOLD_SECS: u64 = 45;

/// Default SNR floor in dB below which the link is degraded.
pub const DEFAULT_DEGRADED_SNR_DB: f64 = 0.0;

/// Default RSSI floor in dBm below which the link is degraded.
pub const DEFAULT_DEGRADED_RSSI_DBM: f64 = -110.0;

/// Default detections required before an estimate is computed.
pub const DEFAULT_MIN_DETECTIONS: usize = 2;

/// Default minimum confidence for a fused estimate.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Default exponential smoothing factor for positions.
pub const DEFAULT_POSITION_SMOOTHING: f64 = 0.3;

/// Default track age limit in seconds.
pub const DEFAULT_MAX_AGE_SECS: f64 = 30.0;

/// Default detection association window in seconds.
pub const DEFAULT_ASSOCIATION_WINDOW_SECS: f64 = 5.0;

/// Default track association distance in meters.
pub const DEFAULT_MAX_ASSOCIATION_DISTANCE_M: f64 = 150.0;

/// Default assumed range for single-ray projection in meters.
pub const DEFAULT_ASSUMED_RANGE_M: f64 = 300.0;

/// Default fusion cycle interval in milliseconds.
pub const DEFAULT_FUSION_INTERVAL_MS: u64 = 500;

/// Default detection ingestion channel capacity.
pub const DEFAULT_DETECTION_QUEUE: usize = 64;

/// Default outbound submission channel capacity.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

/// Default log directory.
pub const DEFAULT_LOG_DIRECTORY: &str = "logs";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "aerolink.log";
