//! Link quality monitoring.
//!
//! The monitor keeps a rolling window of RSSI/SNR samples appended by the
//! link on every successful receive, plus cumulative transport counters.
//! From those it derives an advisory [`LinkHealth`]: advisory because a
//! `Degraded` or `Unreachable` verdict never cancels in-flight retries, it
//! only informs policy (the scheduler stretches ack timeouts while the
//! link is degraded).

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// One RSSI/SNR measurement taken on frame receive. Immutable once taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkQualitySample {
    /// When the sample was taken.
    pub timestamp: Instant,
    /// Received signal strength in dBm (typically -30 to -120).
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: f32,
}

/// Advisory link health derived from sample recency and averages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHealth {
    /// Recent samples, averages above thresholds.
    Healthy,
    /// Recent samples, but weak signal or poor SNR.
    Degraded,
    /// No sample within the silence interval.
    Unreachable,
}

impl std::fmt::Display for LinkHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Read-only snapshot of link statistics, published once per scheduler
/// cycle through [`SharedLinkStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStats {
    /// Mean RSSI over the window, if any samples exist.
    pub rssi_avg: Option<f64>,
    /// Mean SNR over the window, if any samples exist.
    pub snr_avg: Option<f64>,
    /// Current advisory health.
    pub health: LinkHealth,
    /// Frames written to the device (all kinds).
    pub frames_sent: u64,
    /// Frames successfully decoded from the device.
    pub frames_received: u64,
    /// Inbound frames dropped for failing decode.
    pub decode_drops: u64,
    /// Retransmission attempts beyond each message's first.
    pub retransmissions: u64,
    /// Messages acknowledged.
    pub messages_acked: u64,
    /// Messages that reached `Failed`.
    pub messages_failed: u64,
}

impl Default for LinkStats {
    fn default() -> Self {
        Self {
            rssi_avg: None,
            snr_avg: None,
            health: LinkHealth::Unreachable,
            frames_sent: 0,
            frames_received: 0,
            decode_drops: 0,
            retransmissions: 0,
            messages_acked: 0,
            messages_failed: 0,
        }
    }
}

/// Shared handle for read-only access to the latest [`LinkStats`].
pub type SharedLinkStats = Arc<RwLock<LinkStats>>;

/// Rolling-window aggregator of link quality.
///
/// Owned and mutated exclusively by the scheduler loop; readers see the
/// snapshot it publishes.
#[derive(Debug)]
pub struct NetworkMonitor {
    samples: VecDeque<LinkQualitySample>,
    window: Duration,
    silence_threshold: Duration,
    degraded_snr_db: f64,
    degraded_rssi_dbm: f64,
    frames_sent: u64,
    frames_received: u64,
    decode_drops: u64,
    retransmissions: u64,
    messages_acked: u64,
    messages_failed: u64,
}

impl NetworkMonitor {
    /// Creates a monitor.
    ///
    /// # Arguments
    ///
    /// * `window` - How far back samples count toward averages
    /// * `silence_threshold` - No sample for this long means `Unreachable`
    /// * `degraded_snr_db` - Average SNR below this means `Degraded`
    /// * `degraded_rssi_dbm` - Average RSSI below this means `Degraded`
    pub fn new(
        window: Duration,
        silence_threshold: Duration,
        degraded_snr_db: f64,
        degraded_rssi_dbm: f64,
    ) -> Self {
        Self {
            samples: VecDeque::new(),
            window,
            silence_threshold,
            degraded_snr_db,
            degraded_rssi_dbm,
            frames_sent: 0,
            frames_received: 0,
            decode_drops: 0,
            retransmissions: 0,
            messages_acked: 0,
            messages_failed: 0,
        }
    }

    /// Appends a quality sample (one per successful receive).
    pub fn record_sample(&mut self, sample: LinkQualitySample) {
        self.frames_received += 1;
        self.samples.push_back(sample);
    }

    /// Counts a frame written to the device.
    pub fn note_sent(&mut self) {
        self.frames_sent += 1;
    }

    /// Counts an inbound frame dropped for failing decode.
    pub fn note_decode_drop(&mut self) {
        self.decode_drops += 1;
    }

    /// Counts a retransmission attempt.
    pub fn note_retransmission(&mut self) {
        self.retransmissions += 1;
    }

    /// Counts an acknowledged message.
    pub fn note_acked(&mut self) {
        self.messages_acked += 1;
    }

    /// Counts a failed message.
    pub fn note_failed(&mut self) {
        self.messages_failed += 1;
    }

    /// Current advisory health as of `now`.
    pub fn status(&mut self, now: Instant) -> LinkHealth {
        self.prune(now);

        let last = match self.samples.back() {
            Some(sample) => sample.timestamp,
            None => return LinkHealth::Unreachable,
        };
        if now.duration_since(last) > self.silence_threshold {
            return LinkHealth::Unreachable;
        }

        let (rssi_avg, snr_avg) = match self.averages() {
            Some(avgs) => avgs,
            None => return LinkHealth::Unreachable,
        };
        if snr_avg < self.degraded_snr_db || rssi_avg < self.degraded_rssi_dbm {
            LinkHealth::Degraded
        } else {
            LinkHealth::Healthy
        }
    }

    /// Builds the publishable statistics snapshot.
    pub fn stats(&mut self, now: Instant) -> LinkStats {
        let health = self.status(now);
        let (rssi_avg, snr_avg) = match self.averages() {
            Some((r, s)) => (Some(r), Some(s)),
            None => (None, None),
        };
        LinkStats {
            rssi_avg,
            snr_avg,
            health,
            frames_sent: self.frames_sent,
            frames_received: self.frames_received,
            decode_drops: self.decode_drops,
            retransmissions: self.retransmissions,
            messages_acked: self.messages_acked,
            messages_failed: self.messages_failed,
        }
    }

    fn averages(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        let n = self.samples.len() as f64;
        let rssi: f64 = self.samples.iter().map(|s| s.rssi as f64).sum();
        let snr: f64 = self.samples.iter().map(|s| s.snr as f64).sum();
        Some((rssi / n, snr / n))
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.timestamp) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> NetworkMonitor {
        NetworkMonitor::new(
            Duration::from_secs(30),
            Duration::from_secs(10),
            0.0,
            -110.0,
        )
    }

    fn sample(at: Instant, rssi: i16, snr: f32) -> LinkQualitySample {
        LinkQualitySample {
            timestamp: at,
            rssi,
            snr,
        }
    }

    #[test]
    fn test_no_samples_is_unreachable() {
        let now = Instant::now();
        assert_eq!(monitor().status(now), LinkHealth::Unreachable);
    }

    #[test]
    fn test_healthy_with_strong_signal() {
        let now = Instant::now();
        let mut mon = monitor();
        mon.record_sample(sample(now, -60, 9.5));
        mon.record_sample(sample(now, -62, 8.0));
        assert_eq!(mon.status(now), LinkHealth::Healthy);
    }

    #[test]
    fn test_degraded_on_low_snr() {
        let now = Instant::now();
        let mut mon = monitor();
        mon.record_sample(sample(now, -70, -5.0));
        assert_eq!(mon.status(now), LinkHealth::Degraded);
    }

    #[test]
    fn test_degraded_on_weak_rssi() {
        let now = Instant::now();
        let mut mon = monitor();
        mon.record_sample(sample(now, -118, 5.0));
        assert_eq!(mon.status(now), LinkHealth::Degraded);
    }

    #[test]
    fn test_unreachable_after_silence() {
        let start = Instant::now();
        let mut mon = monitor();
        mon.record_sample(sample(start, -60, 9.0));

        assert_eq!(mon.status(start + Duration::from_secs(5)), LinkHealth::Healthy);
        assert_eq!(
            mon.status(start + Duration::from_secs(11)),
            LinkHealth::Unreachable
        );
    }

    #[test]
    fn test_window_pruning() {
        let start = Instant::now();
        let mut mon = monitor();
        // An ancient terrible sample followed by a fresh good one: once the
        // old sample ages out of the window it must not drag the average.
        mon.record_sample(sample(start, -120, -15.0));
        let later = start + Duration::from_secs(31);
        mon.record_sample(sample(later, -60, 9.0));

        assert_eq!(mon.status(later), LinkHealth::Healthy);
        let stats = mon.stats(later);
        assert_eq!(stats.rssi_avg, Some(-60.0));
    }

    #[test]
    fn test_counters_in_stats() {
        let now = Instant::now();
        let mut mon = monitor();
        mon.note_sent();
        mon.note_sent();
        mon.note_decode_drop();
        mon.note_retransmission();
        mon.note_acked();
        mon.note_failed();
        mon.record_sample(sample(now, -60, 9.0));

        let stats = mon.stats(now);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.decode_drops, 1);
        assert_eq!(stats.retransmissions, 1);
        assert_eq!(stats.messages_acked, 1);
        assert_eq!(stats.messages_failed, 1);
    }
}
