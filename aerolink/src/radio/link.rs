//! Exclusive owner of the half-duplex radio channel.
//!
//! [`RadioLink`] mediates every byte that crosses the physical device: the
//! scheduler is its only caller, which is what serializes access to the
//! channel (one sender or receiver active at a time). The device itself
//! sits behind the [`RadioDevice`] trait so the same transport runs against
//! real UART hardware, the in-memory [`SimulatedDevice`], or the
//! [`NullDevice`] when no radio is attached.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use super::frame::{self, DecodeError, Frame};
use super::monitor::{LinkQualitySample, NetworkMonitor};

/// Errors surfaced by the link to the retry scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The device did not accept the write within the bounded interval.
    #[error("radio write timed out")]
    Timeout,

    /// No usable device handle (hardware absent or simulated outage).
    #[error("radio device unavailable")]
    DeviceUnavailable,

    /// Device-level I/O failure.
    #[error("radio I/O error: {0}")]
    Io(String),
}

/// Raw bytes received from the device, tagged with the radio's signal
/// measurements for that reception.
#[derive(Debug, Clone)]
pub struct ReceivedChunk {
    /// Raw bytes as they arrived; may contain partial or multiple frames.
    pub bytes: Vec<u8>,
    /// RSSI reported by the radio for this reception, in dBm.
    pub rssi: i16,
    /// SNR reported by the radio, in dB.
    pub snr: f32,
}

/// The physical (or simulated) radio transceiver.
///
/// Implementations do not need to be thread-safe beyond `Send`: the link
/// owns the device exclusively and the scheduler owns the link.
pub trait RadioDevice: Send {
    /// Writes bytes to the air, blocking up to `timeout`.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<(), LinkError>;

    /// Returns the next pending reception, if any. Never blocks.
    fn poll(&mut self) -> Result<Option<ReceivedChunk>, LinkError>;
}

/// Owns the device and the receive-side reassembly buffer.
pub struct RadioLink {
    device: Box<dyn RadioDevice>,
    rx_buf: Vec<u8>,
    // Signal readings for bytes currently in rx_buf; applied to the next
    // decoded frame.
    last_rssi: i16,
    last_snr: f32,
    write_timeout: Duration,
}

impl RadioLink {
    /// Creates a link over the given device.
    pub fn new(device: Box<dyn RadioDevice>, write_timeout: Duration) -> Self {
        Self {
            device,
            rx_buf: Vec::new(),
            last_rssi: 0,
            last_snr: 0.0,
            write_timeout,
        }
    }

    /// Encodes and writes one frame.
    ///
    /// # Errors
    ///
    /// [`LinkError::Timeout`] if the device does not accept the write in
    /// time; [`LinkError::DeviceUnavailable`] when no device is attached.
    pub fn send_frame(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let bytes = frame::encode(frame);
        self.device.write(&bytes, self.write_timeout)?;
        tracing::trace!(
            sequence = frame.sequence,
            kind = ?frame.kind,
            bytes = bytes.len(),
            "frame sent"
        );
        Ok(())
    }

    /// Returns the next fully decoded inbound frame, or `None`.
    ///
    /// Non-blocking. Every successful receive appends one quality sample to
    /// the monitor; undecodable prefixes are skipped and counted, and the
    /// link stays usable.
    pub fn poll_frame(&mut self, monitor: &mut NetworkMonitor) -> Result<Option<Frame>, LinkError> {
        loop {
            // Pull whatever the device has buffered before attempting a
            // decode, so a frame split across receptions assembles.
            while let Some(chunk) = self.device.poll()? {
                self.last_rssi = chunk.rssi;
                self.last_snr = chunk.snr;
                self.rx_buf.extend_from_slice(&chunk.bytes);
            }

            if self.rx_buf.is_empty() {
                return Ok(None);
            }

            match frame::decode(&self.rx_buf) {
                Ok(decoded) => {
                    let consumed = decoded.wire_len();
                    self.rx_buf.drain(..consumed);
                    monitor.record_sample(LinkQualitySample {
                        timestamp: Instant::now(),
                        rssi: self.last_rssi,
                        snr: self.last_snr,
                    });
                    return Ok(Some(decoded));
                }
                Err(DecodeError::Truncated { .. }) => {
                    // Incomplete frame; keep the bytes for the next poll.
                    return Ok(None);
                }
                Err(err @ DecodeError::PayloadTooLong(_)) => {
                    // The length field itself is implausible; resync one
                    // byte at a time until a frame boundary appears.
                    tracing::warn!(error = %err, "resyncing inbound byte stream");
                    self.rx_buf.drain(..1);
                    monitor.note_decode_drop();
                }
                Err(err) => {
                    // Framing was plausible but the content is corrupt or
                    // unrecognized: skip the whole claimed frame.
                    let skip = frame::decoded_len(&self.rx_buf).unwrap_or(1);
                    tracing::warn!(error = %err, skipped = skip, "dropping corrupt frame");
                    self.rx_buf.drain(..skip.min(self.rx_buf.len()));
                    monitor.note_decode_drop();
                }
            }
        }
    }
}

impl std::fmt::Debug for RadioLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioLink")
            .field("rx_buffered", &self.rx_buf.len())
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Stand-in for absent hardware. Every operation reports
/// [`LinkError::DeviceUnavailable`]; the transport degrades but the process
/// keeps running.
#[derive(Debug, Default)]
pub struct NullDevice;

impl RadioDevice for NullDevice {
    fn write(&mut self, _bytes: &[u8], _timeout: Duration) -> Result<(), LinkError> {
        Err(LinkError::DeviceUnavailable)
    }

    fn poll(&mut self) -> Result<Option<ReceivedChunk>, LinkError> {
        Err(LinkError::DeviceUnavailable)
    }
}

/// Configuration for [`SimulatedDevice`].
#[derive(Debug, Clone)]
pub struct SimulatedDeviceConfig {
    /// Probability in [0, 1] that a written frame is lost on the air.
    pub loss_rate: f64,
    /// Acknowledge inbound `Data` frames automatically, emulating a ground
    /// station peer.
    pub auto_ack: bool,
    /// Synthesized RSSI range in dBm.
    pub rssi_dbm: (i16, i16),
    /// Synthesized SNR range in dB.
    pub snr_db: (f32, f32),
    /// RNG seed, fixed so tests are reproducible.
    pub seed: u64,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            auto_ack: true,
            rssi_dbm: (-75, -55),
            snr_db: (5.0, 10.0),
            seed: 0x4c6f5261, // "LoRa"
        }
    }
}

/// In-memory radio for tests and hardware-absent operation.
///
/// Writes either vanish (loss) or, for `Data` frames with `auto_ack` set,
/// produce a matching `Ack` in the inbox with synthesized signal readings.
/// Tests can also inject arbitrary inbound bytes.
pub struct SimulatedDevice {
    config: SimulatedDeviceConfig,
    inbox: VecDeque<ReceivedChunk>,
    rng: StdRng,
    frames_written: u64,
    frames_lost: u64,
}

impl SimulatedDevice {
    /// Creates a simulated device.
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            inbox: VecDeque::new(),
            rng,
            frames_written: 0,
            frames_lost: 0,
        }
    }

    /// Queues raw bytes as an inbound reception.
    pub fn inject(&mut self, bytes: Vec<u8>, rssi: i16, snr: f32) {
        self.inbox.push_back(ReceivedChunk { bytes, rssi, snr });
    }

    /// Queues a frame as an inbound reception with synthesized signal.
    pub fn inject_frame(&mut self, frame: &Frame) {
        let (rssi, snr) = self.synth_signal();
        self.inject(frame::encode(frame), rssi, snr);
    }

    /// Frames accepted by `write` so far (lost or not).
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Frames dropped by the simulated channel.
    pub fn frames_lost(&self) -> u64 {
        self.frames_lost
    }

    fn synth_signal(&mut self) -> (i16, f32) {
        let (lo, hi) = self.config.rssi_dbm;
        let rssi = self.rng.gen_range(lo..=hi);
        let (lo, hi) = self.config.snr_db;
        let snr = self.rng.gen_range(lo..=hi);
        (rssi, snr)
    }
}

impl RadioDevice for SimulatedDevice {
    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<(), LinkError> {
        self.frames_written += 1;

        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            // The radio accepted the write; the air ate the frame. The
            // sender only finds out through the missing ack.
            self.frames_lost += 1;
            return Ok(());
        }

        if self.config.auto_ack {
            if let Ok(decoded) = frame::decode(bytes) {
                if decoded.kind == super::frame::FrameKind::Data {
                    let ack = Frame::ack(decoded.sequence);
                    let (rssi, snr) = self.synth_signal();
                    self.inject(frame::encode(&ack), rssi, snr);
                }
            }
        }
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<ReceivedChunk>, LinkError> {
        Ok(self.inbox.pop_front())
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("pending", &self.inbox.len())
            .field("frames_written", &self.frames_written)
            .field("frames_lost", &self.frames_lost)
            .finish()
    }
}
