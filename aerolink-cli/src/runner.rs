//! Simulated mission loop.
//!
//! Feeds the service synthetic detections from two virtual sensors sighting
//! a target drifting east, while logging every telemetry event. The mission
//! ends at the deadline or on Ctrl-C.

use std::error::Error;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use aerolink::config::ConfigFile;
use aerolink::events::TelemetryEvent;
use aerolink::geo::{GeoPosition, LocalFrame};
use aerolink::localization::{Detection, Observation, SensorPose};
use aerolink::radio::{SimulatedDevice, SimulatedDeviceConfig};
use aerolink::service::{AerolinkService, ServiceError};

/// Mission parameters taken from the command line.
pub struct Mission {
    pub lat: f64,
    pub lon: f64,
    pub loss_rate: f64,
    pub duration_secs: u64,
}

/// Sensor baseline between the two virtual observers, in meters.
const BASELINE_M: f64 = 120.0;

/// Detection cadence.
const DETECTION_INTERVAL: Duration = Duration::from_millis(500);

pub async fn run(config: ConfigFile, mission: Mission) -> Result<(), Box<dyn Error>> {
    let device = SimulatedDevice::new(SimulatedDeviceConfig {
        loss_rate: mission.loss_rate,
        ..Default::default()
    });
    let mut service = AerolinkService::start(config, Box::new(device));

    let events = service
        .take_events()
        .ok_or("telemetry events already taken")?;
    let logger = tokio::spawn(log_events(events));

    let anchor = GeoPosition::new(mission.lat, mission.lon, 120.0)?;
    let frame = LocalFrame::new(anchor);
    let sensor_b = frame.to_geo(BASELINE_M, 0.0, 120.0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(mission.duration_secs);
    let mut ticker = tokio::time::interval(DETECTION_INTERVAL);
    let started = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, ending mission");
                break;
            }
            _ = tokio::time::sleep_until(deadline) => {
                info!("mission duration reached");
                break;
            }
            _ = ticker.tick() => {
                let t = started.elapsed().as_secs_f64();
                // Target ambles east across the operating area.
                let target = (40.0 + 2.0 * t, 260.0);
                submit_sighting(&service, "drone-1/cam0", anchor, (0.0, 0.0), target);
                submit_sighting(&service, "drone-2/cam0", sensor_b, (BASELINE_M, 0.0), target);
            }
        }
    }

    print_summary(&service);
    service.shutdown().await;
    logger.abort();
    Ok(())
}

/// Builds and submits one bearing detection of `target` (local meters) as
/// seen from a sensor at `origin` (local meters).
fn submit_sighting(
    service: &AerolinkService,
    source_id: &str,
    position: GeoPosition,
    origin: (f64, f64),
    target: (f64, f64),
) {
    let bearing_deg = (target.0 - origin.0)
        .atan2(target.1 - origin.1)
        .to_degrees()
        .rem_euclid(360.0);
    let detection = Detection {
        source_id: source_id.to_string(),
        timestamp: Utc::now(),
        object_class: "vehicle".to_string(),
        confidence: 0.9,
        observation: Observation::Bearing { bearing_deg },
        pose: SensorPose {
            position,
            heading_deg: bearing_deg,
            fov_deg: 60.0,
        },
    };

    match service.submit_detection(detection) {
        Ok(()) => {}
        Err(ServiceError::DetectionQueueFull) => {
            warn!(source_id, "detection dropped, queue full");
        }
        Err(err) => warn!(source_id, error = %err, "detection rejected"),
    }
}

async fn log_events(mut events: aerolink::events::EventReceiver) {
    while let Some(event) = events.recv().await {
        match &event {
            TelemetryEvent::ObjectLocalized { object } => {
                info!(
                    track_id = %object.track_id,
                    class = %object.object_class,
                    lat = object.position.lat,
                    lon = object.position.lon,
                    confidence = object.confidence,
                    "object localized"
                );
            }
            TelemetryEvent::TrackEvicted { track_id } => {
                info!(track_id = %track_id, "track evicted");
            }
            TelemetryEvent::MessageAcked { id, attempts } => {
                info!(id = %id, attempts, "message acked");
            }
            TelemetryEvent::MessageFailed {
                id,
                attempts,
                reason,
            } => {
                warn!(id = %id, attempts, reason = %reason, "message failed");
            }
            TelemetryEvent::MessageRetried { id, attempt } => {
                info!(id = %id, attempt, "message retried");
            }
            TelemetryEvent::CommandReceived { payload } => {
                info!(bytes = payload.len(), "command received");
            }
            TelemetryEvent::LinkHealthChanged { previous, current } => {
                info!(previous = %previous, current = %current, "link health changed");
            }
            TelemetryEvent::PingSent { sequence } => {
                info!(sequence, "keep-alive ping sent");
            }
        }
    }
}

fn print_summary(service: &AerolinkService) {
    let stats = service.link_stats();
    let objects = service.current_objects();

    println!();
    println!("Mission summary:");
    println!("  Link health: {}", stats.health);
    println!(
        "  Frames: {} sent, {} received, {} dropped on decode",
        stats.frames_sent, stats.frames_received, stats.decode_drops
    );
    println!(
        "  Messages: {} acked, {} failed, {} retransmissions",
        stats.messages_acked, stats.messages_failed, stats.retransmissions
    );
    if let (Some(rssi), Some(snr)) = (stats.rssi_avg, stats.snr_avg) {
        println!("  Signal: {:.1} dBm RSSI, {:.1} dB SNR", rssi, snr);
    }
    println!("  Tracked objects: {}", objects.len());
    for object in objects {
        println!(
            "    {} {} at {:.6}, {:.6} (confidence {:.2}, age {:.1}s)",
            object.track_id,
            object.object_class,
            object.position.lat,
            object.position.lon,
            object.confidence,
            object.age_secs
        );
    }
}
