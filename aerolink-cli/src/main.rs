//! Aerolink CLI - simulated mission runner
//!
//! Runs the full service (radio scheduler plus localization daemon) over a
//! simulated radio, feeding it synthetic two-sensor detections of a moving
//! target. Useful for exercising the pipeline without hardware and for
//! watching retry behavior under injected frame loss.

use std::process;

use clap::Parser;

use aerolink::config::{ConfigFile, LoggingSettings};
use aerolink::logging;

mod runner;

#[derive(Parser)]
#[command(name = "aerolink")]
#[command(about = "Run a simulated aerolink mission", long_about = None)]
struct Args {
    /// Mission duration in seconds
    #[arg(long, default_value = "30")]
    duration: u64,

    /// Probability in [0, 1] that a transmitted frame is lost
    #[arg(long, default_value = "0.2")]
    loss_rate: f64,

    /// Ack timeout in seconds
    #[arg(long, default_value = "2.0")]
    ack_timeout: f64,

    /// Maximum transmission attempts per message
    #[arg(long, default_value = "3")]
    retries: u8,

    /// Detections required before a track is created
    #[arg(long, default_value = "2")]
    min_detections: usize,

    /// Latitude of the simulated operating area
    #[arg(long, default_value = "43.6")]
    lat: f64,

    /// Longitude of the simulated operating area
    #[arg(long, default_value = "1.44")]
    lon: f64,

    /// Directory for log files
    #[arg(long, default_value = "logs")]
    log_dir: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if !(0.0..=1.0).contains(&args.loss_rate) {
        eprintln!("Error: --loss-rate must be between 0.0 and 1.0");
        process::exit(1);
    }
    if args.ack_timeout <= 0.0 {
        eprintln!("Error: --ack-timeout must be positive");
        process::exit(1);
    }

    let mut config = ConfigFile::default();
    config.radio.ack_timeout_secs = args.ack_timeout;
    config.radio.retry_count = args.retries;
    config.localization.min_detections = args.min_detections;
    config.logging = LoggingSettings {
        directory: args.log_dir.clone().into(),
        file: "aerolink.log".to_string(),
    };

    let _guard = match logging::init_logging(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    println!("aerolink {} - simulated mission", aerolink::VERSION);
    println!("  Area: {}, {}", args.lat, args.lon);
    println!("  Duration: {}s", args.duration);
    println!("  Frame loss: {:.0}%", args.loss_rate * 100.0);
    println!();

    let mission = runner::Mission {
        lat: args.lat,
        lon: args.lon,
        loss_rate: args.loss_rate,
        duration_secs: args.duration,
    };
    if let Err(e) = runner::run(config, mission).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
