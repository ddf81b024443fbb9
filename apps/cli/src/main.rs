use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use co2_core::events::{Co2Observer, ConnectionStatus};
use co2_core::session::{Co2Session, SessionConfig};
use co2_core::transport::HidApiTransport;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "USB CO2 monitor reader", long_about = None)]
struct Args {
    /// Path to a TOML session config
    #[arg(long)]
    config: Option<String>,

    /// Polling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints readings to stdout; status changes go to the log.
struct PrintObserver;

impl Co2Observer for PrintObserver {
    fn on_co2_reading(&self, ppm: u16) {
        println!("CO2:\t{ppm} ppm");
    }

    fn on_temperature_reading(&self, celsius: f32) {
        println!("Temp:\t{celsius:.2} C");
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        info!(status = %status, "Connection status");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(interval_ms) = args.interval_ms {
        config.poll_interval_ms = interval_ms;
    }

    info!("Starting CO2 monitor (hidapi backend)...");

    let transport = HidApiTransport::new()?;
    let session = Co2Session::with_observer(transport, config, Arc::new(PrintObserver));
    session.start_continuous_updates();

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
