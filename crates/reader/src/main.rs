//! buzzer-reader
//!
//! Command-line front end for the buzzer reader: prints accepted presses,
//! lists attached buzzers and programs their logical ids.

use anyhow::{Context, Result};
use clap::Parser;
use common::setup_logging;
use protocol::{DeviceKey, LogicalId, PressEvent};
use reader::usb::RusbBackend;
use reader::{BuzzerReader, DiscoveryMode, ReaderConfig, load_config};
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "buzzer-reader")]
#[command(author, version, about = "Read presses from USB quiz buzzers")]
#[command(long_about = "
Discovers USB quiz buzzers, reads their presses and prints every accepted
(debounced) press with the buzzer's logical id.

EXAMPLES:
    # Print presses until Ctrl+C
    buzzer-reader

    # One JSON object per press
    buzzer-reader --json

    # List attached buzzers and their ids
    buzzer-reader --list-devices

    # Program the only attached buzzer to id 3
    buzzer-reader --set-id 3

    # Program a specific buzzer
    buzzer-reader --set-id 3 --device 001:007

CONFIGURATION:
    The reader looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/buzzer-reader/reader.toml
    3. /etc/buzzer-reader/reader.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List attached buzzers and exit
    #[arg(long)]
    list_devices: bool,

    /// Program a buzzer's logical id (1-255) and exit
    #[arg(long, value_name = "ID", value_parser = clap::value_parser!(u8).range(1..))]
    set_id: Option<u8>,

    /// Buzzer to program, as BUS:ADDR
    #[arg(long, value_name = "BUS:ADDR", requires = "set_id")]
    device: Option<DeviceKey>,

    /// Print presses as JSON lines
    #[arg(long)]
    json: bool,

    /// Force poll-based discovery
    #[arg(long)]
    poll: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = ReaderConfig::default();
        let path = ReaderConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if args.poll {
        config.reader.discovery = DiscoveryMode::Poll;
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.reader.log_level.clone());
    setup_logging(&log_level).context("Failed to setup logging")?;

    info!("buzzer-reader v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    if args.list_devices {
        return list_devices_mode(&config);
    }

    if let Some(id) = args.set_id {
        return set_id_mode(&config, args.device, LogicalId(id));
    }

    run(config, args.json).await
}

fn open_backend(config: &ReaderConfig) -> Result<RusbBackend> {
    RusbBackend::new(config.device.vendor_id, config.device.product_id)
        .context("Failed to initialize libusb")
}

/// List attached buzzers and exit
fn list_devices_mode(config: &ReaderConfig) -> Result<()> {
    let backend = open_backend(config)?;
    let devices = reader::probe_devices(&backend, config.read_timeout())
        .context("Failed to enumerate buzzers")?;

    if devices.is_empty() {
        println!("No buzzers found.");
        return Ok(());
    }

    println!("Found {} buzzer(s):\n", devices.len());
    for device in devices {
        match device.logical_id {
            Some(id) => println!("  {}  id {}", device.key, id),
            None => println!("  {}  id unknown", device.key),
        }
    }
    Ok(())
}

/// Program one buzzer and exit
fn set_id_mode(config: &ReaderConfig, target: Option<DeviceKey>, id: LogicalId) -> Result<()> {
    let backend = open_backend(config)?;
    let (key, confirmed) = reader::program_logical_id(&backend, target, id, config.read_timeout())
        .context("Failed to program logical id")?;

    println!("Buzzer {} now has id {}", key, confirmed);
    if confirmed != id {
        error!("Buzzer {} confirmed id {} instead of {}", key, confirmed, id);
    }
    Ok(())
}

/// Print presses until Ctrl+C
async fn run(config: ReaderConfig, json: bool) -> Result<()> {
    let mut reader = BuzzerReader::open(config).context("Failed to open buzzer reader")?;

    reader.register_events(move |event: PressEvent| {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => error!("Failed to encode press: {}", e),
            }
        } else {
            println!("Buzzer {} pressed ({})", event.logical_id, event.device);
        }
    });

    reader.start().context("Failed to start buzzer reader")?;
    info!("Press Ctrl+C to stop");

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    reader.stop();
    Ok(())
}
