//! CLI for driving a Move hub: scan, motor and LED commands, raw
//! notification listening.

use clap::{Parser, Subcommand};
use movehub::{
    logging, BtleTransport, HubError, HubEvent, HubScanner, HubSession, HubSettings, LedColor,
    Port,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "movehub")]
#[command(about = "Drive a Move hub over Bluetooth LE")]
struct Cli {
    /// Settings file (JSON); built-in defaults are used when absent
    #[arg(short, long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for hubs and list them
    Scan {
        /// Scan duration in seconds (defaults to the settings value)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Run a motor for a duration
    MotorTime {
        /// Motor port: A, B, AB, C or D
        #[arg(short, long)]
        port: Port,
        /// Duration in milliseconds
        #[arg(short, long)]
        ms: u32,
        /// Duty cycle, -100..=100; the sign is the rotation direction
        #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
        duty: i8,
    },
    /// Run a motor to an angle
    MotorAngle {
        /// Motor port: A, B, AB, C or D
        #[arg(short, long)]
        port: Port,
        /// Angle in encoder units
        #[arg(short, long)]
        angle: u32,
        /// Duty cycle, -100..=100; the sign is the rotation direction
        #[arg(long, default_value_t = 100, allow_negative_numbers = true)]
        duty: i8,
    },
    /// Set the hub LED color
    Led {
        /// One of: off, pink, purple, blue, lightblue, cyan, green,
        /// yellow, orange, red, white
        #[arg(short, long)]
        color: LedColor,
    },
    /// Connect and print raw hub notifications
    Listen {
        /// How long to listen, in seconds
        #[arg(short = 'd', long, default_value = "30")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => HubSettings::load(path)?,
        None => HubSettings::default(),
    };
    let _logging = logging::init_logging(&settings.log)?;

    match cli.command {
        Commands::Scan { duration } => {
            let (events, _rx) = mpsc::unbounded_channel();
            let mut scanner = HubScanner::new(events).await?;
            let duration = duration
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.scan_duration());
            println!("Scanning for hubs ({}s)...", duration.as_secs());

            let hubs = scanner.scan_for(duration).await?;
            if hubs.is_empty() {
                println!("No hubs found.");
            }
            for hub in hubs {
                let rssi = hub
                    .rssi
                    .map(|r| format!("{r} dBm"))
                    .unwrap_or_else(|| "N/A".to_string());
                println!(
                    "  {} ({}) RSSI: {}",
                    hub.name.as_deref().unwrap_or("Unknown"),
                    hub.address,
                    rssi
                );
            }
        }
        Commands::MotorTime { port, ms, duty } => {
            let (mut session, _rx) = open_session(&settings).await?;
            session.run_motor_for_duration(port, ms, duty).await?;
            println!("Motor command sent.");
            session.disconnect().await?;
        }
        Commands::MotorAngle { port, angle, duty } => {
            let (mut session, _rx) = open_session(&settings).await?;
            session.run_motor_to_angle(port, angle, duty).await?;
            println!("Motor command sent.");
            session.disconnect().await?;
        }
        Commands::Led { color } => {
            let (mut session, _rx) = open_session(&settings).await?;
            session.set_led(color).await?;
            println!("LED set.");
            session.disconnect().await?;
        }
        Commands::Listen { seconds } => {
            let (mut session, mut rx) = open_session(&settings).await?;
            println!("Listening for notifications ({seconds}s)...");

            let deadline = tokio::time::sleep(Duration::from_secs(seconds));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = rx.recv() => match event {
                        Some(HubEvent::DataReceived(bytes)) => println!("  data: {bytes:02x?}"),
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            session.disconnect().await?;
        }
    }

    Ok(())
}

/// Scan for the first hub, connect, and hand back the ready session
/// together with the lifecycle event receiver.
async fn open_session(
    settings: &HubSettings,
) -> anyhow::Result<(HubSession<BtleTransport>, mpsc::UnboundedReceiver<HubEvent>)> {
    let (events, rx) = mpsc::unbounded_channel();

    let mut scanner = HubScanner::new(events.clone()).await?;
    println!("Scanning for a hub...");
    let (device, peripheral) = scanner.find_first(settings.scan_duration()).await?;
    println!(
        "Found hub: {} ({})",
        device.name.as_deref().unwrap_or("Unknown"),
        device.address
    );

    let mut session = HubSession::with_config(
        device,
        BtleTransport::new(peripheral),
        events,
        settings.session_config(),
    );
    println!("Connecting...");
    session.connect().await?;
    if !session.is_ready() {
        return Err(HubError::ControlCharacteristicMissing.into());
    }
    println!("Connected!");

    Ok((session, rx))
}
