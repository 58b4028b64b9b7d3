use presslink::prelude::*;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use rand::Rng;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Display more information on the console. Can be used multiple times.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Seconds to wait when scanning for bluetooth devices
    #[arg(short, long, value_name = "SECONDS", default_value_t = 3.0)]
    scantime: f32,

    /// Only accept a device advertising this exact name
    #[arg(short, long)]
    name: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan for sensor pads
    Scan {},

    /// Connect to a sensor pad and write its readings to the console
    Print {
        /// Sample rate to request in Hz (0 selects the firmware default)
        #[arg(short, long)]
        rate: Option<u16>,
    },

    /// Feed random frames through a simulated sensor pad
    Simulate {
        /// Number of frames to generate
        #[arg(short, long, default_value_t = 10)]
        frames: usize,

        /// Frames per second (0 selects the firmware default)
        #[arg(short, long, default_value_t = 10)]
        rate: u16,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format!("{v:.3}"))
        .collect::<Vec<String>>()
        .join(", ")
}

/// Prints every value event and returns a notifier for the link going down.
fn print_events(events: &EventHub) -> Arc<Notify> {
    let printer = Handler::new(|event: &Event| {
        if let Some(values) = event.values() {
            println!("{:?}: {}", event.kind(), format_values(values));
        }
    });
    for kind in [
        EventKind::RawValues,
        EventKind::NormalizedRawValues,
        EventKind::Values,
        EventKind::NormalizedValues,
    ] {
        events.subscribe(kind, &printer);
    }

    let gone = Arc::new(Notify::new());
    let notify = Arc::clone(&gone);
    events.subscribe_once(
        EventKind::Disconnected,
        &Handler::new(move |_| notify.notify_one()),
    );
    gone
}

async fn print(conf: &App, rate: Option<u16>) -> Result<()> {
    let connection = Connection::new(bluetooth::BleTransport::new(conf));
    let gone = print_events(connection.events());

    connection.connect(&conf.selector()).await?;
    if let Some(rate) = rate {
        connection.set_sample_rate(rate).await?;
    }

    tokio::select! {
        _ = gone.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            connection.disconnect().await?;
            gone.notified().await;
        }
    }
    Ok(())
}

async fn simulate(conf: &App, frames: usize, rate: u16) -> Result<()> {
    let transport = mock::MockTransport::new(mock::MockDevice::new());
    let device = transport.device().clone();
    let connection = Connection::new(transport);
    let gone = print_events(connection.events());

    connection.connect(&conf.selector()).await?;
    connection.set_sample_rate(rate).await?;

    let period = Duration::from_secs_f64(1.0 / f64::from(protocol::sample_rate(rate)));
    for _ in 0..frames {
        let frame: Vec<u8> = {
            let mut rng = rand::thread_rng();
            (0..connection.channel_count())
                .flat_map(|_| {
                    let table_index: u16 = rng.gen_range(0..16);
                    let adc_code: u16 = rng.gen_range(1..=0x0fff);
                    (table_index << 12 | adc_code).to_le_bytes()
                })
                .collect()
        };
        device.notify(firmware::MAIN_CHARACTERISTIC_UUID, &frame);
        tokio::time::sleep(period).await;
    }

    connection.disconnect().await?;
    gone.notified().await;
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    log::debug!("{:?}", &cli);

    let conf = App {
        verbose: cli.verbose,
        scantime: cli.scantime,
        name: cli.name.clone(),
    };

    match &cli.command {
        Commands::Scan {} => {
            let devices = bluetooth::scan(&conf).await?;
            if devices.is_empty() {
                eprintln!("No matching BLE peripheral devices found.");
            }
            for device in devices {
                let name = device.name.as_deref().unwrap_or("(unnamed)");
                println!("Found {name} with address {}", device.address);
            }
        }
        Commands::Print { rate } => {
            print(&conf, *rate).await?;
        }
        Commands::Simulate { frames, rate } => {
            simulate(&conf, *frames, *rate).await?;
        }
    }

    Ok(())
}
