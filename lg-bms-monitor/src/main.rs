use clap::Parser;
use embassy_time::{Duration, Instant};
use embedded_can::Frame;
use lg_bms_decoder::csv::{CSV_HEADER, write_csv_rows};
use lg_bms_decoder::{CanFrame, Dispatch, ModuleManager, ModuleReport, PackConfig};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
#[allow(unused_imports)]
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

mod report;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CAN interface
    #[arg(short, long, default_value_t = String::from("can0"))]
    can_interface: String,

    /// Module strings wired in parallel
    #[arg(short, long, default_value_t = 1)]
    parallel_strings: u16,

    /// Time after the last frame before a module counts as absent
    #[arg(long, default_value_t = 5000)]
    stale_window_ms: u64,

    /// Time between two reports
    #[arg(short, long, default_value_t = 1000)]
    report_interval_ms: u64,

    /// Log every cell and the balancing state of each module
    #[arg(short, long)]
    details: bool,

    /// Decimals of the voltages in the detailed report
    #[arg(long, default_value_t = 3)]
    digits: usize,

    /// Append one CSV row per module and report to this file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Pack current written to the CSV rows
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    current: f32,

    /// State of charge written to the CSV rows
    #[arg(long, default_value_t = 0)]
    soc: i32,

    /// Log the pack summary and module reports as JSON
    #[arg(long)]
    json: bool,
}

fn register_tracing_subscriber(level_filter: LevelFilter) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(level_filter.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    info!(
        "Environment override for debug level to: {:?}",
        level_filter
    );
}

fn append_csv(path: &PathBuf, rows: &str) -> std::io::Result<()> {
    let new_file = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if new_file {
        writeln!(file, "{CSV_HEADER}")?;
    }
    file.write_all(rows.as_bytes())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    register_tracing_subscriber(LevelFilter::INFO);
    let args = Args::parse();
    info!("CAN interface: {}", args.can_interface);

    let config = PackConfig {
        parallel_strings: args.parallel_strings,
        stale_window: Duration::from_millis(args.stale_window_ms),
    };
    info!("Pack configuration: {:?}", config);
    let manager: ModuleManager = ModuleManager::new(config);
    let shared_manager = Arc::new(Mutex::new(manager));
    let manager_receiver = shared_manager.clone();

    let can_sock: socketcan::tokio::AsyncCanSocket<socketcan::CanSocket> =
        socketcan::tokio::AsyncCanSocket::open(args.can_interface.as_str())?;
    info!("Connected to CAN interface: {}", args.can_interface);

    // Spawn a task to read CAN frames
    tokio::spawn(async move {
        loop {
            let frame = match can_sock.read_frame().await {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to read CAN frame: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
            };

            let frame = if let socketcan::CanFrame::Data(frame) = frame {
                trace!(
                    "Received CAN frame: ID: {:?}, Data: {:?}",
                    frame.id(),
                    frame.data()
                );

                match CanFrame::from_encoded(frame.id(), frame.data()) {
                    Some(frame) => frame,
                    None => continue,
                }
            } else {
                debug!("Received non-data CAN frame: {:?}", frame);
                continue;
            };

            if let Ok(mut manager) = manager_receiver.lock() {
                match manager.dispatch(&frame, Instant::now()) {
                    Dispatch::UnknownField { address, selector } => {
                        debug!("Module {address} sent unknown field {selector:#04X}")
                    }
                    outcome => trace!("{:?}: {:?}", frame, outcome),
                }
            }
        }
    });

    let mut interval =
        tokio::time::interval(std::time::Duration::from_millis(args.report_interval_ms));
    loop {
        interval.tick().await;

        let now = Instant::now();
        let mut csv_rows = String::new();
        let (summary, reports) = {
            let Ok(manager) = shared_manager.lock() else {
                error!("Module manager lock poisoned");
                break;
            };
            if args.csv.is_some() {
                if let Err(e) = write_csv_rows(
                    &mut csv_rows,
                    &*manager,
                    now,
                    now.as_millis(),
                    args.current,
                    args.soc,
                ) {
                    warn!("Failed to format CSV rows: {e}");
                }
            }
            let reports: Vec<ModuleReport> = manager.reports(now).collect();
            (manager.summary(now), reports)
        };

        if args.details {
            report::log_details(&summary, &reports, args.digits);
        } else {
            report::log_summary(&summary, &reports);
        }

        if args.json {
            info!("{}", json!({ "pack": summary, "modules": reports }));
        }

        if let Some(path) = &args.csv {
            if let Err(e) = append_csv(path, &csv_rows) {
                error!("Failed to write CSV to {}: {e}", path.display());
            }
        }
    }

    Ok(())
}
