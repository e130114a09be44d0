use clap::Parser;
use embedded_can::{Frame, StandardId};
use lg_bms_decoder::decode::{encode_temperature, encode_voltage};
use lg_bms_decoder::{CELLS_PER_MODULE, ModuleField, ModuleFrame, chain_id};
use rand::Rng;
use socketcan::{CanFrame, tokio::CanSocket};
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{Level, debug, error, info, trace, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// CAN interface
    #[arg(short, long, default_value_t = String::from("vcan0"))]
    can_interface: String,

    /// Number of daisy chains to simulate
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=4))]
    chains: u8,

    /// Modules on every chain
    #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u8).range(1..=16))]
    modules: u8,

    /// Nominal cell voltage
    #[arg(long, default_value_t = 3.7)]
    cell_voltage: f32,

    /// Nominal sensor temperature
    #[arg(long, default_value_t = 25.0, allow_negative_numbers = true)]
    temperature: f32,

    /// Time between two complete rounds of module data
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,
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

/// Every field one module reports in a round
fn module_fields(args: &Args, address: u8, rng: &mut impl Rng) -> Vec<ModuleFrame> {
    let mut balance_status = 0_u16;
    let mut frames: Vec<ModuleFrame> = (0..CELLS_PER_MODULE as u8)
        .map(|cell| {
            let volts = args.cell_voltage + rng.random_range(-0.05..0.05);
            // balance the cells that drifted high
            if volts > args.cell_voltage + 0.03 {
                balance_status |= 1 << cell;
            }
            ModuleFrame {
                address,
                field: ModuleField::Cell(cell),
                sample: encode_voltage(volts),
            }
        })
        .collect();

    for field in [
        ModuleField::NegativeTemperature,
        ModuleField::PositiveTemperature,
    ] {
        let celsius = args.temperature + rng.random_range(-1.0..1.0);
        frames.push(ModuleFrame {
            address,
            field,
            sample: encode_temperature(celsius),
        });
    }

    frames.push(ModuleFrame {
        address,
        field: ModuleField::BalanceStatus,
        sample: balance_status,
    });
    frames
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    register_tracing_subscriber(LevelFilter::INFO);
    let args = Args::parse();
    info!("CAN interface: {}", args.can_interface);

    let chain_ids = (0..args.chains)
        .map(|chain| chain_id(chain).ok_or("chain without identifier"))
        .collect::<Result<Vec<StandardId>, _>>()?;

    let can_sock: socketcan::tokio::AsyncCanSocket<socketcan::CanSocket> =
        CanSocket::open(args.can_interface.as_str())?;
    info!("Connected to CAN interface: {}", args.can_interface);
    info!(
        "Simulating {} chain(s) with {} module(s) each",
        args.chains, args.modules
    );

    let mut rng = rand::rng();
    loop {
        let mut sent = 0_u32;
        for id in &chain_ids {
            for address in 0..args.modules {
                for module_frame in module_fields(&args, address, &mut rng) {
                    let Some(frame) = CanFrame::new(*id, &module_frame.encode()) else {
                        warn!("Unable to build CAN frame for {:?}", module_frame);
                        continue;
                    };
                    trace!("CAN frame: {:?}", frame);

                    match can_sock.write_frame(frame).await {
                        Ok(_) => sent = sent.saturating_add(1),
                        Err(e) => error!("Failed to send CAN frame: {e}"),
                    }
                }
            }
        }
        debug!("Sent {sent} frames");

        tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
    }
}
