use clap::Parser;
use palmsoc::{Args, EmulatorCore, StopReason};
use std::error::Error;
use tracing::info;

/// Print an error and everything that caused it
fn report(context: &str, err: &dyn Error) {
    eprintln!("{}: {}", context, err);
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {}", cause);
        source = cause.source();
    }
}

fn main() {
    // Parse command-line arguments
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let soc_config = match args.to_soc_config() {
        Ok(config) => config,
        Err(e) => {
            report("Failed to load images", &e);
            std::process::exit(2);
        }
    };

    info!("=== Creating Emulator ===");
    let mut emulator = match EmulatorCore::new(soc_config, args.to_emulator_config()) {
        Ok(emu) => emu,
        Err(e) => {
            report("Failed to create emulator", &e);
            std::process::exit(2);
        }
    };
    info!("Entry: {:#X}", emulator.soc().pc());

    info!("=== Running Emulator (Headless) ===");
    let stop_reason = emulator.run();

    info!("=== Emulation Complete ===");
    info!("Stop reason: {:?}", stop_reason);
    emulator.print_final_state();

    let exit_code = match stop_reason {
        StopReason::CycleLimit => 0,
        StopReason::Timeout if args.cycles.is_some() => {
            eprintln!("Timeout reached before the cycle limit");
            1
        }
        StopReason::Timeout => 0,
    };
    std::process::exit(exit_code);
}
