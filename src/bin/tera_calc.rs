//! Reduce the raw traces of a tera-ohmmeter run to corrected resistances
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use tera_calc::config::Config;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory holding the trace, calibration and instrument files
    working_directory: PathBuf,

    /// Analysis configuration, relative to the working directory
    #[arg(short, long, default_value = "tera_calc.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    // Initialize tracing with RUST_LOG env var, defaulting to info
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let outcome = Config::from_file(&args.working_directory.join(&args.config))
        .and_then(|config| tera_calc::analysis::run(&args.working_directory, &config));

    match outcome {
        Ok(result) => {
            println!(
                "ambient: T = {}, RH = {}",
                result.ambient_temperature, result.ambient_humidity
            );
            for (label, channel) in &result.channels {
                println!(
                    "{label} {:<16} {}",
                    channel.measurement.resistor_name, channel.true_value
                );
            }
            for (label, reason) in &result.failures {
                println!("{label} failed: {reason}");
            }
            for &channel in &result.unknown_probes {
                println!(
                    "{} temperature probe not in the instrument database",
                    tera_calc::channel::label(channel)
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("analysis failed: {e}");
            ExitCode::FAILURE
        }
    }
}
