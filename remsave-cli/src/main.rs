use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod dump;

/// Decode a Remnant II save file and print it as JSON.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the .sav file to decode.
    input: PathBuf,

    /// Root directory for the debug dumps written when DEBUG_SAVE_BINARY or
    /// DEBUG_SAVE_JSON is set.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> ExitCode {
    let filter = if *config::DEBUG {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let bytes = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let save = remsave::decode_bytes(&bytes)
        .with_context(|| format!("failed to decode {}", args.input.display()))?;

    dump::write_debug_dumps(&args.input, &args.out_dir, &bytes, &save)?;

    let json = serde_json::to_string_pretty(&save)?;
    println!("{json}");
    Ok(())
}
