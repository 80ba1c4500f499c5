use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;

use vmtrans::{error, info, Config};

/// Translate VM code into Hack assembly.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// A `.vm` file, or a directory of `.vm` files
    input: PathBuf,
}

fn run(args: Args) -> anyhow::Result<()> {
    let output = vmtrans::run(&args.input, &Config::default())
        .with_context(|| format!("failed to translate {}", args.input.display()))?;
    info!("done: {}", output.display());
    Ok(())
}

fn main() {
    let args = Args::parse();
    if let Err(err) = run(args) {
        error!("{:#}", err);
        process::exit(1);
    }
}
