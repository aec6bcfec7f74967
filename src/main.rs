// paintfe-bridge headless entry point. See `cli` for the argument surface.

use std::process::ExitCode;

use clap::Parser;
use paintfe_bridge::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::init(args.verbose);

    cli::run(args)
}
