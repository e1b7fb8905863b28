//! mv7ctl CLI: control Shure MV7 USB microphones from the terminal.

use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

mod cli;

/// Shared shutdown flag, set by the Ctrl+C handler.
pub static RUNNING: AtomicBool = AtomicBool::new(true);

#[derive(Parser)]
#[command(
    name = "mv7ctl",
    version,
    about = "Control Shure MV7 USB microphones"
)]
struct Args {
    /// Output as JSON (for devices, status, config)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let args = Args::parse();

    ctrlc::set_handler(move || {
        RUNNING.store(false, Ordering::SeqCst);
    })
    .ok();

    if let Err(e) = cli::run(args.command, args.json) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
