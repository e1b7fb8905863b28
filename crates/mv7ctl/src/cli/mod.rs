//! CLI subcommands: device discovery, status, property writes, monitoring.

mod config_cmd;
mod console;
mod devices;
mod identify;
mod set;
mod status;
mod watch;

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

pub(super) use crate::RUNNING;
pub(super) use mv7ctl_lib::config::Config;
pub(super) use mv7ctl_lib::device::{self, DeviceError, DiscoveredDevice};
pub(super) use mv7ctl_lib::engine::{MicEvent, Microphone};
pub(super) use mv7ctl_lib::error::{Mv7Error, Result};
pub(super) use mv7ctl_lib::state::MicState;
pub(super) use mv7ctl_lib::transport::{TextHid, Transport};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
pub(super) fn kv_width(keys: &[&str]) -> usize {
    keys.iter().map(|k| k.len()).max().unwrap_or(0) + PADDING
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, width: usize) {
    println!("{key:<width$}{value}");
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDevice>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub version: String,
    pub state: MicState,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
}

#[derive(Subcommand)]
pub enum Command {
    /// List connected MV7 microphones
    Devices,

    /// Connect and show the full device state
    Status,

    /// Write one property, e.g. `set compressor medium`
    Set {
        /// Property name as shown by `status` (e.g. monitor-volume)
        property: String,
        /// New value: on/off, an integer, or an enumeration name
        value: String,
    },

    /// Stream property changes until interrupted
    Watch,

    /// Interactive console: raw commands in, device messages out
    Console,

    /// Ask the device to flash its LEDs
    Identify,

    /// Show current configuration and file paths
    Config,
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool) -> Result<()> {
    match cmd {
        Command::Devices => devices::cmd_devices(json),
        Command::Status => status::cmd_status(json),
        Command::Set { property, value } => {
            if json {
                warn_json_unsupported("set");
            }
            set::cmd_set(&property, &value)
        }
        Command::Watch => {
            if json {
                warn_json_unsupported("watch");
            }
            watch::cmd_watch()
        }
        Command::Console => {
            if json {
                warn_json_unsupported("console");
            }
            console::cmd_console()
        }
        Command::Identify => {
            if json {
                warn_json_unsupported("identify");
            }
            identify::cmd_identify()
        }
        Command::Config => config_cmd::cmd_config(json),
    }
}

// ── Shared device plumbing ──

/// Open the configured (or first discovered) device transport.
pub(super) fn open_transport(config: &Config) -> Result<TextHid> {
    let transport = if config.device_path.is_empty() {
        device::open_first()?
    } else {
        device::open_path(&config.device_path)?
    };
    Ok(transport)
}

/// Open the device and run the engine through initialization.
///
/// Distinguishes "no device found" (enumeration came up empty) from
/// "device unresponsive" (present but the handshake stalled).
pub(super) fn open_engine(config: &Config) -> Result<(Microphone, mpsc::Receiver<MicEvent>)> {
    let transport = open_transport(config)?;
    let mut mic = Microphone::new(transport, config.engine_options());
    let events = mic.subscribe();
    mic.initialize()?;

    loop {
        if !RUNNING.load(Ordering::SeqCst) {
            return Err(Mv7Error::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "interrupted",
            )));
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(MicEvent::Initialized) => return Ok((mic, events)),
            Ok(MicEvent::Unresponsive) => return Err(DeviceError::Unresponsive.into()),
            Ok(MicEvent::ConnectionLost(reason)) => {
                return Err(DeviceError::ReadFailed(reason).into());
            }
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Err(DeviceError::ReadFailed("listener exited".into()).into());
            }
        }
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_pads_longest_key() {
        let w = kv_width(&["Mode:", "Monitor volume:"]);
        // "Monitor volume:" = 15 + PADDING = 17
        assert_eq!(w, 17);
    }

    #[test]
    fn kv_width_empty() {
        assert_eq!(kv_width(&[]), PADDING);
    }
}
