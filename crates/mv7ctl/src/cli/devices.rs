//! `devices` subcommand: list connected MV7 microphones.

use super::{DevicesOutput, Result, device};

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = device::enumerate()?;

    if json {
        let output = DevicesOutput {
            count: devices.len(),
            devices,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    if devices.is_empty() {
        println!("No MV7 devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for device in &devices {
        let serial = device.serial.as_deref().unwrap_or("unknown serial");
        println!("  {} ({serial})", device.path);
    }
    Ok(())
}
