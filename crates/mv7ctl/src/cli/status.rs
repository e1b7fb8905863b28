//! `status` subcommand: connect, synchronize, and print the device state.

use super::{Config, Result, StatusOutput, kv, kv_width, open_engine};

pub(super) fn cmd_status(json: bool) -> Result<()> {
    let config = Config::load_or_default();
    let (mic, _events) = open_engine(&config)?;
    let state = mic.snapshot();
    mic.close();

    if json {
        let output = StatusOutput {
            version: env!("CARGO_PKG_VERSION").into(),
            state,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    let absent = || "?".to_string();
    let on_off = |v: Option<bool>| {
        v.map(|v| if v { "on" } else { "off" }.to_string())
            .unwrap_or_else(absent)
    };
    let centi_db = |v: Option<i32>| {
        v.map(|v| format!("{:.2} dB", f64::from(v) / 100.0))
            .unwrap_or_else(absent)
    };
    let level = |v: Option<u32>| v.map(|v| format!("0x{v:08X}")).unwrap_or_else(absent);

    let w = kv_width(&[
        "Package version:",
        "Firmware version:",
        "DSP version:",
        "Serial number:",
        "Mode:",
        "Lock:",
        "Monitor mute:",
        "Monitor volume:",
        "Monitor mix (pc):",
        "Monitor mix (mic):",
        "Input mute:",
        "Input volume:",
        "Compressor:",
        "Limiter:",
        "High-pass filter:",
        "Presence filter:",
        "Auto distance:",
        "Auto tone:",
    ]);

    kv("Package version:", state.package_version.clone().unwrap_or_else(absent), w);
    kv("Firmware version:", state.firmware_version.clone().unwrap_or_else(absent), w);
    kv("DSP version:", state.dsp_version.clone().unwrap_or_else(absent), w);
    kv("Serial number:", state.serial_number.clone().unwrap_or_else(absent), w);
    kv("Mode:", state.mode.map(|m| m.to_string()).unwrap_or_else(absent), w);
    kv("Lock:", on_off(state.lock), w);
    kv("Monitor mute:", on_off(state.monitor_mute), w);
    kv("Monitor volume:", centi_db(state.monitor_volume), w);
    kv("Monitor mix (pc):", level(state.monitor_mix_pc), w);
    kv("Monitor mix (mic):", level(state.monitor_mix_mic), w);
    kv("Input mute:", on_off(state.input_mute), w);
    kv("Input volume:", centi_db(state.input_volume), w);
    kv("Compressor:", state.compressor.map(|c| c.to_string()).unwrap_or_else(absent), w);
    kv("Limiter:", on_off(state.limiter), w);
    kv("High-pass filter:", on_off(state.high_pass_filter), w);
    kv("Presence filter:", on_off(state.presence_filter), w);
    kv("Auto distance:", state.auto_distance.map(|d| d.to_string()).unwrap_or_else(absent), w);
    kv("Auto tone:", state.auto_tone.map(|t| t.to_string()).unwrap_or_else(absent), w);
    Ok(())
}
