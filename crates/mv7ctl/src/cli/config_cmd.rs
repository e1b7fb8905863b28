//! `config` subcommand: show configuration and file paths.

use super::{Config, ConfigOutput, Result, kv, kv_width};

pub(super) fn cmd_config(json: bool) -> Result<()> {
    let path = Config::config_path();
    let exists = path.as_deref().is_some_and(|p| p.exists());
    let config = Config::load_or_default();

    if json {
        let output = ConfigOutput {
            config_file: path.map(|p| p.display().to_string()),
            config_file_exists: exists,
            settings: config,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return Ok(());
    }

    let w = kv_width(&[
        "Config file:",
        "Device path:",
        "Handshake timeout:",
        "Settle delay:",
        "Read timeout:",
    ]);

    let file = match &path {
        Some(p) if exists => p.display().to_string(),
        Some(p) => format!("{} (not created yet)", p.display()),
        None => "unavailable on this platform".to_string(),
    };
    kv("Config file:", file, w);
    kv(
        "Device path:",
        if config.device_path.is_empty() {
            "(first discovered device)".to_string()
        } else {
            config.device_path.clone()
        },
        w,
    );
    kv(
        "Handshake timeout:",
        if config.handshake_timeout_secs == 0 {
            "wait forever".to_string()
        } else {
            format!("{} s", config.handshake_timeout_secs)
        },
        w,
    );
    kv("Settle delay:", format!("{} ms", config.settle_delay_ms), w);
    kv("Read timeout:", format!("{} ms", config.read_timeout_ms), w);

    for problem in config.validate() {
        log::warn!("config: {problem}");
    }
    Ok(())
}
