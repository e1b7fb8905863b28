//! `set` subcommand: write one property through the typed setters.

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use mv7ctl_lib::device;
use mv7ctl_lib::properties::{CompressorState, DistanceState, Mode, PropertyId, ToneState};

use super::{Config, Microphone, Mv7Error, RUNNING, Result, open_engine};

/// How long a `set mode` invocation waits for the switch to settle.
const MODE_SETTLE_BOUND: Duration = Duration::from_secs(30);

/// A parsed, validated property write. Arguments are checked before any
/// hardware is touched so usage errors fail fast.
#[derive(Debug, Clone, PartialEq)]
enum Request {
    Lock(bool),
    MonitorMute(bool),
    MonitorVolume(i32),
    InputMute(bool),
    InputVolume(i32),
    MonitorMixMic(u32),
    MonitorMixPc(u32),
    Compressor(CompressorState),
    Limiter(bool),
    HighPassFilter(bool),
    PresenceFilter(bool),
    AutoDistance(DistanceState),
    AutoTone(ToneState),
    Mode(Mode),
}

impl Request {
    fn parse(property: &str, value: &str) -> Result<Request> {
        let request = match property {
            "lock" => Request::Lock(parse_switch(value)?),
            "monitor-mute" => Request::MonitorMute(parse_switch(value)?),
            "monitor-volume" => Request::MonitorVolume(parse_centi_db(value)?),
            "input-mute" => Request::InputMute(parse_switch(value)?),
            "input-volume" => Request::InputVolume(parse_centi_db(value)?),
            "monitor-mix-mic" => Request::MonitorMixMic(parse_level(value)?),
            "monitor-mix-pc" => Request::MonitorMixPc(parse_level(value)?),
            "compressor" => Request::Compressor(parse_compressor(value)?),
            "limiter" => Request::Limiter(parse_switch(value)?),
            "high-pass-filter" => Request::HighPassFilter(parse_switch(value)?),
            "presence-filter" => Request::PresenceFilter(parse_switch(value)?),
            "auto-distance" => Request::AutoDistance(parse_distance(value)?),
            "auto-tone" => Request::AutoTone(parse_tone(value)?),
            "mode" => Request::Mode(parse_mode(value)?),
            other => {
                return Err(Mv7Error::Argument(format!(
                    "unknown property `{other}` (run `mv7ctl status` for the list)"
                )));
            }
        };
        Ok(request)
    }

    fn property_id(&self) -> PropertyId {
        match self {
            Request::Lock(_) => PropertyId::Lock,
            Request::MonitorMute(_) => PropertyId::MonitorMute,
            Request::MonitorVolume(_) => PropertyId::MonitorVolume,
            Request::InputMute(_) => PropertyId::InputMute,
            Request::InputVolume(_) => PropertyId::InputVolume,
            Request::MonitorMixMic(_) => PropertyId::MonitorMixMic,
            Request::MonitorMixPc(_) => PropertyId::MonitorMixPc,
            Request::Compressor(_) => PropertyId::Compressor,
            Request::Limiter(_) => PropertyId::Limiter,
            Request::HighPassFilter(_) => PropertyId::HighPassFilter,
            Request::PresenceFilter(_) => PropertyId::PresenceFilter,
            Request::AutoDistance(_) => PropertyId::AutoDistance,
            Request::AutoTone(_) => PropertyId::AutoTone,
            Request::Mode(_) => PropertyId::Mode,
        }
    }

    fn apply(&self, mic: &Microphone) -> device::Result<()> {
        match *self {
            Request::Lock(v) => mic.set_lock(v),
            Request::MonitorMute(v) => mic.set_monitor_mute(v),
            Request::MonitorVolume(v) => mic.set_monitor_volume(v),
            Request::InputMute(v) => mic.set_input_mute(v),
            Request::InputVolume(v) => mic.set_input_volume(v),
            Request::MonitorMixMic(v) => mic.set_monitor_mix_mic(v),
            Request::MonitorMixPc(v) => mic.set_monitor_mix_pc(v),
            Request::Compressor(v) => mic.set_compressor(v),
            Request::Limiter(v) => mic.set_limiter(v),
            Request::HighPassFilter(v) => mic.set_high_pass_filter(v),
            Request::PresenceFilter(v) => mic.set_presence_filter(v),
            Request::AutoDistance(v) => mic.set_auto_distance(v),
            Request::AutoTone(v) => mic.set_auto_tone(v),
            Request::Mode(v) => mic.set_mode(v),
        }
    }
}

pub(super) fn cmd_set(property: &str, value: &str) -> Result<()> {
    let request = Request::parse(property, value)?;

    let config = Config::load_or_default();
    let (mic, _events) = open_engine(&config)?;
    request.apply(&mic)?;

    if let Request::Mode(_) = request {
        // The switch is only done once the device has confirmed it and the
        // mode-dependent properties are back; report the settled value.
        let deadline = Instant::now() + MODE_SETTLE_BOUND;
        while mic.mode() == Some(Mode::Loading)
            && RUNNING.load(Ordering::SeqCst)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(50));
        }
        match mic.mode() {
            Some(mode) if mode != Mode::Loading => println!("mode = {mode}"),
            _ => log::warn!("mode switch did not settle within {MODE_SETTLE_BOUND:?}"),
        }
    } else if let Some(current) = mic.snapshot().get(request.property_id()) {
        println!("{property} = {current}");
    }

    mic.close();
    Ok(())
}

// ── Value parsers ──

fn parse_switch(value: &str) -> Result<bool> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(Mv7Error::Argument(format!("expected on/off, got `{other}`"))),
    }
}

/// Centi-dB integer, e.g. `-1200` for -12.00 dB.
fn parse_centi_db(value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| Mv7Error::Argument(format!("expected centi-dB integer, got `{value}`")))
}

/// Raw mix level, decimal or `0x`-prefixed hex.
fn parse_level(value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| Mv7Error::Argument(format!("expected mix level, got `{value}`")))
}

fn parse_compressor(value: &str) -> Result<CompressorState> {
    match value {
        "off" => Ok(CompressorState::Off),
        "light" => Ok(CompressorState::Light),
        "medium" => Ok(CompressorState::Medium),
        "heavy" => Ok(CompressorState::Heavy),
        other => Err(Mv7Error::Argument(format!(
            "expected off/light/medium/heavy, got `{other}`"
        ))),
    }
}

fn parse_distance(value: &str) -> Result<DistanceState> {
    match value {
        "off" => Ok(DistanceState::Off),
        "close" => Ok(DistanceState::Close),
        "far" => Ok(DistanceState::Far),
        other => Err(Mv7Error::Argument(format!(
            "expected off/close/far, got `{other}`"
        ))),
    }
}

fn parse_tone(value: &str) -> Result<ToneState> {
    match value {
        "off" => Ok(ToneState::Off),
        "neutral" => Ok(ToneState::Neutral),
        "dark" => Ok(ToneState::Dark),
        "bright" => Ok(ToneState::Bright),
        other => Err(Mv7Error::Argument(format!(
            "expected off/neutral/dark/bright, got `{other}`"
        ))),
    }
}

fn parse_mode(value: &str) -> Result<Mode> {
    match value {
        "manual" => Ok(Mode::Manual),
        "auto" => Ok(Mode::Auto),
        other => Err(Mv7Error::Argument(format!(
            "expected manual/auto, got `{other}`"
        ))),
    }
}
