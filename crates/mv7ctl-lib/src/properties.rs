//! Property table: typed values and the static descriptor table that drives
//! both the fetch loop and inbound message dispatch.
//!
//! Each descriptor links a property to the command that requests it, the
//! reply key that identifies it on the wire, and the parse function that
//! turns the raw value text into a typed value. Several descriptors share a
//! reply key: one combined block decodes into two independent properties.

use serde::Serialize;

use crate::protocol;

// ── Property identifiers ──

/// Every property the engine mirrors from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PropertyId {
    PackageVersion,
    FirmwareVersion,
    DspVersion,
    SerialNumber,
    Lock,
    MonitorMute,
    MonitorVolume,
    InputMute,
    InputVolume,
    MonitorMixPc,
    MonitorMixMic,
    Compressor,
    Limiter,
    HighPassFilter,
    PresenceFilter,
    AutoDistance,
    AutoTone,
    Mode,
}

impl PropertyId {
    pub const ALL: [PropertyId; 18] = [
        PropertyId::PackageVersion,
        PropertyId::FirmwareVersion,
        PropertyId::DspVersion,
        PropertyId::SerialNumber,
        PropertyId::Lock,
        PropertyId::MonitorMute,
        PropertyId::MonitorVolume,
        PropertyId::InputMute,
        PropertyId::InputVolume,
        PropertyId::MonitorMixPc,
        PropertyId::MonitorMixMic,
        PropertyId::Compressor,
        PropertyId::Limiter,
        PropertyId::HighPassFilter,
        PropertyId::PresenceFilter,
        PropertyId::AutoDistance,
        PropertyId::AutoTone,
        PropertyId::Mode,
    ];

    /// Stable lowercase name, used for display and CLI selection.
    pub fn name(self) -> &'static str {
        match self {
            PropertyId::PackageVersion => "package-version",
            PropertyId::FirmwareVersion => "firmware-version",
            PropertyId::DspVersion => "dsp-version",
            PropertyId::SerialNumber => "serial-number",
            PropertyId::Lock => "lock",
            PropertyId::MonitorMute => "monitor-mute",
            PropertyId::MonitorVolume => "monitor-volume",
            PropertyId::InputMute => "input-mute",
            PropertyId::InputVolume => "input-volume",
            PropertyId::MonitorMixPc => "monitor-mix-pc",
            PropertyId::MonitorMixMic => "monitor-mix-mic",
            PropertyId::Compressor => "compressor",
            PropertyId::Limiter => "limiter",
            PropertyId::HighPassFilter => "high-pass-filter",
            PropertyId::PresenceFilter => "presence-filter",
            PropertyId::AutoDistance => "auto-distance",
            PropertyId::AutoTone => "auto-tone",
            PropertyId::Mode => "mode",
        }
    }

    /// Whether the property is evicted and re-fetched on a mode switch.
    pub fn is_mode_dependent(self) -> bool {
        matches!(
            self,
            PropertyId::InputVolume
                | PropertyId::Compressor
                | PropertyId::Limiter
                | PropertyId::HighPassFilter
                | PropertyId::PresenceFilter
                | PropertyId::AutoDistance
                | PropertyId::AutoTone
        )
    }
}

impl std::fmt::Display for PropertyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Typed value enumerations ──

/// DSP preset mode. `Loading` is synthesized by the engine while a switch
/// is pending or mode-dependent state is being re-fetched; it never appears
/// on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Manual,
    Auto,
    Loading,
}

impl Mode {
    /// Wire code. `Loading` has none.
    pub fn code(self) -> Option<u32> {
        match self {
            Mode::Manual => Some(0),
            Mode::Auto => Some(1),
            Mode::Loading => None,
        }
    }

    pub fn from_code(code: u32) -> Option<Mode> {
        match code {
            0 => Some(Mode::Manual),
            1 => Some(Mode::Auto),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Manual => "manual",
            Mode::Auto => "auto",
            Mode::Loading => "loading",
        })
    }
}

/// Manual-mode compressor strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressorState {
    Off,
    Light,
    Medium,
    Heavy,
}

impl CompressorState {
    pub fn code(self) -> u32 {
        match self {
            CompressorState::Off => 0,
            CompressorState::Light => 1,
            CompressorState::Medium => 2,
            CompressorState::Heavy => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<CompressorState> {
        match code {
            0 => Some(CompressorState::Off),
            1 => Some(CompressorState::Light),
            2 => Some(CompressorState::Medium),
            3 => Some(CompressorState::Heavy),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CompressorState::Off => "off",
            CompressorState::Light => "light",
            CompressorState::Medium => "medium",
            CompressorState::Heavy => "heavy",
        })
    }
}

/// Auto-mode distance component of the combined auto-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceState {
    Off,
    Close,
    Far,
}

impl DistanceState {
    /// Contribution to the combined auto-level value.
    pub fn code(self) -> u32 {
        match self {
            DistanceState::Off => 0,
            DistanceState::Close => 1,
            DistanceState::Far => 4,
        }
    }
}

impl std::fmt::Display for DistanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DistanceState::Off => "off",
            DistanceState::Close => "close",
            DistanceState::Far => "far",
        })
    }
}

/// Auto-mode tone component of the combined auto-level block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneState {
    Off,
    Neutral,
    Dark,
    Bright,
}

impl ToneState {
    /// Contribution to the combined auto-level value.
    pub fn code(self) -> u32 {
        match self {
            ToneState::Off => 0,
            ToneState::Neutral => 0,
            ToneState::Dark => 1,
            ToneState::Bright => 2,
        }
    }

    fn from_offset(offset: u32) -> Result<ToneState, String> {
        match offset {
            0 => Ok(ToneState::Neutral),
            1 => Ok(ToneState::Dark),
            2 => Ok(ToneState::Bright),
            _ => Err(format!("tone offset {offset} out of range")),
        }
    }
}

impl std::fmt::Display for ToneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ToneState::Off => "off",
            ToneState::Neutral => "neutral",
            ToneState::Dark => "dark",
            ToneState::Bright => "bright",
        })
    }
}

// ── Combined auto-level codec ──
//
// Distance and tone are summed into a single integer on the wire. Either
// component being off collapses the whole value to 0, discarding the other
// side; this mirrors the device's own behavior and must not be "fixed".

/// Encode the combined auto-level value from its two components.
pub fn combine_auto_level(distance: DistanceState, tone: ToneState) -> u32 {
    if distance == DistanceState::Off || tone == ToneState::Off {
        0
    } else {
        distance.code() + tone.code()
    }
}

/// Recover the distance component by range comparison.
pub fn split_auto_distance(value: u32) -> DistanceState {
    if value >= DistanceState::Far.code() {
        DistanceState::Far
    } else if value >= DistanceState::Close.code() {
        DistanceState::Close
    } else {
        DistanceState::Off
    }
}

/// Recover the tone component: subtract the matched distance code.
pub fn split_auto_tone(value: u32) -> Result<ToneState, String> {
    if value >= DistanceState::Far.code() {
        ToneState::from_offset(value - DistanceState::Far.code())
    } else if value >= DistanceState::Close.code() {
        ToneState::from_offset(value - DistanceState::Close.code())
    } else {
        Ok(ToneState::Off)
    }
}

// ── Property values ──

/// A typed property value, as stored in the cache.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Switch(bool),
    /// Volume in centi-dB.
    Volume(i32),
    /// Raw monitor-mix contribution.
    Level(u32),
    Compressor(CompressorState),
    Distance(DistanceState),
    Tone(ToneState),
    Mode(Mode),
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Text(v) => f.write_str(v),
            PropertyValue::Switch(v) => f.write_str(if *v { "on" } else { "off" }),
            PropertyValue::Volume(v) => write!(f, "{} dB", protocol::encode_centi_db(*v)),
            PropertyValue::Level(v) => write!(f, "0x{v:08X}"),
            PropertyValue::Compressor(v) => write!(f, "{v}"),
            PropertyValue::Distance(v) => write!(f, "{v}"),
            PropertyValue::Tone(v) => write!(f, "{v}"),
            PropertyValue::Mode(v) => write!(f, "{v}"),
        }
    }
}

// ── Descriptor table ──

/// Declarative record linking a property to its wire fetch/recognize/parse rules.
pub struct PropertyDescriptor {
    pub id: PropertyId,
    /// Command that requests the current value.
    pub fetch_command: &'static str,
    /// Key that identifies a reply (or unsolicited update) for this property.
    pub reply_key: &'static str,
    /// Convert the raw wire value into a typed value.
    pub parse: fn(&str) -> Result<PropertyValue, String>,
}

fn parse_text(raw: &str) -> Result<PropertyValue, String> {
    Ok(PropertyValue::Text(raw.to_string()))
}

fn parse_switch(raw: &str) -> Result<PropertyValue, String> {
    Ok(PropertyValue::Switch(protocol::parse_on_off(raw)))
}

fn parse_volume(raw: &str) -> Result<PropertyValue, String> {
    protocol::parse_centi_db(raw).map(PropertyValue::Volume)
}

fn parse_mix_pc(raw: &str) -> Result<PropertyValue, String> {
    protocol::parse_mix_pc(raw).map(PropertyValue::Level)
}

fn parse_mix_mic(raw: &str) -> Result<PropertyValue, String> {
    protocol::parse_mix_mic(raw).map(PropertyValue::Level)
}

fn parse_compressor(raw: &str) -> Result<PropertyValue, String> {
    let code = protocol::parse_hex_word(raw)?;
    CompressorState::from_code(code)
        .map(PropertyValue::Compressor)
        .ok_or_else(|| format!("unknown compressor code {code}"))
}

fn parse_limiter(raw: &str) -> Result<PropertyValue, String> {
    Ok(PropertyValue::Switch(raw == "00000001"))
}

fn parse_high_pass(raw: &str) -> Result<PropertyValue, String> {
    let bits = protocol::parse_hex_word(raw)?;
    Ok(PropertyValue::Switch(bits & 1 != 0))
}

fn parse_presence(raw: &str) -> Result<PropertyValue, String> {
    let bits = protocol::parse_hex_word(raw)?;
    Ok(PropertyValue::Switch(bits & 2 != 0))
}

fn parse_distance(raw: &str) -> Result<PropertyValue, String> {
    let value = protocol::parse_hex_word(raw)?;
    Ok(PropertyValue::Distance(split_auto_distance(value)))
}

fn parse_tone(raw: &str) -> Result<PropertyValue, String> {
    let value = protocol::parse_hex_word(raw)?;
    split_auto_tone(value).map(PropertyValue::Tone)
}

fn parse_mode(raw: &str) -> Result<PropertyValue, String> {
    let code: u32 = raw
        .trim()
        .parse()
        .map_err(|_| format!("bad mode code {raw:?}"))?;
    Mode::from_code(code)
        .map(PropertyValue::Mode)
        .ok_or_else(|| format!("unknown mode code {code}"))
}

/// The single source of truth for fetch and dispatch. Mode comes first so
/// the initial fetch learns it before requesting mode-dependent properties.
pub static PROPERTIES: [PropertyDescriptor; 18] = [
    PropertyDescriptor {
        id: PropertyId::Mode,
        fetch_command: "dspMode",
        reply_key: "dspMode",
        parse: parse_mode,
    },
    PropertyDescriptor {
        id: PropertyId::PackageVersion,
        fetch_command: "pkgVersion",
        reply_key: "pkgVersion",
        parse: parse_text,
    },
    PropertyDescriptor {
        id: PropertyId::FirmwareVersion,
        fetch_command: "fwVersion",
        reply_key: "fwVersion",
        parse: parse_text,
    },
    PropertyDescriptor {
        id: PropertyId::DspVersion,
        fetch_command: "dspVersion",
        reply_key: "dspVersion",
        parse: parse_text,
    },
    PropertyDescriptor {
        id: PropertyId::SerialNumber,
        fetch_command: "serialNum",
        reply_key: "serialNum",
        parse: parse_text,
    },
    PropertyDescriptor {
        id: PropertyId::Lock,
        fetch_command: "lock",
        reply_key: "lock",
        parse: parse_switch,
    },
    PropertyDescriptor {
        id: PropertyId::MonitorMute,
        fetch_command: "audioMute",
        reply_key: "audioMute",
        parse: parse_switch,
    },
    PropertyDescriptor {
        id: PropertyId::MonitorVolume,
        fetch_command: "volume",
        reply_key: "volume",
        parse: parse_volume,
    },
    PropertyDescriptor {
        id: PropertyId::InputMute,
        fetch_command: "micMute",
        reply_key: "micMute",
        parse: parse_switch,
    },
    PropertyDescriptor {
        id: PropertyId::InputVolume,
        fetch_command: "inputGain",
        reply_key: "inputGain",
        parse: parse_volume,
    },
    PropertyDescriptor {
        id: PropertyId::MonitorMixPc,
        fetch_command: "getBlock 22",
        reply_key: protocol::BLOCK_MONITOR_MIX,
        parse: parse_mix_pc,
    },
    PropertyDescriptor {
        id: PropertyId::MonitorMixMic,
        fetch_command: "getBlock 22",
        reply_key: protocol::BLOCK_MONITOR_MIX,
        parse: parse_mix_mic,
    },
    PropertyDescriptor {
        id: PropertyId::Compressor,
        fetch_command: "getBlock 19",
        reply_key: protocol::BLOCK_COMPRESSOR,
        parse: parse_compressor,
    },
    PropertyDescriptor {
        id: PropertyId::Limiter,
        fetch_command: "getBlock 1F",
        reply_key: protocol::BLOCK_LIMITER,
        parse: parse_limiter,
    },
    PropertyDescriptor {
        id: PropertyId::HighPassFilter,
        fetch_command: "getBlock 31",
        reply_key: protocol::BLOCK_EQUALIZER,
        parse: parse_high_pass,
    },
    PropertyDescriptor {
        id: PropertyId::PresenceFilter,
        fetch_command: "getBlock 31",
        reply_key: protocol::BLOCK_EQUALIZER,
        parse: parse_presence,
    },
    PropertyDescriptor {
        id: PropertyId::AutoDistance,
        fetch_command: "getBlock 34",
        reply_key: protocol::BLOCK_AUTO_LEVEL,
        parse: parse_distance,
    },
    PropertyDescriptor {
        id: PropertyId::AutoTone,
        fetch_command: "getBlock 34",
        reply_key: protocol::BLOCK_AUTO_LEVEL,
        parse: parse_tone,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: PropertyId) -> &'static PropertyDescriptor {
        PROPERTIES.iter().find(|d| d.id == id).unwrap()
    }

    // ── table shape ──

    #[test]
    fn table_covers_every_property_once() {
        for id in PropertyId::ALL {
            assert_eq!(
                PROPERTIES.iter().filter(|d| d.id == id).count(),
                1,
                "{id} should have exactly one descriptor"
            );
        }
    }

    #[test]
    fn mode_descriptor_comes_first() {
        assert_eq!(PROPERTIES[0].id, PropertyId::Mode);
    }

    #[test]
    fn combined_blocks_share_fetch_and_reply() {
        let pc = descriptor(PropertyId::MonitorMixPc);
        let mic = descriptor(PropertyId::MonitorMixMic);
        assert_eq!(pc.fetch_command, mic.fetch_command);
        assert_eq!(pc.reply_key, mic.reply_key);

        let hp = descriptor(PropertyId::HighPassFilter);
        let presence = descriptor(PropertyId::PresenceFilter);
        assert_eq!(hp.reply_key, presence.reply_key);

        let distance = descriptor(PropertyId::AutoDistance);
        let tone = descriptor(PropertyId::AutoTone);
        assert_eq!(distance.reply_key, tone.reply_key);
    }

    #[test]
    fn mode_dependent_set_matches_eviction_list() {
        let dependent: Vec<PropertyId> = PropertyId::ALL
            .into_iter()
            .filter(|id| id.is_mode_dependent())
            .collect();
        assert_eq!(
            dependent,
            vec![
                PropertyId::InputVolume,
                PropertyId::Compressor,
                PropertyId::Limiter,
                PropertyId::HighPassFilter,
                PropertyId::PresenceFilter,
                PropertyId::AutoDistance,
                PropertyId::AutoTone,
            ]
        );
    }

    // ── parse functions ──

    #[test]
    fn parse_switch_values() {
        let parse = descriptor(PropertyId::Lock).parse;
        assert_eq!(parse("on").unwrap(), PropertyValue::Switch(true));
        assert_eq!(parse("off").unwrap(), PropertyValue::Switch(false));
        assert_eq!(parse("banana").unwrap(), PropertyValue::Switch(false));
    }

    #[test]
    fn parse_volume_value() {
        let parse = descriptor(PropertyId::MonitorVolume).parse;
        assert_eq!(parse("-12.00dB").unwrap(), PropertyValue::Volume(-1200));
        assert!(parse("quiet").is_err());
    }

    #[test]
    fn parse_mix_block_both_halves() {
        let raw = "002026F3000020C5";
        let pc = (descriptor(PropertyId::MonitorMixPc).parse)(raw).unwrap();
        let mic = (descriptor(PropertyId::MonitorMixMic).parse)(raw).unwrap();
        assert_eq!(pc, PropertyValue::Level(0x0020_26F3));
        assert_eq!(mic, PropertyValue::Level(0x20C5));
    }

    #[test]
    fn parse_compressor_codes() {
        let parse = descriptor(PropertyId::Compressor).parse;
        assert_eq!(
            parse("00000000").unwrap(),
            PropertyValue::Compressor(CompressorState::Off)
        );
        assert_eq!(
            parse("00000003").unwrap(),
            PropertyValue::Compressor(CompressorState::Heavy)
        );
        assert!(parse("00000004").is_err());
        assert!(parse("oops").is_err());
    }

    #[test]
    fn parse_limiter_exact_word() {
        let parse = descriptor(PropertyId::Limiter).parse;
        assert_eq!(parse("00000001").unwrap(), PropertyValue::Switch(true));
        assert_eq!(parse("00000000").unwrap(), PropertyValue::Switch(false));
        // Any other word reads as off, matching the device's fixed encoding.
        assert_eq!(parse("00000002").unwrap(), PropertyValue::Switch(false));
    }

    #[test]
    fn parse_equalizer_bits() {
        let high_pass = descriptor(PropertyId::HighPassFilter).parse;
        let presence = descriptor(PropertyId::PresenceFilter).parse;
        assert_eq!(high_pass("00000003").unwrap(), PropertyValue::Switch(true));
        assert_eq!(presence("00000003").unwrap(), PropertyValue::Switch(true));
        assert_eq!(high_pass("00000002").unwrap(), PropertyValue::Switch(false));
        assert_eq!(presence("00000001").unwrap(), PropertyValue::Switch(false));
    }

    #[test]
    fn parse_mode_codes() {
        let parse = descriptor(PropertyId::Mode).parse;
        assert_eq!(parse("0").unwrap(), PropertyValue::Mode(Mode::Manual));
        assert_eq!(parse("1").unwrap(), PropertyValue::Mode(Mode::Auto));
        assert!(parse("7").is_err());
        assert!(parse("auto").is_err());
    }

    // ── auto-level combined codec ──

    #[test]
    fn combine_distance_and_tone() {
        assert_eq!(combine_auto_level(DistanceState::Close, ToneState::Dark), 2);
        assert_eq!(combine_auto_level(DistanceState::Far, ToneState::Neutral), 4);
        assert_eq!(combine_auto_level(DistanceState::Far, ToneState::Bright), 6);
    }

    #[test]
    fn combine_collapses_to_zero_when_either_off() {
        assert_eq!(combine_auto_level(DistanceState::Off, ToneState::Bright), 0);
        assert_eq!(combine_auto_level(DistanceState::Far, ToneState::Off), 0);
        assert_eq!(combine_auto_level(DistanceState::Off, ToneState::Off), 0);
    }

    #[test]
    fn split_zero_is_off_off() {
        assert_eq!(split_auto_distance(0), DistanceState::Off);
        assert_eq!(split_auto_tone(0).unwrap(), ToneState::Off);
    }

    #[test]
    fn split_thresholds() {
        assert_eq!(split_auto_distance(1), DistanceState::Close);
        assert_eq!(split_auto_distance(3), DistanceState::Close);
        assert_eq!(split_auto_distance(4), DistanceState::Far);
        assert_eq!(split_auto_distance(6), DistanceState::Far);

        assert_eq!(split_auto_tone(1).unwrap(), ToneState::Neutral);
        assert_eq!(split_auto_tone(2).unwrap(), ToneState::Dark);
        assert_eq!(split_auto_tone(3).unwrap(), ToneState::Bright);
        assert_eq!(split_auto_tone(4).unwrap(), ToneState::Neutral);
        assert_eq!(split_auto_tone(5).unwrap(), ToneState::Dark);
        assert_eq!(split_auto_tone(6).unwrap(), ToneState::Bright);
    }

    #[test]
    fn split_out_of_range_tone_is_error() {
        assert!(split_auto_tone(7).is_err());
    }

    #[test]
    fn auto_level_round_trips() {
        for distance in [DistanceState::Close, DistanceState::Far] {
            for tone in [ToneState::Neutral, ToneState::Dark, ToneState::Bright] {
                let combined = combine_auto_level(distance, tone);
                assert_eq!(split_auto_distance(combined), distance);
                assert_eq!(split_auto_tone(combined).unwrap(), tone);
            }
        }
    }

    // ── display ──

    #[test]
    fn property_value_display() {
        assert_eq!(PropertyValue::Switch(true).to_string(), "on");
        assert_eq!(PropertyValue::Volume(-1200).to_string(), "-12.00 dB");
        assert_eq!(PropertyValue::Level(0x20C5).to_string(), "0x000020C5");
        assert_eq!(
            PropertyValue::Compressor(CompressorState::Medium).to_string(),
            "medium"
        );
        assert_eq!(PropertyValue::Mode(Mode::Loading).to_string(), "loading");
    }
}
