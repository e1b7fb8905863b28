//! Wire protocol: identification constants, message shapes, value codecs.
//!
//! The microphone speaks a line-oriented text protocol carried in fixed
//! 64-byte HID reports. Replies come in two shapes: `key=value` for named
//! settings and `block <id> <value>` for packed configuration blocks.
//! Everything else on the wire (operational acks, boot chatter) is ignored
//! by the dispatcher.

// ── Device identification ──

/// Shure USB vendor id.
pub const SHURE_VID: u16 = 0x14ED;
/// MV7 USB product id.
pub const MV7_PID: u16 = 0x1012;
/// HID interface carrying the text command channel.
pub const MV7_DATA_INTERFACE: i32 = 3;

// ── Framing ──

/// Every HID report, inbound or outbound, is exactly this many bytes.
pub const REPORT_SIZE: usize = 64;
/// Longest command that fits a report with its NUL terminator.
pub const MAX_COMMAND_LEN: usize = REPORT_SIZE - 1;

// ── Commands and acknowledgements ──

/// Privilege elevation; some commands are unusable without it.
pub const CMD_ELEVATE: &str = "su adm";
pub const ACK_ELEVATE: &str = "su=adm";
/// DSP boot request, acknowledged once the DSP is up.
pub const CMD_BOOT_DSP: &str = "bootDSP C";
pub const ACK_BOOT_DSP: &str = "dspBooted";
/// Flash the device LEDs. Fire-and-forget, no reply required.
pub const CMD_IDENTIFY: &str = "identify";

// ── Block ids ──

pub const BLOCK_COMPRESSOR: &str = "19";
pub const BLOCK_LIMITER: &str = "1F";
pub const BLOCK_MONITOR_MIX: &str = "22";
pub const BLOCK_EQUALIZER: &str = "31";
pub const BLOCK_AUTO_LEVEL: &str = "34";

/// Marker the device embeds in block replies it could not serve.
pub const ERROR_MARKER: &str = "Not valid";

// ── Value ranges (centi-dB and raw block units) ──

pub const MONITOR_VOLUME_MIN: i32 = -2400;
pub const MONITOR_VOLUME_MAX: i32 = 0;
pub const INPUT_VOLUME_MIN: i32 = 0;
pub const INPUT_VOLUME_MAX: i32 = 3600;
pub const MONITOR_MIX_MIC_MIN: u32 = 0x20C5;
pub const MONITOR_MIX_MIC_MAX: u32 = 0x0040_26E7;
pub const MONITOR_MIX_PC_MIN: u32 = 0x20C5;
pub const MONITOR_MIX_PC_MAX: u32 = 0x0020_26F3;

// ── Message parsing ──

/// A recognized inbound message, split into reply key and raw value text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMessage<'a> {
    pub key: &'a str,
    pub value: &'a str,
}

/// Split an inbound message into its reply key and value.
///
/// Recognizes `key=value` and `block <id> <value>` shapes. Block replies
/// carrying the device's error marker are rejected, as is anything else;
/// the protocol is chatty and unrecognized messages are not an error.
pub fn parse_message(message: &str) -> Option<ParsedMessage<'_>> {
    let trimmed = message.trim();
    if let Some((key, value)) = trimmed.split_once('=') {
        return Some(ParsedMessage { key, value });
    }
    if let Some(rest) = trimmed.strip_prefix("block ") {
        if trimmed.contains(ERROR_MARKER) {
            return None;
        }
        if let Some((key, value)) = rest.trim().split_once(' ') {
            return Some(ParsedMessage { key, value });
        }
    }
    None
}

// ── Value codecs ──

/// Decode an `on`/`off` switch value. Anything other than `on` reads as off.
pub fn parse_on_off(raw: &str) -> bool {
    raw == "on"
}

/// Decode a decibel value such as `-12.00dB` into centi-dB.
pub fn parse_centi_db(raw: &str) -> Result<i32, String> {
    let number = raw.strip_suffix("dB").unwrap_or(raw);
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("bad decibel value {raw:?}"))?;
    Ok((value * 100.0).round() as i32)
}

/// Encode centi-dB as the wire decimal with exactly two fractional digits.
pub fn encode_centi_db(centi_db: i32) -> String {
    format!("{:.2}", f64::from(centi_db) / 100.0)
}

/// Decode a zero-padded hexadecimal word.
pub fn parse_hex_word(raw: &str) -> Result<u32, String> {
    u32::from_str_radix(raw.trim(), 16).map_err(|_| format!("bad hex word {raw:?}"))
}

/// High word of the combined monitor-mix block (pc contribution).
pub fn parse_mix_pc(raw: &str) -> Result<u32, String> {
    let end = raw.len().min(8);
    match raw.get(..end) {
        Some(high) => parse_hex_word(high),
        None => Err(format!("bad monitor-mix block {raw:?}")),
    }
}

/// Low word of the combined monitor-mix block (mic contribution).
pub fn parse_mix_mic(raw: &str) -> Result<u32, String> {
    match raw.get(8..) {
        Some(low) if !low.is_empty() => parse_hex_word(low),
        _ => Err(format!("monitor-mix block too short: {raw:?}")),
    }
}

/// Pack the equalizer flags into the wire byte (high-pass bit 0, presence bit 1).
pub fn encode_equalizer(high_pass: bool, presence: bool) -> u32 {
    u32::from(high_pass) | (u32::from(presence) << 1)
}

// ── Command builders ──

/// `<name> on` / `<name> off` toggle command.
pub fn toggle_command(name: &str, on: bool) -> String {
    format!("{name} {}", if on { "on" } else { "off" })
}

/// `setBlock <id> <value>` with the value zero-padded to eight decimal digits.
pub fn set_block_decimal(block: &str, value: u32) -> String {
    format!("setBlock {block} {value:08}")
}

/// `setBlock 22 <pc><mic>`, each half zero-padded to eight hex digits.
pub fn set_block_mix(pc: u32, mic: u32) -> String {
    format!("setBlock {BLOCK_MONITOR_MIX} {pc:08X}{mic:08X}")
}
