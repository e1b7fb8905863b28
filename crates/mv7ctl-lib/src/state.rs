//! Local state cache: one typed optional field per device property.
//!
//! `None` means "not yet fetched". The engine owns the only mutable copy;
//! the foreground reads snapshots through synchronized accessors.

use serde::Serialize;

use crate::properties::{
    CompressorState, DistanceState, Mode, PropertyId, PropertyValue, ToneState,
};

/// The mirrored device state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MicState {
    pub package_version: Option<String>,
    pub firmware_version: Option<String>,
    pub dsp_version: Option<String>,
    pub serial_number: Option<String>,
    pub lock: Option<bool>,
    pub monitor_mute: Option<bool>,
    /// Centi-dB, -2400..=0.
    pub monitor_volume: Option<i32>,
    pub input_mute: Option<bool>,
    /// Centi-dB, 0..=3600.
    pub input_volume: Option<i32>,
    pub monitor_mix_pc: Option<u32>,
    pub monitor_mix_mic: Option<u32>,
    pub compressor: Option<CompressorState>,
    pub limiter: Option<bool>,
    pub high_pass_filter: Option<bool>,
    pub presence_filter: Option<bool>,
    pub auto_distance: Option<DistanceState>,
    pub auto_tone: Option<ToneState>,
    pub mode: Option<Mode>,
}

fn store<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        false
    } else {
        *slot = Some(value);
        true
    }
}

impl MicState {
    /// Current value for a property, if fetched.
    pub fn get(&self, id: PropertyId) -> Option<PropertyValue> {
        match id {
            PropertyId::PackageVersion => self.package_version.clone().map(PropertyValue::Text),
            PropertyId::FirmwareVersion => self.firmware_version.clone().map(PropertyValue::Text),
            PropertyId::DspVersion => self.dsp_version.clone().map(PropertyValue::Text),
            PropertyId::SerialNumber => self.serial_number.clone().map(PropertyValue::Text),
            PropertyId::Lock => self.lock.map(PropertyValue::Switch),
            PropertyId::MonitorMute => self.monitor_mute.map(PropertyValue::Switch),
            PropertyId::MonitorVolume => self.monitor_volume.map(PropertyValue::Volume),
            PropertyId::InputMute => self.input_mute.map(PropertyValue::Switch),
            PropertyId::InputVolume => self.input_volume.map(PropertyValue::Volume),
            PropertyId::MonitorMixPc => self.monitor_mix_pc.map(PropertyValue::Level),
            PropertyId::MonitorMixMic => self.monitor_mix_mic.map(PropertyValue::Level),
            PropertyId::Compressor => self.compressor.map(PropertyValue::Compressor),
            PropertyId::Limiter => self.limiter.map(PropertyValue::Switch),
            PropertyId::HighPassFilter => self.high_pass_filter.map(PropertyValue::Switch),
            PropertyId::PresenceFilter => self.presence_filter.map(PropertyValue::Switch),
            PropertyId::AutoDistance => self.auto_distance.map(PropertyValue::Distance),
            PropertyId::AutoTone => self.auto_tone.map(PropertyValue::Tone),
            PropertyId::Mode => self.mode.map(PropertyValue::Mode),
        }
    }

    /// Store a parsed value. Returns whether the cached value changed
    /// (including the transition from absent to present).
    pub fn apply(&mut self, id: PropertyId, value: PropertyValue) -> bool {
        match (id, value) {
            (PropertyId::PackageVersion, PropertyValue::Text(v)) => {
                store(&mut self.package_version, v)
            }
            (PropertyId::FirmwareVersion, PropertyValue::Text(v)) => {
                store(&mut self.firmware_version, v)
            }
            (PropertyId::DspVersion, PropertyValue::Text(v)) => store(&mut self.dsp_version, v),
            (PropertyId::SerialNumber, PropertyValue::Text(v)) => {
                store(&mut self.serial_number, v)
            }
            (PropertyId::Lock, PropertyValue::Switch(v)) => store(&mut self.lock, v),
            (PropertyId::MonitorMute, PropertyValue::Switch(v)) => {
                store(&mut self.monitor_mute, v)
            }
            (PropertyId::MonitorVolume, PropertyValue::Volume(v)) => {
                store(&mut self.monitor_volume, v)
            }
            (PropertyId::InputMute, PropertyValue::Switch(v)) => store(&mut self.input_mute, v),
            (PropertyId::InputVolume, PropertyValue::Volume(v)) => {
                store(&mut self.input_volume, v)
            }
            (PropertyId::MonitorMixPc, PropertyValue::Level(v)) => {
                store(&mut self.monitor_mix_pc, v)
            }
            (PropertyId::MonitorMixMic, PropertyValue::Level(v)) => {
                store(&mut self.monitor_mix_mic, v)
            }
            (PropertyId::Compressor, PropertyValue::Compressor(v)) => {
                store(&mut self.compressor, v)
            }
            (PropertyId::Limiter, PropertyValue::Switch(v)) => store(&mut self.limiter, v),
            (PropertyId::HighPassFilter, PropertyValue::Switch(v)) => {
                store(&mut self.high_pass_filter, v)
            }
            (PropertyId::PresenceFilter, PropertyValue::Switch(v)) => {
                store(&mut self.presence_filter, v)
            }
            (PropertyId::AutoDistance, PropertyValue::Distance(v)) => {
                store(&mut self.auto_distance, v)
            }
            (PropertyId::AutoTone, PropertyValue::Tone(v)) => store(&mut self.auto_tone, v),
            (PropertyId::Mode, PropertyValue::Mode(v)) => store(&mut self.mode, v),
            (id, value) => {
                log::debug!("type mismatch storing {value:?} into {id}");
                false
            }
        }
    }

    /// Evict a property, forcing a re-fetch.
    pub fn clear(&mut self, id: PropertyId) {
        match id {
            PropertyId::PackageVersion => self.package_version = None,
            PropertyId::FirmwareVersion => self.firmware_version = None,
            PropertyId::DspVersion => self.dsp_version = None,
            PropertyId::SerialNumber => self.serial_number = None,
            PropertyId::Lock => self.lock = None,
            PropertyId::MonitorMute => self.monitor_mute = None,
            PropertyId::MonitorVolume => self.monitor_volume = None,
            PropertyId::InputMute => self.input_mute = None,
            PropertyId::InputVolume => self.input_volume = None,
            PropertyId::MonitorMixPc => self.monitor_mix_pc = None,
            PropertyId::MonitorMixMic => self.monitor_mix_mic = None,
            PropertyId::Compressor => self.compressor = None,
            PropertyId::Limiter => self.limiter = None,
            PropertyId::HighPassFilter => self.high_pass_filter = None,
            PropertyId::PresenceFilter => self.presence_filter = None,
            PropertyId::AutoDistance => self.auto_distance = None,
            PropertyId::AutoTone => self.auto_tone = None,
            PropertyId::Mode => self.mode = None,
        }
    }

    /// Whether every property has been fetched at least once.
    pub fn is_complete(&self) -> bool {
        PropertyId::ALL.into_iter().all(|id| self.get(id).is_some())
    }
}
