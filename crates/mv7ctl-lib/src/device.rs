//! Device discovery and errors.
//!
//! The MV7 exposes several HID interfaces; only the data interface carries
//! the text command channel, so enumeration filters on vendor id, product
//! id, and interface number.

use std::ffi::CString;
use std::fmt;

use serde::Serialize;

use crate::protocol::{MV7_DATA_INTERFACE, MV7_PID, SHURE_VID};
use crate::transport::TextHid;

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* identifies the operation (e.g. `"HID enumeration"`) and
/// *details* describes what went wrong.
#[derive(Debug)]
pub enum DeviceError {
    NotFound,
    OpenFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    Unresponsive,
    InvalidPath(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotFound => write!(f, "MV7 device not found"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::WriteFailed(e) => write!(f, "Device write failed: {e}"),
            DeviceError::ReadFailed(e) => write!(f, "Device read failed: {e}"),
            DeviceError::Unresponsive => {
                write!(f, "Device did not complete the startup handshake")
            }
            DeviceError::InvalidPath(path) => write!(f, "Invalid device path: {path}"),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Enumeration ──

/// A discovered MV7 data interface (not yet opened).
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    /// Platform HID path, usable with [`open_path`].
    pub path: String,
    /// USB serial number, if the platform exposes one.
    pub serial: Option<String>,
}

/// Enumerate all MV7 data interfaces.
///
/// Returns an empty list when no microphone is plugged in; that is not an
/// error, callers are expected to offer a retry path.
pub fn enumerate() -> Result<Vec<DiscoveredDevice>> {
    let api = hid_api()?;
    Ok(api
        .device_list()
        .filter(|info| {
            info.vendor_id() == SHURE_VID
                && info.product_id() == MV7_PID
                && info.interface_number() == MV7_DATA_INTERFACE
        })
        .map(|info| DiscoveredDevice {
            path: info.path().to_string_lossy().into_owned(),
            serial: info.serial_number().map(str::to_string),
        })
        .collect())
}

/// Open the data interface at a specific HID path.
pub fn open_path(path: &str) -> Result<TextHid> {
    let api = hid_api()?;
    let cpath =
        CString::new(path).map_err(|_| DeviceError::InvalidPath(path.to_string()))?;
    let device = api
        .open_path(&cpath)
        .map_err(|e| DeviceError::OpenFailed(format!("{path}: {e}")))?;
    Ok(TextHid::new(device))
}

/// Open the first enumerated MV7 data interface.
pub fn open_first() -> Result<TextHid> {
    let devices = enumerate()?;
    match devices.first() {
        Some(device) => open_path(&device.path),
        None => Err(DeviceError::NotFound),
    }
}

fn hid_api() -> Result<hidapi::HidApi> {
    hidapi::HidApi::new().map_err(|e| DeviceError::OpenFailed(format!("HID enumeration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_device_serializes() {
        let device = DiscoveredDevice {
            path: "/dev/hidraw3".into(),
            serial: Some("MV7-00031337".into()),
        };
        let json = serde_json::to_string(&device).unwrap();
        assert!(json.contains("\"path\""));
        assert!(json.contains("MV7-00031337"));
    }

    #[test]
    fn discovered_device_serializes_missing_serial_as_null() {
        let device = DiscoveredDevice {
            path: "/dev/hidraw3".into(),
            serial: None,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&device).unwrap()).unwrap();
        assert!(json["serial"].is_null());
    }

    #[test]
    fn open_path_rejects_embedded_nul() {
        let err = open_path("bad\0path").unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InvalidPath(_) | DeviceError::OpenFailed(_)
        ));
    }

    #[test]
    fn display_not_found() {
        assert_eq!(DeviceError::NotFound.to_string(), "MV7 device not found");
    }

    #[test]
    fn display_unresponsive_is_distinct_from_not_found() {
        let unresponsive = DeviceError::Unresponsive.to_string();
        let not_found = DeviceError::NotFound.to_string();
        assert_ne!(unresponsive, not_found);
        assert!(unresponsive.contains("handshake"));
    }

    #[test]
    fn display_wraps_context() {
        let e = DeviceError::OpenFailed("HID enumeration: denied".into());
        assert_eq!(e.to_string(), "Failed to open device: HID enumeration: denied");
    }
}
