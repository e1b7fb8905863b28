//! Unified error type for the mv7ctl-lib crate.
//!
//! [`Mv7Error`] wraps the transport-level `DeviceError` and the ambient
//! error kinds (`Io`, `Config`, `Argument`). `From` impls allow `?` to
//! propagate across module boundaries seamlessly.

use std::fmt;

use crate::device::DeviceError;

/// Unified error type for mv7ctl-lib operations.
#[derive(Debug)]
pub enum Mv7Error {
    /// Device communication error (enumerate, open, read, write, handshake).
    Device(DeviceError),
    /// Standard I/O error (config file read/write).
    Io(std::io::Error),
    /// Configuration parse or validation error.
    Config(String),
    /// Caller-supplied value could not be interpreted (CLI property names
    /// and values).
    Argument(String),
}

impl fmt::Display for Mv7Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mv7Error::Device(e) => write!(f, "{e}"),
            Mv7Error::Io(e) => write!(f, "I/O error: {e}"),
            Mv7Error::Config(e) => write!(f, "Config error: {e}"),
            Mv7Error::Argument(e) => write!(f, "Invalid argument: {e}"),
        }
    }
}

impl std::error::Error for Mv7Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Mv7Error::Device(e) => Some(e),
            Mv7Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for Mv7Error {
    fn from(e: DeviceError) -> Self {
        Mv7Error::Device(e)
    }
}

impl From<std::io::Error> for Mv7Error {
    fn from(e: std::io::Error) -> Self {
        Mv7Error::Io(e)
    }
}

/// Crate-level Result alias using [`Mv7Error`].
pub type Result<T> = std::result::Result<T, Mv7Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_device_error() {
        let e: Mv7Error = DeviceError::NotFound.into();
        assert!(matches!(e, Mv7Error::Device(DeviceError::NotFound)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: Mv7Error = io_err.into();
        assert!(matches!(e, Mv7Error::Io(_)));
    }

    #[test]
    fn display_device_error() {
        let e = Mv7Error::Device(DeviceError::NotFound);
        assert_eq!(e.to_string(), "MV7 device not found");
    }

    #[test]
    fn display_config_error() {
        let e = Mv7Error::Config("bad toml".into());
        assert_eq!(e.to_string(), "Config error: bad toml");
    }

    #[test]
    fn display_argument_error() {
        let e = Mv7Error::Argument("no such property".into());
        assert_eq!(e.to_string(), "Invalid argument: no such property");
    }

    #[test]
    fn source_chains_device_error() {
        let e = Mv7Error::Device(DeviceError::ReadFailed("timeout".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = Mv7Error::Config("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }

    #[test]
    fn question_mark_propagation_device_to_mv7() {
        fn inner() -> crate::device::Result<()> {
            Err(DeviceError::Unresponsive)
        }
        fn outer() -> Result<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, Mv7Error::Device(DeviceError::Unresponsive)));
    }
}
