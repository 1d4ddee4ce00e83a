use crate::host::Dtc;

/// Errors produced by the spatial PAL interface and its backends.
///
/// Every variant maps onto one [`Dtc`] so hook results can be reported to the
/// host without losing the failure class.
#[derive(Debug, thiserror::Error)]
pub enum PalError {
    /// Invalid arguments or calls out of order. Always a programming error.
    #[error("usage error: {0}")]
    Usage(String),

    /// Malformed interface configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No data yet, or the device is not reachable right now.
    #[error("unavailable: {0}")]
    Unavailable(&'static str),

    /// Hardware I/O failure on an opened device.
    #[error("I/O error: {0}")]
    Io(String),

    /// Resource allocation failed.
    #[error("allocation failure: {0}")]
    Mem(String),

    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    #[error("invalid sub-configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid interface options: {0}")]
    Options(#[from] clap::Error),
}

impl PalError {
    /// The diagnostic code reported to the host for this error.
    pub fn dtc(&self) -> Dtc {
        match self {
            PalError::Usage(_) | PalError::Options(_) => Dtc::Usage,
            PalError::Config(_) | PalError::Toml(_) => Dtc::Config,
            PalError::Unavailable(_) => Dtc::NoData,
            PalError::Io(_) | PalError::Hid(_) => Dtc::Io,
            PalError::Mem(_) => Dtc::Mem,
        }
    }

    /// True for the expected "nothing this tick" class of errors.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, PalError::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtc_mapping() {
        assert_eq!(PalError::Usage("x".into()).dtc(), Dtc::Usage);
        assert_eq!(PalError::Config("x".into()).dtc(), Dtc::Config);
        assert_eq!(PalError::Unavailable("x").dtc(), Dtc::NoData);
        assert_eq!(PalError::Io("x".into()).dtc(), Dtc::Io);
        assert_eq!(PalError::Mem("x".into()).dtc(), Dtc::Mem);
    }

    #[test]
    fn test_toml_error_is_config() {
        let err: PalError = toml::from_str::<toml::Table>("= nope").unwrap_err().into();
        assert_eq!(err.dtc(), Dtc::Config);
        assert!(!err.is_unavailable());
    }
}
