//! I2C bus access by index.
//!
//! Which bus a BME680 hangs off depends on the board revision, so discovery
//! asks for buses by number and treats a missing `/dev/i2c-N` node as "not on
//! this host" rather than an error.

use std::path::PathBuf;

use embedded_hal::i2c::I2c;
use thiserror::Error;

/// Errors raised while opening a bus.
#[derive(Debug, Error)]
pub enum BusError {
    /// No bus with this index exists on the host.
    #[error("I2C bus {index} not found")]
    NotFound { index: u8 },

    /// The bus exists but could not be opened (permissions, driver error).
    #[error("Failed to open I2C bus {index}: {reason}")]
    Open { index: u8, reason: String },
}

impl BusError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BusError::NotFound { .. })
    }
}

/// Parses a 7-bit device address written in hex, with or without `0x`.
pub fn parse_i2c_address(raw: &str) -> Option<u8> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    u8::from_str_radix(digits, 16)
        .ok()
        .filter(|address| *address <= 0x7F)
}

/// Opens I2C buses by index. Every call returns a new, exclusively owned
/// handle.
pub trait I2cBusProvider {
    type Bus: I2c + Send + 'static;

    fn open(&self, index: u8) -> Result<Self::Bus, BusError>;
}

/// Character devices under `/dev`, one per adapter.
#[derive(Debug, Clone)]
pub struct LinuxI2cBuses {
    dev_root: PathBuf,
}

impl LinuxI2cBuses {
    pub fn new(dev_root: impl Into<PathBuf>) -> Self {
        Self {
            dev_root: dev_root.into(),
        }
    }

    pub fn path_for(&self, index: u8) -> PathBuf {
        self.dev_root.join(format!("i2c-{}", index))
    }
}

impl Default for LinuxI2cBuses {
    fn default() -> Self {
        Self::new("/dev")
    }
}

#[cfg(target_os = "linux")]
impl I2cBusProvider for LinuxI2cBuses {
    type Bus = linux_embedded_hal::I2cdev;

    fn open(&self, index: u8) -> Result<Self::Bus, BusError> {
        let path = self.path_for(index);
        if !path.exists() {
            return Err(BusError::NotFound { index });
        }

        linux_embedded_hal::I2cdev::new(&path).map_err(|e| BusError::Open {
            index,
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// FALLBACK IMPLEMENTATIONS FOR UNSUPPORTED PLATFORMS
// ============================================================================

/// Placeholder bus for platforms without i2c-dev. Never handed out.
#[cfg(not(target_os = "linux"))]
pub struct UnavailableBus;

#[cfg(not(target_os = "linux"))]
impl embedded_hal::i2c::ErrorType for UnavailableBus {
    type Error = embedded_hal::i2c::ErrorKind;
}

#[cfg(not(target_os = "linux"))]
impl I2c for UnavailableBus {
    fn transaction(
        &mut self,
        _address: u8,
        _operations: &mut [embedded_hal::i2c::Operation<'_>],
    ) -> Result<(), Self::Error> {
        Err(embedded_hal::i2c::ErrorKind::Other)
    }
}

/// Without i2c-dev every bus index is reported as missing.
#[cfg(not(target_os = "linux"))]
impl I2cBusProvider for LinuxI2cBuses {
    type Bus = UnavailableBus;

    fn open(&self, index: u8) -> Result<Self::Bus, BusError> {
        Err(BusError::NotFound { index })
    }
}
