//! 1-Wire thermometer access through the kernel's `w1` sysfs interface.
//!
//! With the `w1-gpio` and `w1-therm` modules loaded, every probe on the bus
//! shows up as a directory under `/sys/bus/w1/devices` named
//! `<family>-<serial>`:
//!
//! ```text
//! /sys/bus/w1/devices/
//!   28-0000075a1b2c/
//!     w1_slave      <- "72 01 4b 46 7f ff 0e 10 57 : crc=57 YES"
//!                      "72 01 4b 46 7f ff 0e 10 57 t=23125"
//!   w1_bus_master1/
//! ```
//!
//! The first line reports the CRC check of the scratchpad, the second the
//! temperature in millidegrees Celsius.

use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, trace};

/// Default sysfs location of 1-Wire devices.
pub const W1_DEVICES_PATH: &str = "/sys/bus/w1/devices";

/// Family codes of the supported thermometers (DS18S20, DS1822, DS18B20,
/// DS1825/MAX31850K, DS28EA00).
const THERMOMETER_FAMILIES: [&str; 5] = ["10", "22", "28", "3b", "42"];

/// Value a DS18x20 reports after power-on before its first conversion.
const POWER_ON_RESET_MILLIDEGREES: i64 = 85_000;

/// Errors raised while enumerating or reading probes.
#[derive(Debug, Error)]
pub enum W1Error {
    /// The probe disappeared from the bus.
    #[error("1-Wire probe {id} not found")]
    ProbeNotFound { id: String },

    /// The scratchpad CRC check failed; the conversion is not trustworthy.
    #[error("1-Wire probe {id} is not ready (CRC check failed)")]
    NotReady { id: String },

    /// The probe still holds its power-on value.
    #[error("1-Wire probe {id} reported the power-on reset value")]
    ResetValue { id: String },

    /// `w1_slave` did not have the expected two-line layout.
    #[error("Malformed reading from 1-Wire probe {id}: {reason}")]
    Malformed { id: String, reason: String },

    /// Any other filesystem failure.
    #[error("Failed to read {path}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// A 1-Wire bus exposed through sysfs.
#[derive(Debug, Clone)]
pub struct W1Bus {
    root: PathBuf,
}

impl W1Bus {
    /// Checks whether 1-Wire support is available under `root`.
    ///
    /// Returns `None` when the devices directory does not exist, which is the
    /// normal state of a host without the kernel modules loaded.
    pub fn detect(root: impl Into<PathBuf>) -> Option<Self> {
        let root = root.into();
        if root.is_dir() {
            debug!("1-Wire support detected at {}", root.display());
            Some(Self { root })
        } else {
            debug!("No 1-Wire support at {}", root.display());
            None
        }
    }

    /// Checks the default sysfs location.
    pub fn detect_default() -> Option<Self> {
        Self::detect(W1_DEVICES_PATH)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the thermometers currently visible on the bus, sorted by id.
    pub async fn probes(&self) -> Result<Vec<Probe>, W1Error> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|source| self.io_error(source))?;

        let mut listing = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => listing.push(Ok((entry.file_name(), entry.path()))),
                Ok(None) => break,
                Err(e) => {
                    listing.push(Err(e));
                    break;
                }
            }
        }

        self.thermometers(listing)
    }

    /// Picks the thermometers out of a directory listing. A failed entry
    /// fails the whole listing.
    fn thermometers(
        &self,
        listing: impl IntoIterator<Item = io::Result<(OsString, PathBuf)>>,
    ) -> Result<Vec<Probe>, W1Error> {
        let mut probes = Vec::new();
        for entry in listing {
            let (name, path) = entry.map_err(|source| self.io_error(source))?;
            let Ok(id) = name.into_string() else {
                continue;
            };
            if is_thermometer(&id) {
                trace!("Found 1-Wire thermometer {}", id);
                probes.push(Probe {
                    path: path.join("w1_slave"),
                    id,
                });
            }
        }

        probes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(probes)
    }

    fn io_error(&self, source: io::Error) -> W1Error {
        W1Error::Io {
            path: self.root.display().to_string(),
            source,
        }
    }
}

fn is_thermometer(name: &str) -> bool {
    name.split_once('-').is_some_and(|(family, serial)| {
        !serial.is_empty() && THERMOMETER_FAMILIES.contains(&family.to_ascii_lowercase().as_str())
    })
}

/// One thermometer on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    id: String,
    path: PathBuf,
}

impl Probe {
    /// Hardware id, the sysfs directory name (e.g. `28-0000075a1b2c`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reads the current temperature in degrees Celsius.
    pub async fn read_celsius(&self) -> Result<f64, W1Error> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(W1Error::ProbeNotFound {
                    id: self.id.clone(),
                })
            }
            Err(source) => {
                return Err(W1Error::Io {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        let millidegrees = parse_w1_slave(&self.id, &content)?;
        Ok(millidegrees as f64 / 1000.0)
    }
}

/// Extracts the temperature in millidegrees from a `w1_slave` dump.
pub fn parse_w1_slave(id: &str, content: &str) -> Result<i64, W1Error> {
    let mut lines = content.lines();

    let crc_line = lines.next().ok_or_else(|| W1Error::Malformed {
        id: id.to_string(),
        reason: "empty output".into(),
    })?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(W1Error::NotReady { id: id.to_string() });
    }

    let data_line = lines.next().ok_or_else(|| W1Error::Malformed {
        id: id.to_string(),
        reason: "missing temperature line".into(),
    })?;
    let raw = data_line
        .rsplit_once("t=")
        .map(|(_, value)| value.trim())
        .ok_or_else(|| W1Error::Malformed {
            id: id.to_string(),
            reason: "no t= field".into(),
        })?;
    let millidegrees = raw.parse::<i64>().map_err(|e| W1Error::Malformed {
        id: id.to_string(),
        reason: format!("invalid temperature '{}': {}", raw, e),
    })?;

    if millidegrees == POWER_ON_RESET_MILLIDEGREES {
        return Err(W1Error::ResetValue { id: id.to_string() });
    }

    Ok(millidegrees)
}
