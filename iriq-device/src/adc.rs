//! Moisture probe on a Linux IIO ADC channel

use std::fs;
use std::path::{Path, PathBuf};

use iriq_core::{MoistureProbe, SyncError};

/// Reads `in_voltage<N>_raw` of an IIO device
#[derive(Debug, Clone)]
pub struct IioProbe {
    path: PathBuf,
}

impl IioProbe {
    /// Channel `channel` of `/sys/bus/iio/devices/iio:device<device>`
    pub fn new(device: u32, channel: u32) -> Self {
        Self::at(format!(
            "/sys/bus/iio/devices/iio:device{}/in_voltage{}_raw",
            device, channel
        ))
    }

    /// Probe reading an explicit sysfs file
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File the probe reads
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MoistureProbe for IioProbe {
    fn read_raw(&mut self) -> Result<u16, SyncError> {
        let text = fs::read_to_string(&self.path)
            .map_err(|e| SyncError::Sensor(format!("{}: {}", self.path.display(), e)))?;
        text.trim()
            .parse::<u16>()
            .map_err(|e| {
                let path = self.path.display();
                SyncError::Sensor(format!("{}: bad value {:?}: {}", path, text.trim(), e))
            })
    }
}
