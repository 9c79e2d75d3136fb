//! Linux sysfs GPIO behind the embedded-hal pin traits
//!
//! The core actuator is written against `embedded-hal` 1.0, so on a Linux
//! board each line is exported through sysfs and wrapped in [`SysfsPin`].
//! Lines are unexported again when the pin is dropped.

use std::fmt;
use std::thread;
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin, StatefulOutputPin};

/// sysfs failure on one line
#[derive(Debug)]
pub struct GpioError {
    line: u64,
    source: sysfs_gpio::Error,
}

impl fmt::Display for GpioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gpio {}: {}", self.line, self.source)
    }
}

impl std::error::Error for GpioError {}

impl digital::Error for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Exported output line
pub struct SysfsPin {
    pin: sysfs_gpio::Pin,
}

impl SysfsPin {
    /// Export `line` as an output, starting at `initial_high`
    pub fn output(line: u64, initial_high: bool) -> Result<Self, GpioError> {
        let pin = sysfs_gpio::Pin::new(line);
        let wrap = |source| GpioError { line, source };
        pin.export().map_err(wrap)?;
        let direction = if initial_high {
            sysfs_gpio::Direction::High
        } else {
            sysfs_gpio::Direction::Low
        };
        pin.set_direction(direction).map_err(wrap)?;
        let level = if initial_high { "high" } else { "low" };
        log::debug!("gpio {} exported, initial level {}", line, level);
        Ok(Self { pin })
    }

    fn error(&self, source: sysfs_gpio::Error) -> GpioError {
        GpioError { line: self.pin.get_pin(), source }
    }
}

impl Drop for SysfsPin {
    fn drop(&mut self) {
        if let Err(e) = self.pin.unexport() {
            log::error!("Could not unexport pin {}: {}", self.pin.get_pin(), e);
        }
    }
}

impl ErrorType for SysfsPin {
    type Error = GpioError;
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> Result<(), GpioError> {
        self.pin.set_value(0).map_err(|e| self.error(e))
    }

    fn set_high(&mut self) -> Result<(), GpioError> {
        self.pin.set_value(1).map_err(|e| self.error(e))
    }
}

impl StatefulOutputPin for SysfsPin {
    /// Reads the line's value file, so a relay board that drags the line
    /// shows up as a mismatch
    fn is_set_high(&mut self) -> Result<bool, GpioError> {
        self.pin.get_value().map(|v| v != 0).map_err(|e| self.error(e))
    }

    fn is_set_low(&mut self) -> Result<bool, GpioError> {
        self.is_set_high().map(|high| !high)
    }
}

/// Blocking delay on the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadDelay;

impl DelayNs for ThreadDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}
