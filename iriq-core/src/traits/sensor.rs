//! Raw moisture probe access

use crate::errors::SyncError;

/// Analog soil moisture probe
///
/// Returns the raw ADC count. Higher counts mean drier soil on the
/// capacitive probes this firmware is calibrated for.
pub trait MoistureProbe {
    /// Take one raw reading
    fn read_raw(&mut self) -> Result<u16, SyncError>;
}

impl<P: MoistureProbe + ?Sized> MoistureProbe for &mut P {
    fn read_raw(&mut self) -> Result<u16, SyncError> {
        (**self).read_raw()
    }
}
