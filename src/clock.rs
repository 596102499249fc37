//! Abstraction of the local clock that the servo steers

use serde::Serialize;

use crate::datastructures::common::{TimeInterval, Timestamp};

/// Selects one of the clocks reachable through a [`ClockControl`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClockDomain(pub u32);

/// Conversion from the servo's adjustment unit, ppb scaled by 2^16, to parts
/// per trillion
pub fn scaled_ppb_to_ppt(scaled_ppb: i64) -> i64 {
    ((scaled_ppb as i128 * 1000) >> 16) as i64
}

/// The operations the servo needs from a local clock.
///
/// All methods take `&self`; implementations are expected to use interior
/// mutability or talk to hardware.
pub trait ClockControl {
    type Error: std::error::Error;

    /// Run the clock at a rate offset of `ppt` parts per trillion. Zero
    /// returns it to its nominal rate.
    fn set_frequency_ratio(&self, ppt: i64, domain: ClockDomain) -> Result<(), Self::Error>;

    /// Set the time of day
    fn set_time(&self, time: Timestamp, domain: ClockDomain) -> Result<(), Self::Error>;

    /// Move the time of day by `delta`, backwards when `negative` is set
    fn set_time_delta(
        &self,
        delta: Timestamp,
        domain: ClockDomain,
        negative: bool,
    ) -> Result<(), Self::Error>;

    /// Remove `offset` from the time of day without stepping, i.e. a
    /// positive offset makes the clock fall back by that amount
    fn adjust_phase(&self, offset: TimeInterval, domain: ClockDomain) -> Result<(), Self::Error>;

    /// The current time and the tick counter it was sampled at
    fn get_time(&self, domain: ClockDomain) -> Result<(Timestamp, u64), Self::Error>;
}
