use core::ops::Sub;

use super::TimeInterval;
use crate::datastructures::{array, array_mut, WireFormat, WireFormatError};

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const MAX_SECONDS: u64 = (1 << 48) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub struct Timestamp {
    /// The seconds field of the timestamp.
    /// 48-bit, must be less than 281474976710656
    pub seconds: u64,
    /// The nanoseconds field of the timestamp.
    /// Must be less than 10^9
    pub nanos: u32,
    /// Sub-nanosecond part in units of 2^-16 ns. Not carried on the wire.
    pub nanos_frac: u16,
}

impl Timestamp {
    pub const fn new(seconds: u64, nanos: u32) -> Self {
        Self {
            seconds,
            nanos,
            nanos_frac: 0,
        }
    }

    /// Whether the fields are within their wire ranges
    pub fn is_valid(&self) -> bool {
        self.seconds <= MAX_SECONDS && (self.nanos as i128) < NANOS_PER_SECOND
    }

    /// Total time since the epoch in units of 2^-16 ns
    fn to_scaled(self) -> i128 {
        ((self.seconds as i128 * NANOS_PER_SECOND + self.nanos as i128) << 16)
            + self.nanos_frac as i128
    }

    fn from_scaled(scaled: i128) -> Self {
        let max = Self {
            seconds: MAX_SECONDS,
            nanos: (NANOS_PER_SECOND - 1) as u32,
            nanos_frac: u16::MAX,
        };
        let scaled = scaled.clamp(0, max.to_scaled());
        let nanos = scaled >> 16;

        Self {
            seconds: (nanos / NANOS_PER_SECOND) as u64,
            nanos: (nanos % NANOS_PER_SECOND) as u32,
            nanos_frac: scaled as u16,
        }
    }

    /// The interval `self - earlier`, saturating when it does not fit a
    /// [`TimeInterval`]
    pub fn diff(self, earlier: Timestamp) -> TimeInterval {
        let scaled = self.to_scaled() - earlier.to_scaled();
        TimeInterval::from_bits(scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Move the timestamp by `interval`, saturating at the epoch and at the
    /// largest 48-bit second count
    pub fn add_interval(self, interval: TimeInterval) -> Timestamp {
        Self::from_scaled(self.to_scaled() + interval.to_bits() as i128)
    }

    /// The magnitude of an interval as a timestamp-shaped delta
    pub fn from_interval_abs(interval: TimeInterval) -> Timestamp {
        Self::from_scaled((interval.to_bits() as i128).abs())
    }
}

impl Sub for Timestamp {
    type Output = TimeInterval;

    fn sub(self, rhs: Self) -> Self::Output {
        self.diff(rhs)
    }
}

impl core::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanos)
    }
}

impl WireFormat for Timestamp {
    fn wire_size(&self) -> usize {
        10
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        let buffer = array_mut::<10>(buffer)?;
        buffer[0..6].copy_from_slice(&self.seconds.to_be_bytes()[2..8]);
        buffer[6..10].copy_from_slice(&self.nanos.to_be_bytes());
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        let buffer = array::<10>(buffer)?;
        let mut seconds_buffer = [0; 8];
        seconds_buffer[2..8].copy_from_slice(&buffer[0..6]);

        Ok(Self {
            seconds: u64::from_be_bytes(seconds_buffer),
            nanos: u32::from_be_bytes(array(&buffer[6..10])?),
            nanos_frac: 0,
        })
    }
}
