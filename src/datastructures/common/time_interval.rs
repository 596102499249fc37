use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use fixed::types::I48F16;

use crate::datastructures::{array, array_mut, WireFormat, WireFormatError};

/// Represents time intervals in nanoseconds
///
/// The value is a signed fixed point number with 16 fractional bits, so the
/// raw representation is `ns * 2^16`. This is the unit used on the wire for
/// the correction field and for all delay and offset arithmetic.
///
/// The operator implementations panic on overflow. Use the `checked_*` or
/// `saturating_*` variants on values derived from the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeInterval(pub I48F16);

impl TimeInterval {
    pub const ZERO: Self = Self(I48F16::ZERO);
    pub const MAX: Self = Self(I48F16::MAX);
    pub const MIN: Self = Self(I48F16::MIN);

    pub const fn from_bits(bits: i64) -> Self {
        Self(I48F16::from_bits(bits))
    }

    pub const fn to_bits(self) -> i64 {
        self.0.to_bits()
    }

    /// Whole nanoseconds, saturating at the representable range
    pub fn from_nanos(nanos: i64) -> Self {
        Self(I48F16::saturating_from_num(nanos))
    }

    pub fn from_micros(micros: i64) -> Self {
        Self::from_nanos(micros.saturating_mul(1_000))
    }

    pub fn from_millis(millis: i64) -> Self {
        Self::from_nanos(millis.saturating_mul(1_000_000))
    }

    /// The whole nanoseconds, rounded towards negative infinity
    pub const fn nanos(self) -> i64 {
        self.to_bits() >> 16
    }

    /// The sub-nanosecond part in units of 2^-16 ns
    pub const fn nanos_frac(self) -> u16 {
        self.to_bits() as u16
    }

    pub fn abs(self) -> Self {
        Self(self.0.saturating_abs())
    }

    pub fn is_negative(self) -> bool {
        self.0.is_negative()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    pub fn checked_mul(self, rhs: i64) -> Option<Self> {
        self.0.checked_mul_int(rhs).map(Self)
    }

    pub fn checked_div(self, rhs: i64) -> Option<Self> {
        self.0.checked_div_int(rhs).map(Self)
    }

    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// Limit the interval to `[-limit, limit]`
    pub fn clamp_abs(self, limit: Self) -> Self {
        let limit = limit.abs();
        Self(self.0.clamp(-limit.0, limit.0))
    }
}

impl Add for TimeInterval {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match self.checked_add(rhs) {
            Some(v) => v,
            None => panic!("TimeInterval overflow in {self:?} + {rhs:?}"),
        }
    }
}

impl AddAssign for TimeInterval {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for TimeInterval {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        match self.checked_sub(rhs) {
            Some(v) => v,
            None => panic!("TimeInterval overflow in {self:?} - {rhs:?}"),
        }
    }
}

impl SubAssign for TimeInterval {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for TimeInterval {
    type Output = Self;

    fn neg(self) -> Self::Output {
        match self.0.checked_neg() {
            Some(v) => Self(v),
            None => panic!("TimeInterval overflow in -{self:?}"),
        }
    }
}

impl core::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl serde::Serialize for TimeInterval {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.0.to_num::<f64>())
    }
}

impl WireFormat for TimeInterval {
    fn wire_size(&self) -> usize {
        8
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        *array_mut::<8>(buffer)? = self.0.to_bits().to_be_bytes();
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self::from_bits(i64::from_be_bytes(array(buffer)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_interval_wireformat() {
        let representations = [
            (
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x80, 0x00u8],
                TimeInterval(I48F16::from_num(2.5f64)),
            ),
            (
                [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01u8],
                TimeInterval(I48F16::from_num(1.0f64 / u16::MAX as f64)),
            ),
            (
                [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00u8],
                TimeInterval(I48F16::from_num(-1.0f64)),
            ),
        ];

        for (byte_representation, object_representation) in representations {
            // Test the serialization output
            let mut serialization_buffer = [0; 8];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            // Test the deserialization output
            let deserialized_data = TimeInterval::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut buffer = [0xaa; 7];
        assert_eq!(
            TimeInterval::from_nanos(1).serialize(&mut buffer),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(buffer, [0xaa; 7]);
        assert_eq!(
            TimeInterval::deserialize(&buffer),
            Err(WireFormatError::BufferTooShort)
        );
    }

    #[test]
    fn nanos_round_down() {
        assert_eq!(TimeInterval::from_nanos(1234).nanos(), 1234);
        assert_eq!(TimeInterval::from_bits((5 << 16) + 0x8000).nanos(), 5);
        assert_eq!(TimeInterval::from_bits(-(5 << 16) - 0x8000).nanos(), -6);
        assert_eq!(TimeInterval::from_bits((5 << 16) + 0x1234).nanos_frac(), 0x1234);
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(TimeInterval::MAX.checked_add(TimeInterval::from_nanos(1)), None);
        assert_eq!(TimeInterval::MIN.checked_sub(TimeInterval::from_nanos(1)), None);
        assert_eq!(
            TimeInterval::from_nanos(10).checked_mul(3),
            Some(TimeInterval::from_nanos(30))
        );
        assert_eq!(
            TimeInterval::from_nanos(30).checked_div(3),
            Some(TimeInterval::from_nanos(10))
        );
        assert_eq!(TimeInterval::from_nanos(30).checked_div(0), None);
        assert_eq!(
            TimeInterval::MAX.saturating_add(TimeInterval::from_nanos(1)),
            TimeInterval::MAX
        );
    }

    #[test]
    #[should_panic]
    fn operator_overflow_panics() {
        let _ = TimeInterval::MAX + TimeInterval::from_nanos(1);
    }

    #[test]
    fn clamp_abs() {
        let limit = TimeInterval::from_millis(500);
        assert_eq!(TimeInterval::from_millis(700).clamp_abs(limit), limit);
        assert_eq!(TimeInterval::from_millis(-700).clamp_abs(limit), -limit);
        assert_eq!(
            TimeInterval::from_millis(300).clamp_abs(limit),
            TimeInterval::from_millis(300)
        );
    }
}
