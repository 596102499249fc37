//! General datastructures of the Precision Time Protocol

use core::fmt::Debug;

pub mod common;
pub mod datasets;
pub mod messages;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WireFormatError {
    #[error("enum conversion failed")]
    EnumConversionError,
    #[error("buffer too short")]
    BufferTooShort,
    #[error("invalid content")]
    Invalid,
}

impl<Enum: num_enum::TryFromPrimitive> From<num_enum::TryFromPrimitiveError<Enum>>
    for WireFormatError
{
    fn from(_: num_enum::TryFromPrimitiveError<Enum>) -> Self {
        Self::EnumConversionError
    }
}

pub trait WireFormat: Debug + Clone + Eq {
    /// The byte size on the wire of this object
    fn wire_size(&self) -> usize;

    /// Serializes the object into the PTP wire format.
    ///
    /// Fails without touching the buffer when it is shorter than
    /// [`wire_size`](WireFormat::wire_size).
    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError>;

    /// Deserializes the object from the PTP wire format.
    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError>;
}

/// Borrow exactly `N` bytes from the start of `buffer`.
pub(crate) fn array<const N: usize>(buffer: &[u8]) -> Result<[u8; N], WireFormatError> {
    buffer
        .get(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(WireFormatError::BufferTooShort)
}

/// Mutably borrow exactly `N` bytes from the start of `buffer`.
pub(crate) fn array_mut<const N: usize>(
    buffer: &mut [u8],
) -> Result<&mut [u8; N], WireFormatError> {
    buffer
        .get_mut(..N)
        .and_then(|b| b.try_into().ok())
        .ok_or(WireFormatError::BufferTooShort)
}
