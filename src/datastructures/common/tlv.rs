use super::ClockIdentity;
use crate::datastructures::WireFormatError;

const TLV_HEADER_SIZE: usize = 4;

/// A sequence of TLVs following a message body
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TlvSet<'a> {
    bytes: &'a [u8],
}

impl core::fmt::Debug for TlvSet<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.tlv()).finish()
    }
}

impl<'a> TlvSet<'a> {
    pub fn wire_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        buffer
            .get_mut(..self.bytes.len())
            .ok_or(WireFormatError::BufferTooShort)?
            .copy_from_slice(self.bytes);

        Ok(self.bytes.len())
    }

    /// Validate every TLV in `buffer`.
    ///
    /// Trailing bytes shorter than a TLV header are ignored, matching how
    /// padded frames arrive off the wire.
    pub fn deserialize(buffer: &'a [u8]) -> Result<Self, WireFormatError> {
        let mut rest = buffer;
        let mut total_length = 0;

        while rest.len() >= TLV_HEADER_SIZE {
            let tlv = Tlv::deserialize(rest)?;
            total_length += tlv.wire_size();
            rest = &rest[tlv.wire_size()..];
        }

        Ok(Self {
            bytes: &buffer[..total_length],
        })
    }

    pub fn tlv(&self) -> impl Iterator<Item = Tlv<'a>> + 'a {
        let mut buffer = self.bytes;

        core::iter::from_fn(move || {
            let tlv = Tlv::deserialize(buffer).ok()?;
            buffer = &buffer[tlv.wire_size()..];
            Some(tlv)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub tlv_type: TlvType,
    pub value: &'a [u8],
}

impl<'a> Tlv<'a> {
    pub fn wire_size(&self) -> usize {
        TLV_HEADER_SIZE + self.value.len()
    }

    /// The value of the length field
    pub fn length_field(&self) -> u16 {
        self.value.len() as u16
    }

    /// Write the TLV to the start of `buffer`, returning the number of bytes
    /// used.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        let length = u16::try_from(self.value.len()).map_err(|_| WireFormatError::Invalid)?;
        let buffer = buffer
            .get_mut(..self.wire_size())
            .ok_or(WireFormatError::BufferTooShort)?;

        buffer[0..2].copy_from_slice(&self.tlv_type.to_primitive().to_be_bytes());
        buffer[2..4].copy_from_slice(&length.to_be_bytes());
        buffer[4..].copy_from_slice(self.value);

        Ok(self.wire_size())
    }

    /// Read one TLV from the start of `buffer`.
    ///
    /// A zero type or zero length is invalid, as is a length that runs past
    /// the end of the buffer.
    pub fn deserialize(buffer: &'a [u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < TLV_HEADER_SIZE {
            return Err(WireFormatError::BufferTooShort);
        }

        let tlv_type = u16::from_be_bytes([buffer[0], buffer[1]]);
        let length = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;

        if tlv_type == 0 || length == 0 {
            tracing::trace!(tlv_type, length, "rejecting empty tlv");
            return Err(WireFormatError::Invalid);
        }

        let value = buffer
            .get(TLV_HEADER_SIZE..TLV_HEADER_SIZE + length)
            .ok_or(WireFormatError::BufferTooShort)?;

        Ok(Self {
            tlv_type: TlvType::from_primitive(tlv_type),
            value,
        })
    }
}

/// See 14.1.1 / Table 52
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvType {
    Management,
    ManagementErrorStatus,
    OrganizationExtension,
    RequestUnicastTransmission,
    GrantUnicastTransmission,
    CancelUnicastTransmission,
    AcknowledgeCancelUnicastTransmission,
    PathTrace,
    AlternateTimeOffsetIndicator,
    OrganizationExtensionPropagate,
    OrganizationExtensionDoNotPropagate,
    Other(u16),
}

impl TlvType {
    pub fn to_primitive(self) -> u16 {
        match self {
            Self::Management => 0x0001,
            Self::ManagementErrorStatus => 0x0002,
            Self::OrganizationExtension => 0x0003,
            Self::RequestUnicastTransmission => 0x0004,
            Self::GrantUnicastTransmission => 0x0005,
            Self::CancelUnicastTransmission => 0x0006,
            Self::AcknowledgeCancelUnicastTransmission => 0x0007,
            Self::PathTrace => 0x0008,
            Self::AlternateTimeOffsetIndicator => 0x0009,
            Self::OrganizationExtensionPropagate => 0x4000,
            Self::OrganizationExtensionDoNotPropagate => 0x8000,
            Self::Other(value) => value,
        }
    }

    pub fn from_primitive(value: u16) -> Self {
        match value {
            0x0001 => Self::Management,
            0x0002 => Self::ManagementErrorStatus,
            0x0003 => Self::OrganizationExtension,
            0x0004 => Self::RequestUnicastTransmission,
            0x0005 => Self::GrantUnicastTransmission,
            0x0006 => Self::CancelUnicastTransmission,
            0x0007 => Self::AcknowledgeCancelUnicastTransmission,
            0x0008 => Self::PathTrace,
            0x0009 => Self::AlternateTimeOffsetIndicator,
            0x4000 => Self::OrganizationExtensionPropagate,
            0x8000 => Self::OrganizationExtensionDoNotPropagate,
            value => Self::Other(value),
        }
    }
}

/// The clock identities carried by a PATH_TRACE TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathTraceTlv<'a> {
    identities: &'a [u8],
}

impl<'a> PathTraceTlv<'a> {
    pub fn from_tlv(tlv: &Tlv<'a>) -> Result<Self, WireFormatError> {
        if tlv.tlv_type != TlvType::PathTrace || tlv.value.len() % 8 != 0 {
            return Err(WireFormatError::Invalid);
        }

        Ok(Self {
            identities: tlv.value,
        })
    }

    pub fn len(&self) -> usize {
        self.identities.len() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = ClockIdentity> + 'a {
        self.identities.chunks_exact(8).map(|chunk| {
            let mut id = [0; 8];
            id.copy_from_slice(chunk);
            ClockIdentity(id)
        })
    }

    /// Write a PATH_TRACE TLV listing `identities`, returning the number of
    /// bytes used.
    pub fn serialize(
        identities: &[ClockIdentity],
        buffer: &mut [u8],
    ) -> Result<usize, WireFormatError> {
        let size = TLV_HEADER_SIZE + identities.len() * 8;
        let length = u16::try_from(size - TLV_HEADER_SIZE).map_err(|_| WireFormatError::Invalid)?;
        if identities.is_empty() {
            return Err(WireFormatError::Invalid);
        }
        let buffer = buffer
            .get_mut(..size)
            .ok_or(WireFormatError::BufferTooShort)?;

        buffer[0..2].copy_from_slice(&TlvType::PathTrace.to_primitive().to_be_bytes());
        buffer[2..4].copy_from_slice(&length.to_be_bytes());
        for (chunk, id) in buffer[4..].chunks_exact_mut(8).zip(identities) {
            chunk.copy_from_slice(&id.0);
        }

        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tlv_round_trip() {
        let tlv = Tlv {
            tlv_type: TlvType::Management,
            value: &b"hello!"[..],
        };

        let mut buffer = [0; 256];
        let n = tlv.serialize(&mut buffer).unwrap();
        assert_eq!(n, 10);
        assert_eq!(buffer[..4], [0x00, 0x01, 0x00, 0x06]);

        let decoded = Tlv::deserialize(&buffer[..n]).unwrap();
        assert_eq!(decoded.tlv_type, TlvType::Management);
        assert_eq!(decoded.length_field(), 6);
        assert_eq!(decoded.value, b"hello!");
    }

    #[test]
    fn pack_into_short_buffer_fails() {
        let tlv = Tlv {
            tlv_type: TlvType::PathTrace,
            value: &[1, 2, 3, 4, 5, 6, 7, 8],
        };

        let mut buffer = [0xee; 11];
        assert_eq!(
            tlv.serialize(&mut buffer),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(buffer, [0xee; 11]);
    }

    #[test]
    fn unpack_rejects_bad_lengths() {
        // length runs past the buffer
        assert_eq!(
            Tlv::deserialize(&[0x00, 0x08, 0x00, 0x08, 1, 2, 3]),
            Err(WireFormatError::BufferTooShort)
        );
        // zero type
        assert_eq!(
            Tlv::deserialize(&[0x00, 0x00, 0x00, 0x02, 1, 2]),
            Err(WireFormatError::Invalid)
        );
        // zero length
        assert_eq!(
            Tlv::deserialize(&[0x00, 0x08, 0x00, 0x00]),
            Err(WireFormatError::Invalid)
        );
        assert_eq!(
            Tlv::deserialize(&[0x00, 0x08]),
            Err(WireFormatError::BufferTooShort)
        );
    }

    #[test]
    fn tlv_set_iterates_and_ignores_padding() {
        let mut buffer = [0; 64];
        let mut n = Tlv {
            tlv_type: TlvType::GrantUnicastTransmission,
            value: &[0x0b, 0x01, 0, 0, 0, 60, 0, 1],
        }
        .serialize(&mut buffer)
        .unwrap();
        n += PathTraceTlv::serialize(&[ClockIdentity([7; 8])], &mut buffer[n..]).unwrap();

        // two bytes of padding
        let set = TlvSet::deserialize(&buffer[..n + 2]).unwrap();
        assert_eq!(set.wire_size(), n);

        let types: Vec<_> = set.tlv().map(|tlv| tlv.tlv_type).collect();
        assert_eq!(
            types,
            [TlvType::GrantUnicastTransmission, TlvType::PathTrace]
        );
    }

    #[test]
    fn tlv_set_rejects_truncated_tlv() {
        let buffer = [0x00, 0x08, 0x00, 0x10, 1, 2, 3, 4];
        assert_eq!(
            TlvSet::deserialize(&buffer),
            Err(WireFormatError::BufferTooShort)
        );
    }

    #[test]
    fn path_trace() {
        let ids = [ClockIdentity([1; 8]), ClockIdentity([2; 8])];
        let mut buffer = [0; 20];
        assert_eq!(PathTraceTlv::serialize(&ids, &mut buffer), Ok(20));

        let tlv = Tlv::deserialize(&buffer).unwrap();
        let path = PathTraceTlv::from_tlv(&tlv).unwrap();
        assert_eq!(path.len(), 2);
        assert!(path.identities().eq(ids));

        let other = Tlv {
            tlv_type: TlvType::Management,
            value: &buffer[4..],
        };
        assert_eq!(
            PathTraceTlv::from_tlv(&other),
            Err(WireFormatError::Invalid)
        );
    }
}
