use getset::{CopyGetters, Setters};

use super::{FlagField, MessageType};
use crate::datastructures::{
    array_mut,
    common::{PortIdentity, TimeInterval},
    WireFormat, WireFormatError,
};

pub(crate) const HEADER_SIZE: usize = 34;

/// The common header in front of every PTP message
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct Header {
    pub(crate) message_type: MessageType,
    pub(crate) sdo_id: SdoId,
    pub(crate) version: PtpVersion,
    pub(crate) message_length: u16,
    pub(crate) domain_number: u8,
    pub(crate) flags: FlagField,
    pub(crate) correction_field: TimeInterval,
    pub(crate) source_port_identity: PortIdentity,
    pub(crate) sequence_id: u16,
    pub(crate) control_field: u8,
    pub(crate) log_message_interval: i8,
}

impl Header {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            sdo_id: SdoId(0),
            version: PtpVersion { major: 2, minor: 1 },
            message_length: HEADER_SIZE as u16,
            domain_number: 0,
            flags: FlagField::default(),
            correction_field: TimeInterval::ZERO,
            source_port_identity: PortIdentity::default(),
            sequence_id: 0,
            control_field: message_type.control_field(),
            log_message_interval: 0,
        }
    }

    /// Serialize with the type and total length of the message this header
    /// is in front of.
    pub(crate) fn serialize_for(
        &self,
        message_type: MessageType,
        message_length: usize,
        buffer: &mut [u8],
    ) -> Result<(), WireFormatError> {
        let message_length =
            u16::try_from(message_length).map_err(|_| WireFormatError::Invalid)?;
        let buffer = array_mut::<HEADER_SIZE>(buffer)?;

        buffer[0] = (self.sdo_id.major() << 4) | (u8::from(message_type) & 0x0f);
        buffer[1] = self.version.as_byte();
        buffer[2..4].copy_from_slice(&message_length.to_be_bytes());
        buffer[4] = self.domain_number;
        buffer[5] = self.sdo_id.minor();
        buffer[6..8].copy_from_slice(&self.flags.to_bytes());
        self.correction_field.serialize(&mut buffer[8..16])?;
        buffer[16..20].copy_from_slice(&[0, 0, 0, 0]);
        self.source_port_identity.serialize(&mut buffer[20..30])?;
        buffer[30..32].copy_from_slice(&self.sequence_id.to_be_bytes());
        buffer[32] = self.control_field;
        buffer[33] = self.log_message_interval as u8;

        Ok(())
    }
}

impl WireFormat for Header {
    fn wire_size(&self) -> usize {
        HEADER_SIZE
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        self.serialize_for(self.message_type, self.message_length as usize, buffer)
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < HEADER_SIZE {
            return Err(WireFormatError::BufferTooShort);
        }

        Ok(Self {
            message_type: (buffer[0] & 0x0f).try_into()?,
            sdo_id: SdoId((((buffer[0] & 0xf0) as u16) << 4) | (buffer[5] as u16)),
            version: PtpVersion::from_byte(buffer[1]),
            message_length: u16::from_be_bytes([buffer[2], buffer[3]]),
            domain_number: buffer[4],
            flags: FlagField::deserialize(&buffer[6..8])?,
            correction_field: TimeInterval::deserialize(&buffer[8..16])?,
            source_port_identity: PortIdentity::deserialize(&buffer[20..30])?,
            sequence_id: u16::from_be_bytes([buffer[30], buffer[31]]),
            control_field: buffer[32],
            log_message_interval: buffer[33] as i8,
        })
    }
}

/// A wrapper type for PTP Sdo Identifiers.
///
/// The upper nibble travels in the transport-specific half of the first
/// header byte, the lower byte in the minor sdo id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SdoId(u16);

impl core::fmt::Display for SdoId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl SdoId {
    /// Only identifiers in the range 0-4095 exist.
    pub fn new(sdo_id: u16) -> Option<Self> {
        (0..=0x0fff).contains(&sdo_id).then_some(Self(sdo_id))
    }

    /// The 802.1AS transport specific value
    pub const IEEE_802_1AS: Self = Self(0x100);

    const fn major(self) -> u8 {
        (self.0 >> 8) as u8
    }

    const fn minor(self) -> u8 {
        self.0 as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpVersion {
    major: u8,
    minor: u8,
}

impl PtpVersion {
    pub fn new(major: u8, minor: u8) -> Option<Self> {
        if major >= 0x10 || minor >= 0x10 {
            None
        } else {
            Some(Self { major, minor })
        }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    fn as_byte(&self) -> u8 {
        (self.minor << 4) | self.major
    }

    fn from_byte(byte: u8) -> Self {
        Self {
            major: byte & 0x0f,
            minor: byte >> 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use fixed::types::I48F16;

    use super::*;
    use crate::datastructures::common::ClockIdentity;

    #[test]
    fn header_wireformat() {
        let representations = [(
            [
                0x59, 0xa1, 0x12, 0x34, 0xaa, 0xbb, 0b0100_0101, 0b0010_1010, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x01, 0x80, 0x00, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 0x55, 0x55, 0xde,
                0xad, 0x03, 0x16,
            ],
            Header {
                message_type: MessageType::DelayResp,
                sdo_id: SdoId(0x5bb),
                version: PtpVersion {
                    major: 0x1,
                    minor: 0xa,
                },
                message_length: 0x1234,
                domain_number: 0xaa,
                flags: FlagField {
                    alternate_master_flag: true,
                    unicast_flag: true,
                    ptp_profile_specific_2: true,
                    leap59: true,
                    ptp_timescale: true,
                    frequency_traceable: true,
                    ..Default::default()
                },
                correction_field: TimeInterval(I48F16::from_num(1.5f64)),
                source_port_identity: PortIdentity {
                    clock_identity: ClockIdentity([0, 1, 2, 3, 4, 5, 6, 7]),
                    port_number: 0x5555,
                },
                sequence_id: 0xdead,
                control_field: 0x03,
                log_message_interval: 0x16,
            },
        )];

        for (byte_representation, object_representation) in representations {
            // Test the serialization output
            let mut serialization_buffer = [0; 34];
            object_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            // Test the deserialization output
            let deserialized_data = Header::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }

    #[test]
    fn unknown_message_type() {
        let mut buffer = [0; 34];
        Header::new(MessageType::Sync).serialize(&mut buffer).unwrap();
        buffer[0] = 0x05;
        assert_eq!(
            Header::deserialize(&buffer),
            Err(WireFormatError::EnumConversionError)
        );
    }

    #[test]
    fn control_field_follows_type() {
        assert_eq!(Header::new(MessageType::FollowUp).control_field(), 0x02);
        assert_eq!(Header::new(MessageType::Announce).control_field(), 0x05);
    }

    #[test]
    fn short_buffer() {
        let mut buffer = [0u8; 33];
        assert_eq!(
            Header::new(MessageType::Sync).serialize(&mut buffer),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(
            Header::deserialize(&buffer),
            Err(WireFormatError::BufferTooShort)
        );
    }
}
