//! Ptp network messages

use num_enum::{IntoPrimitive, TryFromPrimitive};

use self::header::HEADER_SIZE;
use super::{
    array, array_mut,
    common::{PortIdentity, TimeInterval},
    WireFormat, WireFormatError,
};

mod announce;
mod flag_field;
mod header;
mod p_delay;
mod signalling;
mod sync;

pub use announce::*;
pub use flag_field::*;
pub use header::{Header, PtpVersion, SdoId};
pub use p_delay::*;
pub use signalling::*;
pub use sync::*;

const FLAG_FIELD_OFFSET: usize = 6;
const CORRECTION_FIELD_OFFSET: usize = 8;
const SOURCE_PORT_ID_OFFSET: usize = 20;
const STEPS_REMOVED_OFFSET: usize = 61;

#[derive(Debug, Clone, Copy, TryFromPrimitive, IntoPrimitive, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Sync = 0x0,
    DelayReq = 0x1,
    PDelayReq = 0x2,
    PDelayResp = 0x3,
    FollowUp = 0x8,
    DelayResp = 0x9,
    PDelayRespFollowUp = 0xA,
    Announce = 0xB,
    Signaling = 0xC,
    Management = 0xD,
}

impl MessageType {
    /// Value of the PTPv1 control field, still transmitted for compatibility
    pub fn control_field(self) -> u8 {
        match self {
            MessageType::Sync => 0,
            MessageType::DelayReq => 1,
            MessageType::FollowUp => 2,
            MessageType::DelayResp => 3,
            MessageType::Management => 4,
            _ => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message<'a> {
    Sync(TimestampMessage),
    DelayReq(TimestampMessage),
    PDelayReq(PDelayMessage),
    PDelayResp(PDelayMessage),
    FollowUp(TimestampMessage),
    DelayResp(PDelayMessage),
    PDelayRespFollowUp(PDelayMessage),
    Announce(AnnounceMessage),
    Signaling(SignalingMessage<'a>),
    /// Management bodies are not interpreted
    Management(Header),
}

impl<'a> Message<'a> {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Sync(_) => MessageType::Sync,
            Message::DelayReq(_) => MessageType::DelayReq,
            Message::PDelayReq(_) => MessageType::PDelayReq,
            Message::PDelayResp(_) => MessageType::PDelayResp,
            Message::FollowUp(_) => MessageType::FollowUp,
            Message::DelayResp(_) => MessageType::DelayResp,
            Message::PDelayRespFollowUp(_) => MessageType::PDelayRespFollowUp,
            Message::Announce(_) => MessageType::Announce,
            Message::Signaling(_) => MessageType::Signaling,
            Message::Management(_) => MessageType::Management,
        }
    }

    pub fn header(&self) -> Header {
        match self {
            Message::Sync(m) | Message::DelayReq(m) | Message::FollowUp(m) => m.header,
            Message::PDelayReq(m)
            | Message::PDelayResp(m)
            | Message::DelayResp(m)
            | Message::PDelayRespFollowUp(m) => m.header,
            Message::Announce(m) => m.header,
            Message::Signaling(m) => m.header,
            Message::Management(header) => *header,
        }
    }

    fn content_size(&self) -> usize {
        match self {
            Message::Sync(m) | Message::DelayReq(m) | Message::FollowUp(m) => m.content_size(),
            Message::PDelayReq(m)
            | Message::PDelayResp(m)
            | Message::DelayResp(m)
            | Message::PDelayRespFollowUp(m) => m.content_size(),
            Message::Announce(m) => m.content_size(),
            Message::Signaling(m) => m.content_size(),
            Message::Management(_) => 0,
        }
    }

    /// The number of bytes the message takes on the wire
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.content_size()
    }

    /// Serialize the header followed by the body.
    ///
    /// The message type and length fields of the header are derived from
    /// the message. Returns the number of bytes written. On error the buffer
    /// is left untouched.
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<usize, WireFormatError> {
        let size = self.wire_size();
        if u16::try_from(size).is_err() {
            return Err(WireFormatError::Invalid);
        }
        let buffer = buffer
            .get_mut(..size)
            .ok_or(WireFormatError::BufferTooShort)?;

        self.header()
            .serialize_for(self.message_type(), size, buffer)?;

        let content = &mut buffer[HEADER_SIZE..];
        match self {
            Message::Sync(m) | Message::DelayReq(m) | Message::FollowUp(m) => {
                m.serialize_content(content)?
            }
            Message::PDelayReq(m)
            | Message::PDelayResp(m)
            | Message::DelayResp(m)
            | Message::PDelayRespFollowUp(m) => m.serialize_content(content)?,
            Message::Announce(m) => m.serialize_content(content)?,
            Message::Signaling(m) => m.serialize_content(content)?,
            Message::Management(_) => {}
        }

        Ok(size)
    }

    /// Parse a message, reading no further than its declared length
    pub fn deserialize(buffer: &'a [u8]) -> Result<Self, WireFormatError> {
        let header = Header::deserialize(buffer)?;

        let length = header.message_length as usize;
        if length < HEADER_SIZE {
            return Err(WireFormatError::Invalid);
        }
        let content = buffer
            .get(HEADER_SIZE..length)
            .ok_or(WireFormatError::BufferTooShort)?;

        Ok(match header.message_type {
            MessageType::Sync => {
                Message::Sync(TimestampMessage::deserialize_content(header, content)?)
            }
            MessageType::DelayReq => {
                Message::DelayReq(TimestampMessage::deserialize_content(header, content)?)
            }
            MessageType::FollowUp => {
                Message::FollowUp(TimestampMessage::deserialize_content(header, content)?)
            }
            MessageType::PDelayReq => {
                Message::PDelayReq(PDelayMessage::deserialize_content(header, content)?)
            }
            MessageType::PDelayResp => {
                Message::PDelayResp(PDelayMessage::deserialize_content(header, content)?)
            }
            MessageType::DelayResp => {
                Message::DelayResp(PDelayMessage::deserialize_content(header, content)?)
            }
            MessageType::PDelayRespFollowUp => Message::PDelayRespFollowUp(
                PDelayMessage::deserialize_content(header, content)?,
            ),
            MessageType::Announce => {
                Message::Announce(AnnounceMessage::deserialize_content(header, content)?)
            }
            MessageType::Signaling => {
                Message::Signaling(SignalingMessage::deserialize_content(header, content)?)
            }
            MessageType::Management => Message::Management(header),
        })
    }
}

/// Overwrite the correction field of a packed message
pub fn pack_correction_field(
    buffer: &mut [u8],
    correction: TimeInterval,
) -> Result<(), WireFormatError> {
    correction.serialize(buffer.get_mut(CORRECTION_FIELD_OFFSET..).unwrap_or_default())
}

/// Add `correction` to the correction field of a packed message, as a
/// transparent clock does for residence time
pub fn update_correction_field(
    buffer: &mut [u8],
    correction: TimeInterval,
) -> Result<TimeInterval, WireFormatError> {
    let field = array_mut::<8>(
        buffer
            .get_mut(CORRECTION_FIELD_OFFSET..)
            .unwrap_or_default(),
    )?;
    let updated = TimeInterval::deserialize(field.as_slice())?.saturating_add(correction);
    *field = updated.to_bits().to_be_bytes();
    Ok(updated)
}

/// Overwrite the source port identity of a packed message
pub fn pack_source_port_identity(
    buffer: &mut [u8],
    identity: PortIdentity,
) -> Result<(), WireFormatError> {
    identity.serialize(buffer.get_mut(SOURCE_PORT_ID_OFFSET..).unwrap_or_default())
}

/// Overwrite the flag field of a packed message
pub fn update_flags(buffer: &mut [u8], flags: FlagField) -> Result<(), WireFormatError> {
    flags.serialize(buffer.get_mut(FLAG_FIELD_OFFSET..).unwrap_or_default())
}

/// Read the steps removed field of a packed Announce message
pub fn unpack_steps_removed(buffer: &[u8]) -> Result<u16, WireFormatError> {
    let bytes = array::<2>(buffer.get(STEPS_REMOVED_OFFSET..).unwrap_or_default())?;
    Ok(u16::from_be_bytes(bytes))
}
