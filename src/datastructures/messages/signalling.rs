use getset::CopyGetters;

use super::{Header, MessageType};
use crate::datastructures::{
    common::{PortIdentity, TimeInterval, TlvSet},
    WireFormat, WireFormatError,
};

/// Signalling messages carry no meaningful message interval
pub(crate) const SIGNALING_LOG_INTERVAL: i8 = 0x7f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
pub struct SignalingMessage<'a> {
    #[getset(get_copy = "pub")]
    pub(crate) header: Header,
    #[getset(get_copy = "pub")]
    pub(crate) target_port_identity: PortIdentity,
    pub(crate) tlv: TlvSet<'a>,
}

impl<'a> SignalingMessage<'a> {
    /// Build a signalling message to `target_port_identity`.
    ///
    /// The type, correction field and message interval of `header` are
    /// forced to the values signalling requires.
    pub fn new(mut header: Header, target_port_identity: PortIdentity, tlv: TlvSet<'a>) -> Self {
        header.message_type = MessageType::Signaling;
        header.correction_field = TimeInterval::ZERO;
        header.log_message_interval = SIGNALING_LOG_INTERVAL;

        Self {
            header,
            target_port_identity,
            tlv,
        }
    }

    pub fn tlv(&self) -> &TlvSet<'a> {
        &self.tlv
    }

    pub fn content_size(&self) -> usize {
        10 + self.tlv.wire_size()
    }

    pub fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.content_size() {
            return Err(WireFormatError::BufferTooShort);
        }
        self.target_port_identity.serialize(&mut buffer[0..10])?;
        self.tlv.serialize(&mut buffer[10..])?;
        Ok(())
    }

    pub fn deserialize_content(header: Header, buffer: &'a [u8]) -> Result<Self, WireFormatError> {
        let target_port_identity = PortIdentity::deserialize(buffer)?;
        let tlv = TlvSet::deserialize(&buffer[10..])?;

        Ok(Self {
            header,
            target_port_identity,
            tlv,
        })
    }
}
