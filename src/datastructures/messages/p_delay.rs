use getset::CopyGetters;

use super::Header;
use crate::datastructures::{
    common::{PortIdentity, Timestamp},
    WireFormat, WireFormatError,
};

/// Body of Pdelay_Req, Pdelay_Resp, Pdelay_Resp_Follow_Up and Delay_Resp:
/// a timestamp followed by a port identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct PDelayMessage {
    pub(crate) header: Header,
    pub(crate) timestamp: Timestamp,
    /// The requesting port for responses, reserved for requests
    pub(crate) port_identity: PortIdentity,
}

impl PDelayMessage {
    pub fn new(header: Header, timestamp: Timestamp, port_identity: PortIdentity) -> Self {
        Self {
            header,
            timestamp,
            port_identity,
        }
    }

    pub fn content_size(&self) -> usize {
        20
    }

    pub fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.content_size() {
            return Err(WireFormatError::BufferTooShort);
        }
        self.timestamp.serialize(&mut buffer[0..10])?;
        self.port_identity.serialize(&mut buffer[10..20])
    }

    pub fn deserialize_content(header: Header, buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 20 {
            return Err(WireFormatError::BufferTooShort);
        }
        Ok(Self {
            header,
            timestamp: Timestamp::deserialize(&buffer[0..10])?,
            port_identity: PortIdentity::deserialize(&buffer[10..20])?,
        })
    }
}
