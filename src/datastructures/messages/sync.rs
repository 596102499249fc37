use getset::CopyGetters;

use super::Header;
use crate::datastructures::{common::Timestamp, WireFormat, WireFormatError};

/// Body shared by Sync, Delay_Req and Follow_Up: a single timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct TimestampMessage {
    pub(crate) header: Header,
    /// Origin timestamp for Sync and Delay_Req, precise origin timestamp for
    /// Follow_Up
    pub(crate) timestamp: Timestamp,
}

impl TimestampMessage {
    pub fn new(header: Header, timestamp: Timestamp) -> Self {
        Self { header, timestamp }
    }

    pub fn content_size(&self) -> usize {
        10
    }

    pub fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        self.timestamp.serialize(buffer)
    }

    pub fn deserialize_content(header: Header, buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self {
            header,
            timestamp: Timestamp::deserialize(buffer)?,
        })
    }
}
