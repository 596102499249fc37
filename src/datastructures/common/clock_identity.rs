use crate::datastructures::{array, array_mut, WireFormat, WireFormatError};

/// The identity of a PTP node.
///
/// Must have a unique value for each node in a ptp network. For notes on
/// generating these, see IEEE1588-2019 section 7.5.2.2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct ClockIdentity(pub [u8; 8]);

impl ClockIdentity {
    /// Derive an identity from a 48-bit MAC address by inserting `ff:fe`
    pub fn from_mac_address(addr: [u8; 6]) -> Self {
        Self([
            addr[0], addr[1], addr[2], 0xff, 0xfe, addr[3], addr[4], addr[5],
        ])
    }
}

impl core::fmt::Display for ClockIdentity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl WireFormat for ClockIdentity {
    fn wire_size(&self) -> usize {
        8
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        *array_mut::<8>(buffer)? = self.0;
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self(array(buffer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_the_raw_bytes() {
        let identity = ClockIdentity([0x00, 0x1b, 0x19, 0xff, 0xfe, 0x0a, 0x0b, 0x0c]);
        let mut buffer = [0; 8];
        identity.serialize(&mut buffer).unwrap();
        assert_eq!(buffer, identity.0);
        assert_eq!(ClockIdentity::deserialize(&buffer).unwrap(), identity);
        assert!(ClockIdentity::deserialize(&buffer[..7]).is_err());
    }

    #[test]
    fn from_mac() {
        let id = ClockIdentity::from_mac_address([0x00, 0x01, 0xc1, 0x12, 0x34, 0x56]);
        assert_eq!(id.to_string(), "00:01:c1:ff:fe:12:34:56");
    }
}
