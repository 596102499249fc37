use crate::datastructures::{array, array_mut, WireFormat, WireFormatError};

/// The two-byte flag field of the common header
#[derive(Debug, Clone, Default, Copy, PartialEq, Eq, serde::Serialize)]
pub struct FlagField {
    pub alternate_master_flag: bool,
    pub two_step_flag: bool,
    pub unicast_flag: bool,
    pub ptp_profile_specific_1: bool,
    pub ptp_profile_specific_2: bool,
    pub leap61: bool,
    pub leap59: bool,
    pub current_utc_offset_valid: bool,
    pub ptp_timescale: bool,
    pub time_traceable: bool,
    pub frequency_traceable: bool,
    pub synchronization_uncertain: bool,
}

impl FlagField {
    pub fn to_bytes(self) -> [u8; 2] {
        let mut bytes = [0u8; 2];

        bytes[0] |= self.alternate_master_flag as u8;
        bytes[0] |= (self.two_step_flag as u8) << 1;
        bytes[0] |= (self.unicast_flag as u8) << 2;
        bytes[0] |= (self.ptp_profile_specific_1 as u8) << 5;
        bytes[0] |= (self.ptp_profile_specific_2 as u8) << 6;
        bytes[1] |= self.leap61 as u8;
        bytes[1] |= (self.leap59 as u8) << 1;
        bytes[1] |= (self.current_utc_offset_valid as u8) << 2;
        bytes[1] |= (self.ptp_timescale as u8) << 3;
        bytes[1] |= (self.time_traceable as u8) << 4;
        bytes[1] |= (self.frequency_traceable as u8) << 5;
        bytes[1] |= (self.synchronization_uncertain as u8) << 6;

        bytes
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Self {
        Self {
            alternate_master_flag: (bytes[0] & (1 << 0)) > 0,
            two_step_flag: (bytes[0] & (1 << 1)) > 0,
            unicast_flag: (bytes[0] & (1 << 2)) > 0,
            ptp_profile_specific_1: (bytes[0] & (1 << 5)) > 0,
            ptp_profile_specific_2: (bytes[0] & (1 << 6)) > 0,
            leap61: (bytes[1] & (1 << 0)) > 0,
            leap59: (bytes[1] & (1 << 1)) > 0,
            current_utc_offset_valid: (bytes[1] & (1 << 2)) > 0,
            ptp_timescale: (bytes[1] & (1 << 3)) > 0,
            time_traceable: (bytes[1] & (1 << 4)) > 0,
            frequency_traceable: (bytes[1] & (1 << 5)) > 0,
            synchronization_uncertain: (bytes[1] & (1 << 6)) > 0,
        }
    }
}

impl WireFormat for FlagField {
    fn wire_size(&self) -> usize {
        2
    }

    fn serialize(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        *array_mut::<2>(buffer)? = self.to_bytes();
        Ok(())
    }

    fn deserialize(buffer: &[u8]) -> Result<Self, WireFormatError> {
        Ok(Self::from_bytes(array(buffer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flagfield_wireformat() {
        #[rustfmt::skip]
        let representations = [
            ([0x00, 0x00u8], FlagField::default()),
            ([0x01, 0x00u8], FlagField { alternate_master_flag: true, ..Default::default() }),
            ([0x02, 0x00u8], FlagField { two_step_flag: true, ..Default::default() }),
            ([0x04, 0x00u8], FlagField { unicast_flag: true, ..Default::default() }),
            ([0x20, 0x00u8], FlagField { ptp_profile_specific_1: true, ..Default::default() }),
            ([0x40, 0x00u8], FlagField { ptp_profile_specific_2: true, ..Default::default() }),
            ([0x00, 0x01u8], FlagField { leap61: true, ..Default::default() }),
            ([0x00, 0x02u8], FlagField { leap59: true, ..Default::default() }),
            ([0x00, 0x04u8], FlagField { current_utc_offset_valid: true, ..Default::default() }),
            ([0x00, 0x08u8], FlagField { ptp_timescale: true, ..Default::default() }),
            ([0x00, 0x10u8], FlagField { time_traceable: true, ..Default::default() }),
            ([0x00, 0x20u8], FlagField { frequency_traceable: true, ..Default::default() }),
            ([0x00, 0x40u8], FlagField { synchronization_uncertain: true, ..Default::default() }),
        ];

        for (i, (byte_representation, flag_representation)) in
            representations.into_iter().enumerate()
        {
            let mut serialization_buffer = [0; 2];
            flag_representation
                .serialize(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation, "variant {i}");

            let deserialized = FlagField::deserialize(&byte_representation).unwrap();
            assert_eq!(deserialized, flag_representation, "variant {i}");
        }
    }
}
