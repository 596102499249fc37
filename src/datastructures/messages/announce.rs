use getset::CopyGetters;

use super::{header::HEADER_SIZE, Header, Message};
use crate::datastructures::{
    common::{ClockIdentity, ClockQuality, TimeSource, Timestamp},
    datasets::{LeapStatus, LeapType, PtpProfile, TimePropertiesDS},
    WireFormat, WireFormatError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct AnnounceMessage {
    pub(crate) header: Header,
    pub(crate) origin_timestamp: Timestamp,
    pub(crate) current_utc_offset: i16,
    pub(crate) grandmaster_priority_1: u8,
    pub(crate) grandmaster_clock_quality: ClockQuality,
    pub(crate) grandmaster_priority_2: u8,
    pub(crate) grandmaster_identity: ClockIdentity,
    pub(crate) steps_removed: u16,
    pub(crate) time_source: TimeSource,
}

/// The local clock state consulted when packing an Announce message
#[derive(Debug)]
pub struct GrandmasterContext<'a> {
    /// Identity of the local clock
    pub local_identity: ClockIdentity,
    /// Time properties as configured by the operator
    pub configured: &'a TimePropertiesDS,
    /// Time properties currently in effect, updated when packing
    pub live: &'a mut TimePropertiesDS,
    pub profile: PtpProfile,
}

impl AnnounceMessage {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        header: Header,
        current_utc_offset: i16,
        grandmaster_priority_1: u8,
        grandmaster_clock_quality: ClockQuality,
        grandmaster_priority_2: u8,
        grandmaster_identity: ClockIdentity,
        steps_removed: u16,
        time_source: TimeSource,
    ) -> Self {
        Self {
            header,
            origin_timestamp: Timestamp::default(),
            current_utc_offset,
            grandmaster_priority_1,
            grandmaster_clock_quality,
            grandmaster_priority_2,
            grandmaster_identity,
            steps_removed,
            time_source,
        }
    }

    pub fn content_size(&self) -> usize {
        30
    }

    pub fn serialize_content(&self, buffer: &mut [u8]) -> Result<(), WireFormatError> {
        if buffer.len() < self.content_size() {
            return Err(WireFormatError::BufferTooShort);
        }

        self.origin_timestamp.serialize(&mut buffer[0..10])?;
        buffer[10..12].copy_from_slice(&self.current_utc_offset.to_be_bytes());
        buffer[12] = 0;
        buffer[13] = self.grandmaster_priority_1;
        self.grandmaster_clock_quality
            .serialize(&mut buffer[14..18])?;
        buffer[18] = self.grandmaster_priority_2;
        self.grandmaster_identity.serialize(&mut buffer[19..27])?;
        buffer[27..29].copy_from_slice(&self.steps_removed.to_be_bytes());
        buffer[29] = self.time_source.to_primitive();

        Ok(())
    }

    pub fn deserialize_content(header: Header, buffer: &[u8]) -> Result<Self, WireFormatError> {
        if buffer.len() < 30 {
            return Err(WireFormatError::BufferTooShort);
        }

        Ok(Self {
            header,
            origin_timestamp: Timestamp::deserialize(&buffer[0..10])?,
            current_utc_offset: i16::from_be_bytes([buffer[10], buffer[11]]),
            grandmaster_priority_1: buffer[13],
            grandmaster_clock_quality: ClockQuality::deserialize(&buffer[14..18])?,
            grandmaster_priority_2: buffer[18],
            grandmaster_identity: ClockIdentity::deserialize(&buffer[19..27])?,
            steps_removed: u16::from_be_bytes([buffer[27], buffer[28]]),
            time_source: TimeSource::from_primitive(buffer[29]),
        })
    }

    /// The time properties announced by the sender
    pub fn time_properties(&self) -> TimePropertiesDS {
        let flags = self.header.flags;
        TimePropertiesDS {
            current_utc_offset: self.current_utc_offset,
            current_utc_offset_valid: flags.current_utc_offset_valid,
            leap59: flags.leap59,
            leap61: flags.leap61,
            time_traceable: flags.time_traceable,
            frequency_traceable: flags.frequency_traceable,
            ptp_timescale: flags.ptp_timescale,
            time_source: self.time_source,
            ..Default::default()
        }
    }

    /// Pack the message for transmission at `origin_timestamp`.
    ///
    /// When the local clock is the grandmaster, the UTC offset and leap
    /// flags are derived from the configured leap event and written back to
    /// `context.live`. Nothing is modified when `buffer` is too short.
    pub fn pack(
        &mut self,
        origin_timestamp: Timestamp,
        context: &mut GrandmasterContext<'_>,
        buffer: &mut [u8],
    ) -> Result<usize, WireFormatError> {
        let size = HEADER_SIZE + self.content_size();
        if buffer.len() < size {
            return Err(WireFormatError::BufferTooShort);
        }

        if self.grandmaster_identity == context.local_identity {
            self.apply_grandmaster_time_properties(origin_timestamp, context);
        }

        self.origin_timestamp = match context.profile {
            PtpProfile::Ieee8021As => Timestamp::default(),
            PtpProfile::Default => origin_timestamp,
        };

        Message::Announce(*self).serialize(buffer)
    }

    fn apply_grandmaster_time_properties(
        &mut self,
        origin_timestamp: Timestamp,
        context: &mut GrandmasterContext<'_>,
    ) {
        let configured = context.configured;
        let live = &mut *context.live;

        live.current_utc_offset = configured.current_utc_offset;
        live.leap59 = configured.leap59;
        live.leap61 = configured.leap61;

        match configured.leap_status(origin_timestamp.seconds) {
            LeapStatus::Applied(LeapType::Leap59) => {
                live.current_utc_offset = configured.current_utc_offset.saturating_sub(1);
            }
            LeapStatus::Applied(LeapType::Leap61) => {
                live.current_utc_offset = configured.current_utc_offset.saturating_add(1);
            }
            LeapStatus::Imminent(leap_type) => {
                live.leap59 = leap_type == LeapType::Leap59;
                live.leap61 = leap_type == LeapType::Leap61;
            }
            LeapStatus::None => {}
        }

        tracing::debug!(
            utc_offset = live.current_utc_offset,
            leap59 = live.leap59,
            leap61 = live.leap61,
            "announcing own time properties"
        );

        self.current_utc_offset = live.current_utc_offset;

        let flags = &mut self.header.flags;
        flags.leap61 = live.leap61;
        flags.leap59 = live.leap59;
        flags.current_utc_offset_valid = live.current_utc_offset_valid;
        flags.ptp_timescale = live.ptp_timescale;
        flags.time_traceable = live.time_traceable;
        flags.frequency_traceable = live.frequency_traceable;
        flags.synchronization_uncertain = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastructures::messages::MessageType;

    const LEAP_DAY: u16 = 20_000;

    fn own_announce(local: ClockIdentity) -> AnnounceMessage {
        AnnounceMessage::new(
            Header::new(MessageType::Announce),
            0,
            128,
            ClockQuality::default(),
            128,
            local,
            0,
            TimeSource::Gnss,
        )
    }

    fn configured() -> TimePropertiesDS {
        TimePropertiesDS::new_ptp_time(37, true, true, true, TimeSource::Gnss)
            .with_leap(LEAP_DAY, LeapType::Leap59)
    }

    fn pack_at(seconds: u64) -> (AnnounceMessage, TimePropertiesDS) {
        let local = ClockIdentity([1, 2, 3, 4, 5, 6, 7, 8]);
        let configured = configured();
        let mut live = configured;
        let mut context = GrandmasterContext {
            local_identity: local,
            configured: &configured,
            live: &mut live,
            profile: PtpProfile::Default,
        };

        let mut buffer = [0; 64];
        let n = own_announce(local)
            .pack(Timestamp::new(seconds, 0), &mut context, &mut buffer)
            .unwrap();
        assert_eq!(n, 64);

        match Message::deserialize(&buffer).unwrap() {
            Message::Announce(announce) => (announce, live),
            other => panic!("unexpected message {other:?}"),
        }
    }

    fn transmitted(announce: &AnnounceMessage) -> (i16, bool, bool) {
        (
            announce.current_utc_offset(),
            announce.header().flags().leap59,
            announce.header().flags().leap61,
        )
    }

    #[test]
    fn leap_applied_at_event() {
        let (message, live) = pack_at(LEAP_DAY as u64 * 86_400 + 37);
        assert_eq!(transmitted(&message), (36, false, false));
        assert_eq!(live.current_utc_offset, 36);
        assert!(!live.leap59);
    }

    #[test]
    fn leap_flag_raised_one_day_before() {
        let (message, live) = pack_at(LEAP_DAY as u64 * 86_400 + 37 - 86_400);
        assert_eq!(transmitted(&message), (37, true, false));
        assert!(live.leap59);
    }

    #[test]
    fn no_leap_flags_long_before() {
        let (message, _) = pack_at(LEAP_DAY as u64 * 86_400 - 2 * 86_400);
        assert_eq!(transmitted(&message), (37, false, false));
    }

    #[test]
    fn foreign_grandmaster_is_passed_through() {
        let configured = configured();
        let mut live = TimePropertiesDS::default();
        let mut context = GrandmasterContext {
            local_identity: ClockIdentity([9; 8]),
            configured: &configured,
            live: &mut live,
            profile: PtpProfile::Ieee8021As,
        };

        let mut announce = own_announce(ClockIdentity([1; 8]));
        announce.current_utc_offset = 35;

        let mut buffer = [0; 64];
        announce
            .pack(
                Timestamp::new(LEAP_DAY as u64 * 86_400 + 37, 5),
                &mut context,
                &mut buffer,
            )
            .unwrap();

        assert_eq!(live, TimePropertiesDS::default());
        assert_eq!(&buffer[34..44], &[0; 10]);
        assert_eq!(&buffer[44..46], &35i16.to_be_bytes());
    }

    #[test]
    fn short_buffer_leaves_state_untouched() {
        let local = ClockIdentity([1; 8]);
        let configured = configured();
        let mut live = TimePropertiesDS::default();
        let mut context = GrandmasterContext {
            local_identity: local,
            configured: &configured,
            live: &mut live,
            profile: PtpProfile::Default,
        };

        let mut buffer = [0xcc; 63];
        let origin = Timestamp::new(LEAP_DAY as u64 * 86_400 + 37, 0);
        assert_eq!(
            own_announce(local).pack(origin, &mut context, &mut buffer),
            Err(WireFormatError::BufferTooShort)
        );
        assert_eq!(buffer, [0xcc; 63]);
        assert_eq!(live, TimePropertiesDS::default());
    }

    #[test]
    fn announce_body_wireformat() {
        let representations = [(
            [
                0x00, 0x00, 0x45, 0xb1, 0x11, 0x5a, 0x0a, 0x73, 0x46, 0x60, 0x00, 0x25, 0x00, 0x60,
                0x06, 0x21, 0x4e, 0x5d, 0x63, 0xff, 0xff, 0x00, 0x09, 0xba, 0xf8, 0x21, 0x00, 0x00,
                0x01, 0x20,
            ],
            AnnounceMessage {
                header: Header::new(MessageType::Announce),
                origin_timestamp: Timestamp::new(1169232218, 175326816),
                current_utc_offset: 37,
                grandmaster_priority_1: 96,
                grandmaster_clock_quality: ClockQuality {
                    clock_class: 6,
                    clock_accuracy: 0x21,
                    offset_scaled_log_variance: 0x4e5d,
                },
                grandmaster_priority_2: 99,
                grandmaster_identity: ClockIdentity([
                    0xff, 0xff, 0x00, 0x09, 0xba, 0xf8, 0x21, 0x00,
                ]),
                steps_removed: 1,
                time_source: TimeSource::Gnss,
            },
        )];

        for (byte_representation, object_representation) in representations {
            // Test the serialization output
            let mut serialization_buffer = [0; 30];
            object_representation
                .serialize_content(&mut serialization_buffer)
                .unwrap();
            assert_eq!(serialization_buffer, byte_representation);

            // Test the deserialization output
            let deserialized_data = AnnounceMessage::deserialize_content(
                Header::new(MessageType::Announce),
                &byte_representation,
            )
            .unwrap();
            assert_eq!(deserialized_data, object_representation);
        }
    }
}
