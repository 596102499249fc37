use serde::{Deserialize, Serialize};

use crate::datastructures::common::TimeSource;

const SECONDS_PER_DAY: i64 = 86_400;

/// Direction of an announced leap second
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeapType {
    /// The last minute of the leap day has 59 seconds
    Leap59,
    /// The last minute of the leap day has 61 seconds
    #[default]
    Leap61,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize)]
pub struct TimePropertiesDS {
    pub current_utc_offset: i16,
    pub current_utc_offset_valid: bool,
    pub leap59: bool,
    pub leap61: bool,
    pub time_traceable: bool,
    pub frequency_traceable: bool,
    pub ptp_timescale: bool,
    pub time_source: TimeSource,
    /// A leap event is scheduled at [`leap_date`](Self::leap_date)
    pub pending_leap: bool,
    /// Day of the leap event, counted in days since 1970-01-01
    pub leap_date: u16,
    pub leap_type: LeapType,
}

/// Outcome of comparing a point in time against the configured leap event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeapStatus {
    /// No leap pending, or more than a day until it happens
    None,
    /// The leap happens within the next 24 hours
    Imminent(LeapType),
    /// The leap instant has passed
    Applied(LeapType),
}

impl TimePropertiesDS {
    pub fn new_ptp_time(
        current_utc_offset: i16,
        current_utc_offset_valid: bool,
        time_traceable: bool,
        frequency_traceable: bool,
        time_source: TimeSource,
    ) -> Self {
        TimePropertiesDS {
            current_utc_offset,
            current_utc_offset_valid,
            time_traceable,
            frequency_traceable,
            ptp_timescale: true,
            time_source,
            ..Default::default()
        }
    }

    pub fn new_arbitrary_time(
        time_traceable: bool,
        frequency_traceable: bool,
        time_source: TimeSource,
    ) -> Self {
        TimePropertiesDS {
            time_traceable,
            frequency_traceable,
            ptp_timescale: false,
            time_source,
            ..Default::default()
        }
    }

    /// Schedule a leap event
    pub fn with_leap(mut self, leap_date: u16, leap_type: LeapType) -> Self {
        self.pending_leap = true;
        self.leap_date = leap_date;
        self.leap_type = leap_type;
        self
    }

    /// Where `ptp_seconds` lies relative to the configured leap event.
    ///
    /// The PTP time is converted to UTC with the configured UTC offset
    /// before the comparison.
    pub fn leap_status(&self, ptp_seconds: u64) -> LeapStatus {
        if !self.pending_leap {
            return LeapStatus::None;
        }

        let leap_instant =
            self.leap_date as i64 * SECONDS_PER_DAY + self.current_utc_offset as i64;
        let now = i64::try_from(ptp_seconds).unwrap_or(i64::MAX);

        if now >= leap_instant {
            LeapStatus::Applied(self.leap_type)
        } else if now.saturating_add(SECONDS_PER_DAY) >= leap_instant {
            LeapStatus::Imminent(self.leap_type)
        } else {
            LeapStatus::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leap_status_windows() {
        let props = TimePropertiesDS::new_ptp_time(37, true, false, false, TimeSource::Gnss)
            .with_leap(20_000, LeapType::Leap61);
        let instant = 20_000 * 86_400 + 37;

        assert_eq!(props.leap_status(instant - 86_401), LeapStatus::None);
        assert_eq!(
            props.leap_status(instant - 86_400),
            LeapStatus::Imminent(LeapType::Leap61)
        );
        assert_eq!(
            props.leap_status(instant - 1),
            LeapStatus::Imminent(LeapType::Leap61)
        );
        assert_eq!(
            props.leap_status(instant),
            LeapStatus::Applied(LeapType::Leap61)
        );
    }

    #[test]
    fn no_pending_leap() {
        let props = TimePropertiesDS::new_ptp_time(37, true, false, false, TimeSource::Gnss);
        assert_eq!(props.leap_status(u64::MAX), LeapStatus::None);
    }
}
