//! Configuration of the filters, the servo and the slave clock

use std::path::Path;

use serde::Deserialize;

use crate::{
    datastructures::{
        common::{TimeInterval, TimeSource},
        datasets::{LeapType, PtpProfile, TimePropertiesDS},
    },
    tracing::LogLevel,
};

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FilterConfig {
    /// Zero selects the windowed path delay filter, any other value `n` a
    /// lowpass filter with period `2^n`
    #[serde(default = "default_delay_filter")]
    pub delay_filter: u32,

    /// Number of samples in a filter window. With `dist == 0` it selects the
    /// lowpass bandwidth in units of 0.01 Hz instead.
    #[serde(default = "default_period")]
    pub period: u32,

    /// Above one: use the minimum of each window and only report every
    /// `dist` windows. One: use the mean. Zero: lowpass the offset.
    #[serde(default = "default_dist")]
    pub dist: u32,

    /// Path delays this far (in ns) above the smallest one seen are ignored
    /// by the lowpass delay filter
    #[serde(default = "default_max_acceptable_delay_variation")]
    pub max_acceptable_delay_variation: u32,

    #[serde(default = "default_min_delay_option")]
    pub min_delay_option: bool,
}

impl FilterConfig {
    pub fn max_delay_variation(&self) -> Option<TimeInterval> {
        self.min_delay_option
            .then(|| TimeInterval::from_nanos(self.max_acceptable_delay_variation as i64))
    }

    /// Default filter parameters of a profile
    pub fn for_profile(profile: PtpProfile) -> Self {
        match profile {
            PtpProfile::Default => Self::default(),
            PtpProfile::Ieee8021As => Self {
                delay_filter: 0,
                period: 1,
                dist: 1,
                ..Self::default()
            },
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            delay_filter: default_delay_filter(),
            period: default_period(),
            dist: default_dist(),
            max_acceptable_delay_variation: default_max_acceptable_delay_variation(),
            min_delay_option: default_min_delay_option(),
        }
    }
}

fn default_delay_filter() -> u32 {
    6
}

fn default_period() -> u32 {
    1
}

fn default_dist() -> u32 {
    2
}

fn default_max_acceptable_delay_variation() -> u32 {
    100_000
}

fn default_min_delay_option() -> bool {
    true
}

/// How the servo output is applied once the offset is small
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServoOption {
    /// Always adjust the frequency
    #[default]
    Free,
    /// Below the synce threshold, keep the frequency and adjust the phase
    Synce,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ServoConfig {
    #[serde(default)]
    pub display_stats: bool,

    #[serde(default = "default_true")]
    pub p_reg: bool,
    #[serde(default = "default_true")]
    pub i_reg: bool,
    #[serde(default = "default_true")]
    pub d_reg: bool,

    /// Divisor of the proportional term
    #[serde(default = "default_ap")]
    pub ap: u32,
    /// Divisor of the integral term
    #[serde(default = "default_ai")]
    pub ai: u32,
    /// Divisor of the derivative term
    #[serde(default = "default_ad")]
    pub ad: u32,
    #[serde(default = "default_gain")]
    pub gain: u32,

    #[serde(default)]
    pub srv_option: ServoOption,

    /// Offset (ns) below which a synce servo switches to phase adjustment
    #[serde(default = "default_synce_threshold")]
    pub synce_threshold: u32,

    /// Number of stable phase-locked adjustments averaged for holdover
    #[serde(default = "default_ho_filter")]
    pub ho_filter: u32,

    /// Allowed distance of an adjustment from the holdover average, in units
    /// of 0.1 ppb
    #[serde(default = "default_stable_adj_threshold")]
    pub stable_adj_threshold: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            display_stats: false,
            p_reg: true,
            i_reg: true,
            d_reg: true,
            ap: default_ap(),
            ai: default_ai(),
            ad: default_ad(),
            gain: default_gain(),
            srv_option: ServoOption::default(),
            synce_threshold: default_synce_threshold(),
            ho_filter: default_ho_filter(),
            stable_adj_threshold: default_stable_adj_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ap() -> u32 {
    3
}

fn default_ai() -> u32 {
    80
}

fn default_ad() -> u32 {
    40
}

fn default_gain() -> u32 {
    1
}

fn default_synce_threshold() -> u32 {
    1000
}

fn default_ho_filter() -> u32 {
    60
}

fn default_stable_adj_threshold() -> u32 {
    300
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SlaveConfig {
    /// Largest change (ns) between consecutive offsets that still counts as
    /// stable
    #[serde(default = "default_stable_offset")]
    pub stable_offset: u32,

    /// Offset (ns) below which a phase lock is declared
    #[serde(default = "default_offset_ok")]
    pub offset_ok: u32,

    /// Offset (ns) above which a phase lock is lost
    #[serde(default = "default_offset_fail")]
    pub offset_fail: u32,

    /// Consecutive stable samples needed to declare the offset stable
    #[serde(default = "default_stable_count")]
    pub stable_count: u32,

    /// Consecutive unstable samples needed to declare the offset unstable
    #[serde(default = "default_unstable_count")]
    pub unstable_count: u32,

    /// Seconds to ignore measurements after the clock was set
    #[serde(default = "default_clock_settle_time")]
    pub clock_settle_time: u32,

    /// Whether path delays are measured. A one-way slave never phase locks.
    #[serde(default = "default_true")]
    pub two_way: bool,

    /// Whether the clock domain is a software clock that can be moved by a
    /// delta instead of being set
    #[serde(default)]
    pub software_domain: bool,

    /// Maintain path delay statistics
    #[serde(default)]
    pub statistics: bool,
}

impl SlaveConfig {
    pub fn stable_offset_threshold(&self) -> TimeInterval {
        TimeInterval::from_nanos(self.stable_offset as i64)
    }

    pub fn offset_ok_threshold(&self) -> TimeInterval {
        TimeInterval::from_nanos(self.offset_ok as i64)
    }

    pub fn offset_fail_threshold(&self) -> TimeInterval {
        TimeInterval::from_nanos(self.offset_fail as i64)
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            stable_offset: default_stable_offset(),
            offset_ok: default_offset_ok(),
            offset_fail: default_offset_fail(),
            stable_count: default_stable_count(),
            unstable_count: default_unstable_count(),
            clock_settle_time: default_clock_settle_time(),
            two_way: true,
            software_domain: false,
            statistics: false,
        }
    }
}

fn default_stable_offset() -> u32 {
    1000
}

fn default_offset_ok() -> u32 {
    1000
}

fn default_offset_fail() -> u32 {
    3000
}

fn default_stable_count() -> u32 {
    10
}

fn default_unstable_count() -> u32 {
    5
}

fn default_clock_settle_time() -> u32 {
    2
}

/// The leap event announced while this clock is grandmaster
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LeapConfig {
    #[serde(default = "default_current_utc_offset")]
    pub current_utc_offset: i16,
    #[serde(default)]
    pub pending_leap: bool,
    /// Day of the leap event, counted from the PTP epoch
    #[serde(default)]
    pub leap_date: u16,
    #[serde(default)]
    pub leap_type: LeapType,
}

impl LeapConfig {
    /// Time properties this clock announces as grandmaster
    pub fn time_properties(&self, time_source: TimeSource) -> TimePropertiesDS {
        let properties =
            TimePropertiesDS::new_ptp_time(self.current_utc_offset, true, false, false, time_source);
        if self.pending_leap {
            properties.with_leap(self.leap_date, self.leap_type)
        } else {
            properties
        }
    }
}

impl Default for LeapConfig {
    fn default() -> Self {
        Self {
            current_utc_offset: default_current_utc_offset(),
            pending_leap: false,
            leap_date: 0,
            leap_type: LeapType::default(),
        }
    }
}

fn default_current_utc_offset() -> i16 {
    37
}

#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub profile: PtpProfile,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub servo: ServoConfig,
    #[serde(default)]
    pub slave: SlaveConfig,
    #[serde(default)]
    pub leap: LeapConfig,
}

impl Config {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(file)?;
        Self::from_toml_str(&contents)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.servo.ap, 3);
        assert_eq!(config.slave.offset_fail, 3000);
        assert_eq!(config.filter.delay_filter, 6);
    }

    #[test]
    fn sections_parse() {
        let config = Config::from_toml_str(
            r#"
            log-level = "debug"
            profile = "ieee8021-as"

            [filter]
            delay-filter = 0
            period = 4
            dist = 1

            [servo]
            srv-option = "synce"
            i-reg = false
            ho-filter = 10

            [slave]
            two-way = false
            clock-settle-time = 4

            [leap]
            pending-leap = true
            leap-date = 20000
            leap-type = "leap59"
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.profile, PtpProfile::Ieee8021As);
        assert_eq!(config.filter.period, 4);
        assert_eq!(config.filter.dist, 1);
        assert_eq!(config.servo.srv_option, ServoOption::Synce);
        assert!(!config.servo.i_reg);
        assert!(config.servo.p_reg);
        assert_eq!(config.servo.ho_filter, 10);
        assert!(!config.slave.two_way);
        assert_eq!(config.slave.clock_settle_time, 4);
        assert_eq!(config.leap.leap_type, LeapType::Leap59);
        assert_eq!(config.leap.leap_date, 20000);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ServoConfig, _> = toml::from_str("kp = 3");
        assert!(result.is_err());

        // synce servos are tuned by their threshold only
        let result: Result<ServoConfig, _> = toml::from_str("synce-threshold = 500");
        assert_eq!(result.unwrap().synce_threshold, 500);
        let result: Result<ServoConfig, _> = toml::from_str("synce-ap = 2");
        assert!(result.is_err());

        assert!(matches!(
            Config::from_toml_str("[slave]\nstable-offset = -1"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn leap_config_schedules_leap() {
        let leap = LeapConfig {
            pending_leap: true,
            leap_date: 100,
            leap_type: LeapType::Leap59,
            ..Default::default()
        };
        let properties = leap.time_properties(TimeSource::Gnss);
        assert_eq!(properties.current_utc_offset, 37);
        assert!(properties.pending_leap);
        assert_eq!(properties.leap_date, 100);

        let properties = LeapConfig::default().time_properties(TimeSource::Gnss);
        assert!(!properties.pending_leap);
        assert!(properties.ptp_timescale);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/ptp-servo.toml"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn delay_variation_follows_option() {
        let mut filter = FilterConfig::default();
        assert_eq!(
            filter.max_delay_variation(),
            Some(TimeInterval::from_nanos(100_000))
        );
        filter.min_delay_option = false;
        assert_eq!(filter.max_delay_variation(), None);
    }
}
