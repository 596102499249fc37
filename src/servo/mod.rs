//! Turns timestamp pairs into corrections of the local clock

mod basic;
mod slave;

pub use basic::{BasicServo, BasicServoConfig, ServoStats};
pub use slave::{DelayStatistics, SlaveClock};

use serde::Serialize;

use crate::{
    clock::{ClockControl, ClockDomain},
    datastructures::common::TimeInterval,
    filters::FilterSample,
};

/// Log a failed clock operation. The servo carries on with the next sample.
fn apply<E: std::error::Error>(result: Result<(), E>, action: &'static str) {
    if let Err(error) = result {
        tracing::error!(error = %error, action, "could not steer clock");
    }
}

/// Lock state of a slave clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockState {
    #[default]
    FreeRun,
    /// Waiting for a phase adjustment made from free run to settle
    FreqLockInit,
    /// Waiting for a time step to settle
    FSettling,
    FreqLocking,
    FreqLocked,
    PhaseLocking,
    /// Waiting for a phase adjustment made while phase locking to settle
    PSettling,
    PhaseLocked,
    Recovering,
}

impl ClockState {
    /// States in which incoming measurements are not used
    pub fn is_settling(self) -> bool {
        matches!(
            self,
            ClockState::FSettling | ClockState::PSettling | ClockState::FreqLockInit
        )
    }

    /// States in which path delay measurements are used
    pub fn measures_delay(self) -> bool {
        matches!(
            self,
            ClockState::FreqLocked
                | ClockState::PhaseLocked
                | ClockState::PhaseLocking
                | ClockState::FreqLocking
                | ClockState::Recovering
        )
    }
}

impl core::fmt::Display for ClockState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            ClockState::FreeRun => "FREERUN",
            ClockState::FreqLockInit => "FREQ_LOCK_INIT",
            ClockState::FSettling => "F_SETTLING",
            ClockState::FreqLocking => "FREQ_LOCKING",
            ClockState::FreqLocked => "FREQ_LOCKED",
            ClockState::PhaseLocking => "PHASE_LOCKING",
            ClockState::PSettling => "P_SETTLING",
            ClockState::PhaseLocked => "PHASE_LOCKED",
            ClockState::Recovering => "RECOVERING",
        };
        f.write_str(name)
    }
}

/// Outcome of feeding one offset measurement to a [`SlaveClock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUpdateResult {
    /// No adjustment was made, e.g. while waiting for a delay measurement
    Ignore,
    /// The clock was set or its phase adjusted, or a lock was lost
    Unlocked,
    /// The clock was adjusted while locked
    Locked,
}

/// Which parts of the PID controller are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServoMode {
    /// Proportional only, while locking the frequency
    FrequencyLocking,
    /// Full PID while locking the phase
    PhaseLocking,
    /// Full PID, also tracking the holdover frequency
    Locked,
}

/// Holdover readiness of a servo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HoldoverStatus {
    pub holdover_ok: bool,
    /// Frequency adjustment that would be applied in holdover, in parts per
    /// trillion
    pub holdover_adj: i64,
}

/// Snapshot of a slave clock for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServoStatus {
    pub clock_state: ClockState,
    pub offset_from_master: TimeInterval,
    pub mean_path_delay: TimeInterval,
    pub delay_ok: bool,
    pub virtual_reference: bool,
    #[serde(flatten)]
    pub holdover: HoldoverStatus,
}

/// A filter and PID controller pair driven by a [`SlaveClock`].
///
/// A slave owns one servo per reference and switches between them; the
/// inactive one is kept in step through [`Servo::track_alternate`].
pub trait Servo {
    type Config;

    fn new(config: Self::Config) -> Self;

    /// Filter a mean path delay. `None` means the delay cannot be used.
    fn delay_filter(&mut self, delay: TimeInterval, log_interval: i8) -> Option<TimeInterval>;
    fn delay_filter_reset(&mut self);

    /// Filter an offset. `None` means no value is available yet.
    fn offset_filter(&mut self, sample: FilterSample, log_interval: i8) -> Option<FilterSample>;
    fn offset_filter_reset(&mut self);

    /// Track whether consecutive offsets stay close to `current`
    fn stable_offset_calc(&mut self, offset: TimeInterval, current: TimeInterval) -> bool;
    fn stable_offset_clear(&mut self);

    /// Whether `offset` is small enough to be locked
    fn offset_ok(&mut self, offset: TimeInterval, two_way: bool) -> bool;

    /// Run the PID controller on a filtered offset and apply the result.
    /// Returns the adjustment in ppb scaled by 2^16.
    fn clock_servo<C: ClockControl>(
        &mut self,
        clock: &C,
        domain: ClockDomain,
        sample: FilterSample,
        mode: ServoMode,
        prc_locked: bool,
    ) -> i64;

    /// Drop the controller output, falling back to the holdover frequency if
    /// one is known
    fn clock_servo_reset<C: ClockControl>(&mut self, clock: &C, domain: ClockDomain);

    fn clock_servo_status(&self) -> HoldoverStatus;

    /// Rate of change of the parent clock phase as seen by the integral term
    fn observed_phase_change_rate(&self) -> i64;

    /// Current controller output before gain
    fn output(&self) -> i64;

    /// Align this servo's state with a measurement of its reference while
    /// another servo is in control, so that it takes over without a jump
    fn track_alternate(
        &mut self,
        offset: TimeInterval,
        receive_time: crate::datastructures::common::Timestamp,
        active_output: i64,
    );

    fn display_stats(&self, mean_path_delay: TimeInterval, offset: TimeInterval, adj: i64);
    fn display_parm(&self) -> ServoStats;
}
