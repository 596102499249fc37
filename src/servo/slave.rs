use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::Serialize;

use super::{apply, ClockState, ClockUpdateResult, Servo, ServoMode, ServoStats, ServoStatus};
use crate::{
    clock::{ClockControl, ClockDomain},
    config::SlaveConfig,
    datastructures::common::{TimeInterval, Timestamp},
    filters::FilterSample,
    servo::BasicServo,
    timer::{TimerId, TimerScheduler, TICKS_PER_SECOND},
};

/// Offsets from this size on are corrected by setting the time of day
const STEP_THRESHOLD: TimeInterval = TimeInterval::from_bits(400_000_000 << 16);
/// Largest step a software clock domain takes as a delta
const SOFTWARE_DELTA_LIMIT: TimeInterval = TimeInterval::from_bits(1_000_000_000 << 16);
/// Offsets above this are removed with a phase adjustment when free running
const FREE_RUN_PHASE_THRESHOLD: TimeInterval = TimeInterval::from_bits(100_000 << 16);
/// Offsets above this are removed with a phase adjustment when phase locking
const PHASE_LOCKING_THRESHOLD: TimeInterval = TimeInterval::from_bits(100_000 << 16);
/// Offsets above this are removed with a phase adjustment when frequency
/// locking
const FREQ_LOCKING_THRESHOLD: TimeInterval = TimeInterval::from_bits(1_000_000 << 16);
/// Largest single phase adjustment
const PHASE_ADJUST_LIMIT: TimeInterval = TimeInterval::from_bits(500_000_000 << 16);

/// Extremes and mean of one direction of path delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DelayStats {
    pub min: TimeInterval,
    pub max: TimeInterval,
    pub mean: TimeInterval,
    pub last: TimeInterval,
    pub count: u64,
    #[serde(skip)]
    sum: i128,
}

impl Default for DelayStats {
    fn default() -> Self {
        Self {
            min: TimeInterval::MAX,
            max: -TimeInterval::MAX,
            mean: TimeInterval::ZERO,
            last: TimeInterval::ZERO,
            count: 0,
            sum: 0,
        }
    }
}

impl DelayStats {
    fn record(&mut self, delay: TimeInterval) {
        self.min = self.min.min(delay);
        self.max = self.max.max(delay);
        self.last = delay;
        self.count += 1;
        self.sum += delay.to_bits() as i128;
        self.mean = TimeInterval::from_bits((self.sum / self.count as i128) as i64);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DelayStatistics {
    pub master_to_slave: DelayStats,
    pub slave_to_master: DelayStats,
}

/// One-shot timer guarding the settling states
#[derive(Debug)]
struct SettleTimer {
    timers: Arc<TimerScheduler>,
    id: TimerId,
    expired: Arc<AtomicBool>,
}

impl SettleTimer {
    fn new(timers: Arc<TimerScheduler>, domain: ClockDomain) -> Self {
        let expired = Arc::new(AtomicBool::new(false));
        let flag = expired.clone();
        let id = timers.init("slave_settle", domain.0, move |_, _| {
            flag.store(true, Ordering::Release);
        });
        Self {
            timers,
            id,
            expired,
        }
    }

    fn start(&self, seconds: u32) {
        self.expired.store(false, Ordering::Release);
        if let Err(error) = self
            .timers
            .start(self.id, seconds as u64 * TICKS_PER_SECOND, false)
        {
            tracing::error!(%error, "could not start settle timer");
        }
    }

    fn take_expired(&self) -> bool {
        self.expired.swap(false, Ordering::AcqRel)
    }
}

impl Drop for SettleTimer {
    fn drop(&mut self) {
        self.timers.remove(self.id);
    }
}

/// The servo of the Ethernet reference and, optionally, that of a virtual
/// reference such as a 1PPS input
#[derive(Debug)]
struct ServoPair<S> {
    ethernet: S,
    virtual_reference: Option<S>,
    virtual_active: bool,
}

impl<S> ServoPair<S> {
    fn active(&self) -> &S {
        match &self.virtual_reference {
            Some(servo) if self.virtual_active => servo,
            _ => &self.ethernet,
        }
    }

    fn active_mut(&mut self) -> &mut S {
        match &mut self.virtual_reference {
            Some(servo) if self.virtual_active => servo,
            _ => &mut self.ethernet,
        }
    }
}

/// Measurements and lock state of a slave, everything but the servos
#[derive(Debug)]
struct SlaveState {
    config: SlaveConfig,
    domain: ClockDomain,
    state: ClockState,
    prc_reference: bool,

    master_to_slave: TimeInterval,
    master_to_slave_valid: bool,
    slave_to_master: TimeInterval,
    mean_path_delay: TimeInterval,
    offset_from_master: TimeInterval,
    delay_ok: bool,
    observed_rate: i64,

    prev_psettling: bool,
    in_settling: bool,
    settle: SettleTimer,
    statistics: DelayStatistics,
}

impl SlaveState {
    fn set_state(&mut self, next: ClockState, reason: &'static str) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, reason, "clock state changed");
            self.state = next;
        }
    }

    fn enter_settling(&mut self, next: ClockState, reason: &'static str) {
        self.set_state(next, reason);
        self.settle.start(self.config.clock_settle_time);
        self.in_settling = true;
    }

    fn process_timers(&mut self) {
        if !self.settle.take_expired() {
            return;
        }

        match self.state {
            ClockState::FSettling => self.set_state(ClockState::FreeRun, "settling time expired"),
            ClockState::PSettling => {
                self.set_state(ClockState::PhaseLocking, "settling time expired");
                self.prev_psettling = true;
            }
            ClockState::FreqLockInit => {
                self.set_state(ClockState::FreqLocking, "settling time expired")
            }
            state => tracing::debug!(%state, "settle timeout in unexpected state"),
        }
        self.in_settling = false;
    }

    fn step_clock<C: ClockControl, S: Servo>(
        &mut self,
        clock: &C,
        servo: &mut S,
        send_time: Timestamp,
        correction: TimeInterval,
    ) {
        let offset = self.master_to_slave;
        if self.config.software_domain && offset.abs() <= SOFTWARE_DELTA_LIMIT {
            tracing::info!(%offset, "moving software clock");
            apply(
                clock.set_time_delta(
                    Timestamp::from_interval_abs(offset),
                    self.domain,
                    offset > TimeInterval::ZERO,
                ),
                "set time delta",
            );
        } else {
            let time = send_time.add_interval(correction);
            tracing::info!(%offset, %time, "setting time of day");
            apply(clock.set_time(time, self.domain), "set time");
        }

        servo.clock_servo_reset(clock, self.domain);
        servo.offset_filter_reset();
        self.master_to_slave = TimeInterval::ZERO;
        self.master_to_slave_valid = false;
        self.enter_settling(ClockState::FSettling, "set time of day");
    }

    fn adjust_phase<C: ClockControl, S: Servo>(
        &mut self,
        clock: &C,
        servo: &mut S,
        offset: TimeInterval,
        next: ClockState,
    ) -> TimeInterval {
        let offset = offset.clamp_abs(PHASE_ADJUST_LIMIT);
        tracing::debug!(%offset, mean_path_delay = %self.mean_path_delay, "adjusting phase");
        apply(clock.adjust_phase(offset, self.domain), "adjust phase");
        self.master_to_slave_valid = false;
        servo.offset_filter_reset();
        servo.stable_offset_clear();
        self.enter_settling(next, "adjust time of day");
        offset
    }

    fn delay_calc<S: Servo>(
        &mut self,
        servo: &mut S,
        send_time: Timestamp,
        receive_time: Timestamp,
        correction: TimeInterval,
        log_interval: i8,
    ) -> bool {
        self.slave_to_master = receive_time.diff(send_time).saturating_sub(correction);
        if self.config.statistics {
            self.statistics.slave_to_master.record(self.slave_to_master);
        }
        tracing::debug!(
            slave_to_master = %self.slave_to_master,
            master_to_slave = %self.master_to_slave,
            %correction,
            "delay measurement"
        );

        if self.state.measures_delay() && self.master_to_slave_valid {
            let sum = self.master_to_slave.to_bits() as i128 + self.slave_to_master.to_bits() as i128;
            self.mean_path_delay = TimeInterval::from_bits((sum / 2) as i64);
            if self.mean_path_delay.is_negative() {
                tracing::debug!(mean_path_delay = %self.mean_path_delay, "negative path delay");
            }

            match servo.delay_filter(self.mean_path_delay, log_interval) {
                Some(filtered) => {
                    self.delay_ok = true;
                    self.mean_path_delay = filtered;
                }
                None => {
                    tracing::debug!("delay too big for filtering");
                    self.delay_ok = false;
                }
            }
        } else {
            tracing::debug!(state = %self.state, "not ready for delay measurements");
            self.delay_ok = false;
            self.mean_path_delay = TimeInterval::ZERO;
            servo.delay_filter_reset();
        }

        self.delay_ok
    }

    fn offset_calc<C: ClockControl, S: Servo>(
        &mut self,
        clock: &C,
        servo: &mut S,
        send_time: Timestamp,
        receive_time: Timestamp,
        correction: TimeInterval,
        log_interval: i8,
    ) -> ClockUpdateResult {
        let domain = self.domain;
        let two_way = self.config.two_way;
        let prc_locked = self.prc_reference
            && matches!(
                self.state,
                ClockState::FreqLocked | ClockState::PhaseLocked | ClockState::Recovering
            );
        let master_to_slave = receive_time.diff(send_time).saturating_sub(correction);

        let mut result = ClockUpdateResult::Ignore;
        let mut filtered = None;
        let mut adj = 0;

        if self.state.is_settling() {
            tracing::debug!(state = %self.state, %master_to_slave, "settling, offset ignored");
        } else if master_to_slave.abs() >= STEP_THRESHOLD {
            self.master_to_slave = master_to_slave;
            self.step_clock(clock, servo, send_time, correction);
            result = ClockUpdateResult::Unlocked;
        } else {
            self.master_to_slave = master_to_slave;
            self.master_to_slave_valid = true;
            tracing::debug!(%master_to_slave, %correction, "sync measurement");

            let sample = FilterSample {
                value: master_to_slave.saturating_sub(self.mean_path_delay),
                receive_time,
            };

            if self.state == ClockState::FreeRun {
                if sample.value.abs() > FREE_RUN_PHASE_THRESHOLD {
                    self.offset_from_master =
                        self.adjust_phase(clock, servo, sample.value, ClockState::FreqLockInit);
                    result = ClockUpdateResult::Unlocked;
                } else {
                    self.set_state(ClockState::FreqLocking, "offset within limits");
                }
            }

            let mut stable = false;
            if matches!(
                self.state,
                ClockState::FreqLocking
                    | ClockState::PhaseLocking
                    | ClockState::FreqLocked
                    | ClockState::PhaseLocked
            ) {
                stable = servo.stable_offset_calc(sample.value, self.offset_from_master);
                filtered = servo.offset_filter(sample, log_interval);
                if let Some(filtered) = filtered {
                    self.offset_from_master = filtered.value;
                }
                tracing::debug!(
                    stable,
                    offset = %sample.value,
                    offset_from_master = %self.offset_from_master,
                    "offset filtered"
                );
            }

            match self.state {
                ClockState::PhaseLocking | ClockState::Recovering => {
                    if self.delay_ok || !two_way {
                        self.set_state(ClockState::PhaseLocking, "delay measurement done");
                        if let Some(filtered) = filtered {
                            if filtered.value.abs() > PHASE_LOCKING_THRESHOLD {
                                if self.prev_psettling {
                                    servo.clock_servo_reset(clock, domain);
                                    self.set_state(
                                        ClockState::FreeRun,
                                        "offset not removed by phase adjustment",
                                    );
                                } else {
                                    self.adjust_phase(
                                        clock,
                                        servo,
                                        filtered.value,
                                        ClockState::PSettling,
                                    );
                                }
                                self.prev_psettling = false;
                                result = ClockUpdateResult::Unlocked;
                            } else {
                                self.prev_psettling = false;
                                adj = servo.clock_servo(
                                    clock,
                                    domain,
                                    filtered,
                                    ServoMode::PhaseLocking,
                                    prc_locked,
                                );
                                if stable && servo.offset_ok(self.offset_from_master, two_way) {
                                    let locked = if two_way {
                                        ClockState::PhaseLocked
                                    } else {
                                        ClockState::FreqLocked
                                    };
                                    self.set_state(locked, "offset stable");
                                    result = ClockUpdateResult::Locked;
                                }
                            }
                        }
                    }
                }
                ClockState::FreqLocking => {
                    if let Some(filtered) = filtered {
                        if filtered.value.abs() > FREQ_LOCKING_THRESHOLD {
                            self.adjust_phase(clock, servo, filtered.value, ClockState::FSettling);
                            result = ClockUpdateResult::Unlocked;
                        } else {
                            adj = servo.clock_servo(
                                clock,
                                domain,
                                filtered,
                                ServoMode::FrequencyLocking,
                                prc_locked,
                            );
                            if stable {
                                self.set_state(ClockState::PhaseLocking, "frequency stable");
                                servo.stable_offset_clear();
                            }
                        }
                    }
                }
                ClockState::FreqLocked | ClockState::PhaseLocked => {
                    if self.delay_ok || !two_way {
                        if let Some(filtered) = filtered {
                            adj = servo.clock_servo(
                                clock,
                                domain,
                                filtered,
                                ServoMode::Locked,
                                prc_locked,
                            );
                            result = ClockUpdateResult::Locked;
                            if !stable || !servo.offset_ok(self.offset_from_master, two_way) {
                                self.set_state(ClockState::PhaseLocking, "offset unstable");
                                servo.stable_offset_clear();
                            } else if two_way && self.state == ClockState::FreqLocked {
                                self.set_state(ClockState::PhaseLocking, "delay available");
                                servo.stable_offset_clear();
                            }
                        }
                    } else {
                        self.set_state(ClockState::PhaseLocking, "no delay measurement");
                        servo.stable_offset_clear();
                        result = ClockUpdateResult::Unlocked;
                    }
                }
                _ => {}
            }
        }

        if self.config.statistics {
            self.statistics.master_to_slave.record(master_to_slave);
        }
        if filtered.is_some() {
            self.observed_rate = servo.observed_phase_change_rate();
            servo.display_stats(self.mean_path_delay, self.offset_from_master, adj);
        }

        result
    }
}

/// Drives a local clock from the timestamps of a master.
///
/// Sync and follow-up timestamps go to [`SlaveClock::offset_calc`], delay
/// request and response timestamps to [`SlaveClock::delay_calc`]. The slave
/// steps the clock for large offsets and waits for a settle timer on the
/// given [`TimerScheduler`] before trusting measurements again, so the
/// scheduler must be ticked for the slave to make progress.
#[derive(Debug)]
pub struct SlaveClock<C: ClockControl, S: Servo = BasicServo> {
    clock: C,
    servos: ServoPair<S>,
    slave: SlaveState,
}

impl<C: ClockControl, S: Servo> SlaveClock<C, S> {
    pub fn new(
        clock: C,
        domain: ClockDomain,
        config: SlaveConfig,
        servo_config: S::Config,
        timers: Arc<TimerScheduler>,
    ) -> Self {
        Self {
            clock,
            servos: ServoPair {
                ethernet: S::new(servo_config),
                virtual_reference: None,
                virtual_active: false,
            },
            slave: SlaveState {
                config,
                domain,
                state: ClockState::FreeRun,
                prc_reference: false,
                master_to_slave: TimeInterval::ZERO,
                master_to_slave_valid: false,
                slave_to_master: TimeInterval::ZERO,
                mean_path_delay: TimeInterval::ZERO,
                offset_from_master: TimeInterval::ZERO,
                delay_ok: false,
                observed_rate: 0,
                prev_psettling: false,
                in_settling: false,
                settle: SettleTimer::new(timers, domain),
                statistics: DelayStatistics::default(),
            },
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn state(&self) -> ClockState {
        self.slave.state
    }

    pub fn in_settling_period(&self) -> bool {
        self.slave.in_settling
    }

    pub fn offset_from_master(&self) -> TimeInterval {
        self.slave.offset_from_master
    }

    pub fn mean_path_delay(&self) -> TimeInterval {
        self.slave.mean_path_delay
    }

    /// Parent phase change rate seen by the active servo, in ppb
    pub fn observed_phase_change_rate(&self) -> i64 {
        self.slave.observed_rate
    }

    /// Tell the servo whether the frequency reference is a primary reference
    /// clock. A PRC locked servo keeps no holdover average and uses a
    /// stronger derivative term.
    pub fn set_prc_reference(&mut self, prc: bool) {
        self.slave.prc_reference = prc;
    }

    /// Apply expired settle timers. Called at the start of every
    /// measurement, and may be called from the timer loop to make the state
    /// visible earlier.
    pub fn process_timers(&mut self) {
        self.slave.process_timers();
    }

    /// Process the timestamps of a sync message: `send_time` is the origin
    /// timestamp of the master, `receive_time` the local receive timestamp.
    pub fn offset_calc(
        &mut self,
        send_time: Timestamp,
        receive_time: Timestamp,
        correction: TimeInterval,
        log_interval: i8,
    ) -> ClockUpdateResult {
        if !send_time.is_valid() || !receive_time.is_valid() {
            tracing::debug!(%send_time, %receive_time, "malformed sync timestamps dropped");
            return ClockUpdateResult::Ignore;
        }

        self.slave.process_timers();
        let servo = self.servos.active_mut();
        self.slave.offset_calc(
            &self.clock,
            servo,
            send_time,
            receive_time,
            correction,
            log_interval,
        )
    }

    /// Process the timestamps of a delay request: `send_time` is the local
    /// transmit timestamp, `receive_time` the master's receive timestamp.
    /// Returns whether a usable path delay is available.
    pub fn delay_calc(
        &mut self,
        send_time: Timestamp,
        receive_time: Timestamp,
        correction: TimeInterval,
        log_interval: i8,
    ) -> bool {
        if !send_time.is_valid() || !receive_time.is_valid() {
            tracing::debug!(%send_time, %receive_time, "malformed delay timestamps dropped");
            return false;
        }

        self.slave.process_timers();
        // the path delay is only measured on the Ethernet reference
        self.slave.delay_calc(
            &mut self.servos.ethernet,
            send_time,
            receive_time,
            correction,
            log_interval,
        )
    }

    /// Add a servo for a virtual reference. It starts out inactive.
    pub fn create_virtual_reference(&mut self, config: S::Config) {
        if self.servos.virtual_reference.is_none() {
            tracing::debug!("virtual reference servo created");
            self.servos.virtual_reference = Some(S::new(config));
        }
    }

    pub fn remove_virtual_reference(&mut self) {
        if self.servos.virtual_reference.take().is_some() {
            tracing::debug!("virtual reference servo removed");
        }
        self.servos.virtual_active = false;
    }

    /// Select the servo in control. Without a virtual reference servo the
    /// Ethernet servo stays in control.
    pub fn switch_reference(&mut self, virtual_reference: bool) {
        if virtual_reference && self.servos.virtual_reference.is_none() {
            tracing::warn!("no virtual reference servo to switch to");
            return;
        }
        if self.servos.virtual_active != virtual_reference {
            self.servos.virtual_active = virtual_reference;
            tracing::info!(virtual_reference, "switched reference servo");
        }
    }

    pub fn virtual_reference_active(&self) -> bool {
        self.servos.virtual_active
    }

    /// Feed timestamps of the reference that is not in control to its servo,
    /// so that it can take over without a jump in the adjustment.
    ///
    /// `virtual_port` tells which reference the timestamps belong to. They
    /// are ignored if that reference is the active one or has no servo.
    pub fn process_alternate_timestamp(
        &mut self,
        send_time: Timestamp,
        receive_time: Timestamp,
        correction: TimeInterval,
        path_delay: TimeInterval,
        virtual_port: bool,
    ) {
        let ServoPair {
            ethernet,
            virtual_reference,
            virtual_active,
        } = &mut self.servos;
        let Some(virtual_servo) = virtual_reference.as_mut() else {
            return;
        };
        let (active, target) = match (*virtual_active, virtual_port) {
            (true, false) => (&*virtual_servo, ethernet),
            (false, true) => (&*ethernet, virtual_servo),
            _ => return,
        };

        let offset = receive_time
            .diff(send_time)
            .saturating_sub(correction)
            .saturating_sub(path_delay);
        tracing::debug!(%offset, %path_delay, virtual_port, "alternate servo timestamp");
        target.track_alternate(offset, receive_time, active.output());
    }

    pub fn ethernet_servo(&self) -> &S {
        &self.servos.ethernet
    }

    pub fn virtual_servo(&self) -> Option<&S> {
        self.servos.virtual_reference.as_ref()
    }

    pub fn status(&self) -> ServoStatus {
        ServoStatus {
            clock_state: self.slave.state,
            offset_from_master: self.slave.offset_from_master,
            mean_path_delay: self.slave.mean_path_delay,
            delay_ok: self.slave.delay_ok,
            virtual_reference: self.servos.virtual_active,
            holdover: self.servos.active().clock_servo_status(),
        }
    }

    /// PID terms of the servo in control
    pub fn servo_stats(&self) -> ServoStats {
        self.servos.active().display_parm()
    }

    /// Handle a sync timeout of the master.
    ///
    /// A locked clock with a valid holdover frequency goes to
    /// [`ClockState::Recovering`] and keeps running on that frequency. Any
    /// other clock, except one that is already recovering, goes back to free
    /// run.
    pub fn master_lost(&mut self) {
        let servo = self.servos.active_mut();
        let holdover_ok = servo.clock_servo_status().holdover_ok;
        let locked = matches!(
            self.slave.state,
            ClockState::FreqLocked | ClockState::PhaseLocked
        );

        if locked && holdover_ok {
            self.slave.set_state(ClockState::Recovering, "sync timeout");
        } else if self.slave.state != ClockState::Recovering {
            self.slave.set_state(ClockState::FreeRun, "sync timeout");
        }
        servo.clock_servo_reset(&self.clock, self.slave.domain);
    }

    /// Drop the servo output, applying the holdover frequency if available.
    /// The lock state is left alone, see [`SlaveClock::master_lost`].
    pub fn clock_servo_reset(&mut self) {
        let servo = self.servos.active_mut();
        servo.clock_servo_reset(&self.clock, self.slave.domain);
    }

    pub fn statistics(&self) -> &DelayStatistics {
        &self.slave.statistics
    }

    pub fn clear_statistics(&mut self) {
        self.slave.statistics = DelayStatistics::default();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;
    use crate::{
        config::{FilterConfig, ServoConfig},
        datastructures::datasets::PtpProfile,
        servo::{basic::tests::TestClock, BasicServoConfig},
    };

    struct Harness {
        slave: SlaveClock<TestClock>,
        timers: Arc<TimerScheduler>,
        now: Arc<AtomicU64>,
    }

    impl Harness {
        fn new(config: SlaveConfig) -> Self {
            Self::with_servo(config, ServoConfig::default())
        }

        fn with_servo(config: SlaveConfig, servo: ServoConfig) -> Self {
            let now = Arc::new(AtomicU64::new(0));
            let source = now.clone();
            let timers = Arc::new(TimerScheduler::with_time_source(move || {
                source.load(Ordering::SeqCst)
            }));
            let servo = BasicServoConfig {
                filter: FilterConfig::for_profile(PtpProfile::Ieee8021As),
                servo,
                slave: config,
            };
            let slave = SlaveClock::new(
                TestClock::default(),
                ClockDomain(0),
                config,
                servo,
                timers.clone(),
            );
            Self { slave, timers, now }
        }

        /// Sync with the local clock `offset_ns` ahead of the master
        fn sync(&mut self, seconds: u64, offset_ns: u32) -> ClockUpdateResult {
            self.slave.offset_calc(
                Timestamp::new(seconds, 0),
                Timestamp::new(seconds, offset_ns),
                TimeInterval::ZERO,
                0,
            )
        }

        fn delay(&mut self, seconds: u64, delay_ns: u32) -> bool {
            self.slave.delay_calc(
                Timestamp::new(seconds, 0),
                Timestamp::new(seconds, delay_ns),
                TimeInterval::ZERO,
                0,
            )
        }

        fn advance(&self, us: u64) {
            let now = self.now.fetch_add(us, Ordering::SeqCst) + us;
            self.timers.tick(now);
        }
    }

    fn ns(n: i64) -> TimeInterval {
        TimeInterval::from_nanos(n)
    }

    fn quick_config() -> SlaveConfig {
        SlaveConfig {
            stable_count: 2,
            unstable_count: 2,
            ..Default::default()
        }
    }

    #[test]
    fn offset_below_step_threshold_is_not_stepped() {
        let mut harness = Harness::new(SlaveConfig::default());

        let result = harness.sync(100, 399_999_999);

        assert_eq!(result, ClockUpdateResult::Unlocked);
        assert_eq!(harness.slave.state(), ClockState::FreqLockInit);
        assert_eq!(*harness.slave.clock().set_time.borrow(), None);
        assert_eq!(*harness.slave.clock().phase.borrow(), vec![ns(399_999_999)]);
        assert!(harness.slave.in_settling_period());
    }

    #[test]
    fn offset_at_step_threshold_sets_time() {
        let mut harness = Harness::new(SlaveConfig::default());

        let result = harness.sync(100, 400_000_000);

        assert_eq!(result, ClockUpdateResult::Unlocked);
        assert_eq!(harness.slave.state(), ClockState::FSettling);
        assert_eq!(
            *harness.slave.clock().set_time.borrow(),
            Some(Timestamp::new(100, 0))
        );
        assert!(harness.slave.clock().phase.borrow().is_empty());
        assert_eq!(*harness.slave.clock().frequency.borrow(), vec![0]);
        assert!(harness.slave.in_settling_period());
    }

    #[test]
    fn software_domain_steps_by_delta() {
        let mut harness = Harness::new(SlaveConfig {
            software_domain: true,
            ..Default::default()
        });

        harness.sync(100, 600_000_000);
        assert_eq!(
            *harness.slave.clock().set_delta.borrow(),
            Some((Timestamp::new(0, 600_000_000), true))
        );
        assert_eq!(*harness.slave.clock().set_time.borrow(), None);
    }

    #[test]
    fn settle_timer_ends_settling() {
        let mut harness = Harness::new(SlaveConfig::default());
        harness.sync(100, 500_000_000);
        assert_eq!(harness.slave.state(), ClockState::FSettling);

        // measurements are ignored while settling
        assert_eq!(harness.sync(101, 50), ClockUpdateResult::Ignore);
        assert_eq!(harness.slave.state(), ClockState::FSettling);

        harness.advance(1_999_000);
        harness.slave.process_timers();
        assert_eq!(harness.slave.state(), ClockState::FSettling);

        harness.advance(1_000);
        harness.slave.process_timers();
        assert_eq!(harness.slave.state(), ClockState::FreeRun);
        assert!(!harness.slave.in_settling_period());

        assert_eq!(harness.sync(103, 50), ClockUpdateResult::Ignore);
        assert_eq!(harness.slave.state(), ClockState::FreqLocking);
    }

    #[test]
    fn two_way_slave_locks_phase() {
        let mut harness = Harness::new(quick_config());

        assert_eq!(harness.sync(1, 100), ClockUpdateResult::Ignore);
        assert_eq!(harness.slave.state(), ClockState::FreqLocking);

        harness.sync(2, 100);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);

        // no path delay yet, a two way slave waits
        assert_eq!(harness.sync(3, 100), ClockUpdateResult::Ignore);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);

        assert!(harness.delay(3, 100));
        assert_eq!(harness.slave.mean_path_delay(), ns(100));

        assert_eq!(harness.sync(4, 100), ClockUpdateResult::Locked);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocked);
        assert_eq!(harness.slave.offset_from_master(), ns(0));

        assert_eq!(harness.sync(5, 100), ClockUpdateResult::Locked);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocked);
    }

    /// Bring a two way slave into phase lock with a 100ns path delay
    fn lock_phase(harness: &mut Harness) {
        harness.sync(1, 100);
        harness.sync(2, 100);
        harness.sync(3, 100);
        assert!(harness.delay(3, 100));
        assert_eq!(harness.sync(4, 100), ClockUpdateResult::Locked);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocked);
    }

    #[test]
    fn master_lost_with_holdover_recovers() {
        let mut harness = Harness::with_servo(
            quick_config(),
            ServoConfig {
                ho_filter: 1,
                ..Default::default()
            },
        );
        lock_phase(&mut harness);
        harness.sync(5, 100);
        harness.sync(6, 100);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocked);
        assert!(harness.slave.status().holdover.holdover_ok);

        harness.slave.clock().frequency.borrow_mut().clear();
        harness.slave.master_lost();
        assert_eq!(harness.slave.state(), ClockState::Recovering);
        assert_eq!(*harness.slave.clock().frequency.borrow(), vec![0]);
        assert_eq!(harness.slave.status().clock_state, ClockState::Recovering);

        // further timeouts keep recovering
        harness.slave.master_lost();
        assert_eq!(harness.slave.state(), ClockState::Recovering);

        // the next sync with a known path delay resumes phase locking
        assert_eq!(harness.sync(7, 100), ClockUpdateResult::Ignore);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);
    }

    #[test]
    fn master_lost_without_holdover_free_runs() {
        let mut harness = Harness::new(quick_config());
        lock_phase(&mut harness);
        assert!(!harness.slave.status().holdover.holdover_ok);

        harness.slave.clock().frequency.borrow_mut().clear();
        harness.slave.master_lost();
        assert_eq!(harness.slave.state(), ClockState::FreeRun);
        assert_eq!(*harness.slave.clock().frequency.borrow(), vec![0]);
    }

    #[test]
    fn one_way_slave_locks_frequency() {
        let mut harness = Harness::new(SlaveConfig {
            two_way: false,
            ..quick_config()
        });

        harness.sync(1, 0);
        harness.sync(2, 0);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);

        assert_eq!(harness.sync(3, 0), ClockUpdateResult::Ignore);
        assert_eq!(harness.sync(4, 0), ClockUpdateResult::Locked);
        assert_eq!(harness.slave.state(), ClockState::FreqLocked);
    }

    #[test]
    fn delay_is_not_measured_before_locking() {
        let mut harness = Harness::new(SlaveConfig::default());
        assert!(!harness.delay(1, 100));
        assert_eq!(harness.slave.mean_path_delay(), TimeInterval::ZERO);
    }

    #[test]
    fn repeated_large_phase_offset_returns_to_free_run() {
        let mut harness = Harness::new(SlaveConfig {
            two_way: false,
            ..quick_config()
        });
        harness.sync(1, 0);
        harness.sync(2, 0);
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);

        assert_eq!(harness.sync(3, 200_000), ClockUpdateResult::Unlocked);
        assert_eq!(harness.slave.state(), ClockState::PSettling);
        assert_eq!(*harness.slave.clock().phase.borrow(), vec![ns(200_000)]);

        harness.advance(2_000_000);
        harness.slave.process_timers();
        assert_eq!(harness.slave.state(), ClockState::PhaseLocking);

        // the phase adjustment did not help
        assert_eq!(harness.sync(5, 200_000), ClockUpdateResult::Unlocked);
        assert_eq!(harness.slave.state(), ClockState::FreeRun);
        assert_eq!(harness.slave.clock().phase.borrow().len(), 1);
    }

    #[test]
    fn malformed_timestamps_are_dropped() {
        let mut harness = Harness::new(SlaveConfig::default());
        let bad = Timestamp {
            seconds: 10,
            nanos: 1_000_000_000,
            nanos_frac: 0,
        };

        let result = harness
            .slave
            .offset_calc(bad, Timestamp::new(10, 0), TimeInterval::ZERO, 0);
        assert_eq!(result, ClockUpdateResult::Ignore);
        assert!(!harness
            .slave
            .delay_calc(Timestamp::new(10, 0), bad, TimeInterval::ZERO, 0));

        assert_eq!(harness.slave.state(), ClockState::FreeRun);
        assert!(harness.slave.clock().frequency.borrow().is_empty());
        assert!(harness.slave.clock().phase.borrow().is_empty());
    }

    #[test]
    fn alternate_timestamps_feed_inactive_servo() {
        let mut harness = Harness::new(SlaveConfig::default());
        harness
            .slave
            .create_virtual_reference(BasicServoConfig::virtual_reference(ServoConfig::default()));
        harness.slave.switch_reference(true);
        assert!(harness.slave.status().virtual_reference);

        // timestamps of the active reference are not alternate
        harness.slave.process_alternate_timestamp(
            Timestamp::new(1, 0),
            Timestamp::new(1, 900),
            TimeInterval::ZERO,
            ns(0),
            true,
        );
        assert_eq!(harness.slave.ethernet_servo().display_parm().prop, 0);

        harness.slave.process_alternate_timestamp(
            Timestamp::new(1, 0),
            Timestamp::new(1, 900),
            ns(100),
            ns(200),
            false,
        );
        // (900 - 100 - 200) / ap 3
        assert_eq!(harness.slave.ethernet_servo().display_parm().prop, 200 << 16);

        harness.slave.remove_virtual_reference();
        assert!(!harness.slave.virtual_reference_active());
        assert!(harness.slave.virtual_servo().is_none());
    }

    #[test]
    fn switching_without_virtual_servo_keeps_ethernet() {
        let mut harness = Harness::new(SlaveConfig::default());
        harness.slave.switch_reference(true);
        assert!(!harness.slave.virtual_reference_active());
    }

    #[test]
    fn delay_statistics_are_collected() {
        let mut harness = Harness::new(SlaveConfig {
            statistics: true,
            ..Default::default()
        });

        harness.sync(1, 300);
        harness.delay(1, 100);
        harness.delay(2, 500);

        let statistics = harness.slave.statistics();
        assert_eq!(statistics.master_to_slave.last, ns(300));
        assert_eq!(statistics.master_to_slave.count, 1);
        assert_eq!(statistics.slave_to_master.min, ns(100));
        assert_eq!(statistics.slave_to_master.max, ns(500));
        assert_eq!(statistics.slave_to_master.mean, ns(300));

        harness.slave.clear_statistics();
        assert_eq!(harness.slave.statistics().slave_to_master.count, 0);
    }

    #[test]
    fn status_serializes() {
        let harness = Harness::new(SlaveConfig::default());
        let json = serde_json::to_value(harness.slave.status()).unwrap();
        assert_eq!(json["clock_state"], "free-run");
        assert_eq!(json["holdover_ok"], false);
    }

    #[test]
    fn dropping_the_slave_removes_its_timer() {
        let harness = Harness::new(SlaveConfig::default());
        assert_eq!(harness.timers.dump().len(), 1);
        let timers = harness.timers.clone();
        drop(harness);
        assert!(timers.dump().is_empty());
    }
}
