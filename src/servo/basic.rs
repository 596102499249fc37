use serde::Serialize;

use super::{apply, HoldoverStatus, Servo, ServoMode};
use crate::{
    clock::{scaled_ppb_to_ppt, ClockControl, ClockDomain},
    config::{FilterConfig, ServoConfig, ServoOption, SlaveConfig},
    datastructures::{
        common::{TimeInterval, Timestamp},
        datasets::PtpProfile,
    },
    filters::{
        bandwidth_from_period, smoothing_factor, FilterSample, LowpassFilter, Smoothing,
        WindowStats, WindowedFilter,
    },
};

/// Largest frequency adjustment, in ppb scaled by 2^16
const ADJ_FREQ_MAX: i64 = 512_000 << 16;
const NANOS_PER_SECOND: i64 = 1_000_000_000;
const MICROS_PER_SECOND: i128 = 1_000_000;
/// Scale of the holdover average relative to the adjustment
const HOLDOVER_SCALE: i128 = 100_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BasicServoConfig {
    pub filter: FilterConfig,
    pub servo: ServoConfig,
    pub slave: SlaveConfig,
}

impl BasicServoConfig {
    /// Servo following a virtual reference such as a 1PPS input, which
    /// filters like an 802.1AS slave
    pub fn virtual_reference(servo: ServoConfig) -> Self {
        Self {
            filter: FilterConfig::for_profile(PtpProfile::Ieee8021As),
            servo,
            slave: SlaveConfig::default(),
        }
    }
}

/// PID terms and filtered offsets of a [`BasicServo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServoStats {
    pub prop: i64,
    pub integral: i64,
    pub diff: i64,
    pub offset: WindowStats,
    /// Time between the last two offsets, in microseconds
    pub delta_t: i64,
}

fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// A PID servo behind a windowed or lowpass filter.
///
/// All PID terms are in ppb scaled by 2^16, which for an offset measured once
/// a second is the same scale as the offset itself in 2^-16 ns.
#[derive(Debug, Clone)]
pub struct BasicServo {
    config: BasicServoConfig,

    delay_window: WindowedFilter,
    delay_lowpass: LowpassFilter,
    offset_window: WindowedFilter,
    offset_lowpass: LowpassFilter,

    stable_count: u32,
    unstable_count: u32,
    stable: bool,
    offset_ok: bool,

    prop: i64,
    integral: i64,
    diff: i64,
    prev_offset: i64,
    prev_offset_valid: bool,
    prev_receive_time: Option<Timestamp>,
    delta_t: i64,
    adj_old: i64,
    freq_off_filtered: i64,
    observed_rate: i64,

    adj_avefix: i128,
    adj_average: i64,
    adj_stable: bool,
    holdover_count: u32,
    holdover_ok: bool,
}

impl BasicServo {
    pub fn config(&self) -> &BasicServoConfig {
        &self.config
    }

    fn pid_reset(&mut self) {
        self.prev_offset = 0;
        self.prev_offset_valid = false;
        self.integral = 0;
        self.prev_receive_time = None;
        self.prop = 0;
        self.diff = 0;
        self.delta_t = 0;
    }
}

impl Servo for BasicServo {
    type Config = BasicServoConfig;

    fn new(config: BasicServoConfig) -> Self {
        let filter = config.filter;
        Self {
            config,
            delay_window: WindowedFilter::new(filter.period, filter.dist),
            delay_lowpass: LowpassFilter::new("delay"),
            offset_window: WindowedFilter::new(filter.period, filter.dist),
            offset_lowpass: LowpassFilter::new("offset"),
            stable_count: 0,
            unstable_count: 0,
            stable: false,
            offset_ok: false,
            prop: 0,
            integral: 0,
            diff: 0,
            prev_offset: 0,
            prev_offset_valid: false,
            prev_receive_time: None,
            delta_t: 0,
            adj_old: 0,
            freq_off_filtered: 0,
            observed_rate: 0,
            adj_avefix: 0,
            adj_average: 0,
            adj_stable: false,
            holdover_count: 0,
            holdover_ok: false,
        }
    }

    fn delay_filter(&mut self, delay: TimeInterval, log_interval: i8) -> Option<TimeInterval> {
        let filter = self.config.filter;
        if filter.delay_filter == 0 {
            return self.delay_window.delay(delay);
        }

        let filtered = if filter.dist != 0 {
            let period = 1u32.checked_shl(filter.delay_filter).unwrap_or(u32::MAX);
            self.delay_lowpass.filter(
                delay,
                Smoothing::Period(period),
                filter.max_delay_variation(),
            )
        } else {
            let factor = smoothing_factor(bandwidth_from_period(filter.period), log_interval);
            self.delay_lowpass.filter(
                delay,
                Smoothing::Factor(factor),
                Some(TimeInterval::from_nanos(
                    filter.max_acceptable_delay_variation as i64,
                )),
            )
        };

        tracing::trace!(%delay, %filtered, "path delay filtered");
        Some(filtered)
    }

    fn delay_filter_reset(&mut self) {
        self.delay_window.reset();
        self.delay_lowpass.reset();
    }

    fn offset_filter(&mut self, sample: FilterSample, log_interval: i8) -> Option<FilterSample> {
        let filter = self.config.filter;
        if filter.dist != 0 {
            return self.offset_window.offset(sample);
        }

        let factor = smoothing_factor(bandwidth_from_period(filter.period), log_interval);
        let value = self
            .offset_lowpass
            .filter(sample.value, Smoothing::Factor(factor), None);
        Some(FilterSample {
            value,
            receive_time: sample.receive_time,
        })
    }

    fn offset_filter_reset(&mut self) {
        self.offset_window.reset();
        self.offset_lowpass.reset();
        self.pid_reset();
    }

    fn stable_offset_calc(&mut self, offset: TimeInterval, current: TimeInterval) -> bool {
        let slave = self.config.slave;
        if offset.saturating_sub(current).abs() <= slave.stable_offset_threshold() {
            self.stable_count += 1;
            if self.stable_count >= slave.stable_count {
                self.stable = true;
                self.unstable_count = 0;
                self.stable_count -= 1;
            }
        } else {
            self.unstable_count += 1;
            if self.unstable_count >= slave.unstable_count {
                self.stable = false;
                self.stable_count = 0;
                self.unstable_count -= 1;
            }
        }

        tracing::trace!(
            stable = self.stable,
            stable_count = self.stable_count,
            unstable_count = self.unstable_count,
            "offset stability"
        );
        self.stable
    }

    fn stable_offset_clear(&mut self) {
        self.stable = false;
        self.stable_count = 0;
        self.unstable_count = 0;
    }

    fn offset_ok(&mut self, offset: TimeInterval, two_way: bool) -> bool {
        let slave = self.config.slave;
        let threshold = if self.offset_ok {
            slave.offset_fail_threshold()
        } else {
            slave.offset_ok_threshold()
        };
        self.offset_ok = offset.abs() <= threshold || !two_way;
        self.offset_ok
    }

    fn clock_servo<C: ClockControl>(
        &mut self,
        clock: &C,
        domain: ClockDomain,
        sample: FilterSample,
        mode: ServoMode,
        prc_locked: bool,
    ) -> i64 {
        let config = self.config.servo;
        let offset = sample.value;
        let cur = offset.to_bits() as i128;
        let mut adj;

        if offset.nanos() / NANOS_PER_SECOND != 0 {
            // a whole second off, run at full speed
            adj = if offset > TimeInterval::ZERO {
                ADJ_FREQ_MAX
            } else {
                -ADJ_FREQ_MAX
            };
            tracing::debug!(%offset, "offset beyond a second, maximum adjustment");
        } else {
            self.delta_t = match self.prev_receive_time {
                Some(previous) => sample.receive_time.diff(previous).nanos() / 1000,
                None => MICROS_PER_SECOND as i64,
            };
            self.prev_receive_time = Some(sample.receive_time);
            let delta_t = self.delta_t as i128;

            let mut freq_off_est = 0;
            if config.p_reg && config.ap != 0 && !config.i_reg && !config.d_reg {
                let dt = delta_t.max(1);
                let est = self.adj_old as i128
                    - MICROS_PER_SECOND * (cur - self.prev_offset as i128) / dt;
                freq_off_est = saturate(est);
                self.freq_off_filtered =
                    saturate(est / 4 + (3 * self.freq_off_filtered as i128) / 4);
                self.prop = saturate(
                    (cur * MICROS_PER_SECOND / dt) / config.ap as i128
                        + self.freq_off_filtered as i128,
                );
                self.prev_offset = offset.to_bits();
            } else if config.p_reg && config.ap != 0 {
                self.prop = saturate(cur / config.ap as i128);
            } else {
                self.prop = 0;
            }

            if config.i_reg && config.ai != 0 && mode > ServoMode::FrequencyLocking {
                let step = cur * delta_t / (config.ai as i128 * MICROS_PER_SECOND);
                self.integral = (self.integral as i128 + step)
                    .clamp(-(ADJ_FREQ_MAX as i128), ADJ_FREQ_MAX as i128)
                    as i64;
            } else {
                self.integral = 0;
            }
            self.observed_rate = (self.integral >> 16).saturating_mul(config.gain as i64);

            if config.d_reg && config.ad != 0 && delta_t != 0 && mode > ServoMode::FrequencyLocking
            {
                let ad = (if prc_locked { config.ad } else { config.ad * 3 }) as i128;
                if self.prev_offset_valid {
                    self.diff = saturate(
                        (cur - self.prev_offset as i128) * MICROS_PER_SECOND / (delta_t * ad),
                    );
                }
                self.prev_offset = offset.to_bits();
                self.prev_offset_valid = true;
            } else {
                self.diff = 0;
                self.prev_offset_valid = false;
            }

            adj = saturate(
                (self.prop as i128 + self.diff as i128 + self.integral as i128)
                    * config.gain as i128,
            );
            self.adj_old = adj;

            tracing::debug!(
                %offset,
                freq_off_est = freq_off_est >> 16,
                delta_t = self.delta_t,
                p = self.prop,
                i = self.integral,
                d = self.diff,
                adj = adj >> 16,
                "pid output"
            );
        }

        let synce_threshold = TimeInterval::from_nanos(config.synce_threshold as i64);
        if config.srv_option == ServoOption::Free || offset.abs() >= synce_threshold {
            apply(
                clock.set_frequency_ratio(scaled_ppb_to_ppt(-adj), domain),
                "set frequency",
            );
        } else {
            apply(clock.set_frequency_ratio(0, domain), "set frequency");
            adj = saturate(adj as i128 * self.delta_t as i128 / MICROS_PER_SECOND);
            apply(
                clock.adjust_phase(TimeInterval::from_bits(adj), domain),
                "adjust phase",
            );
            self.observed_rate = 0;
        }

        if mode == ServoMode::Locked {
            let filt_div = (self.holdover_count + 1).min(config.ho_filter).max(1) as i128;
            self.adj_avefix =
                (self.adj_avefix * (filt_div - 1) + adj as i128 * HOLDOVER_SCALE) / filt_div;
            self.adj_average = if prc_locked {
                0
            } else {
                saturate(self.adj_avefix / HOLDOVER_SCALE)
            };
            let band = ((config.stable_adj_threshold as i64) << 16) / 10;
            self.adj_stable = self.adj_average.saturating_sub(adj).unsigned_abs() <= band as u64;
            if self.adj_stable && !self.holdover_ok {
                self.holdover_ok = self.holdover_count >= config.ho_filter;
                self.holdover_count += 1;
            }
            tracing::trace!(
                adj_average = self.adj_average,
                adj_stable = self.adj_stable,
                holdover_count = self.holdover_count,
                holdover_ok = self.holdover_ok,
                "holdover tracking"
            );
        }
        if !self.adj_stable || mode != ServoMode::Locked {
            self.holdover_count = 0;
            self.holdover_ok = false;
        }

        adj
    }

    fn clock_servo_reset<C: ClockControl>(&mut self, clock: &C, domain: ClockDomain) {
        if self.holdover_ok {
            tracing::info!(adj_average = self.adj_average, "reset to holdover frequency");
            apply(
                clock.set_frequency_ratio(scaled_ppb_to_ppt(-self.adj_average), domain),
                "set holdover frequency",
            );
        } else {
            tracing::info!("reset to free running frequency");
            apply(clock.set_frequency_ratio(0, domain), "clear frequency");
        }
    }

    fn clock_servo_status(&self) -> HoldoverStatus {
        HoldoverStatus {
            holdover_ok: self.holdover_ok,
            holdover_adj: scaled_ppb_to_ppt(self.adj_average),
        }
    }

    fn observed_phase_change_rate(&self) -> i64 {
        self.observed_rate
    }

    fn output(&self) -> i64 {
        self.prop
            .saturating_add(self.diff)
            .saturating_add(self.integral)
    }

    fn track_alternate(&mut self, offset: TimeInterval, receive_time: Timestamp, active_output: i64) {
        self.prev_offset = offset.to_bits();
        self.prev_offset_valid = true;
        self.prev_receive_time = Some(receive_time);
        self.prop = self.prev_offset / self.config.servo.ap.max(1) as i64;
        self.integral = active_output.saturating_sub(self.prop);
        self.diff = 0;
        tracing::debug!(
            p = self.prop,
            i = self.integral,
            d = self.diff,
            "alternate servo tracking"
        );
    }

    fn display_stats(&self, mean_path_delay: TimeInterval, offset: TimeInterval, adj: i64) {
        if !self.config.servo.display_stats {
            return;
        }
        let stats = self.display_parm();
        tracing::info!(
            %mean_path_delay,
            %offset,
            adj,
            p = stats.prop,
            i = stats.integral,
            d = stats.diff,
            min_offset = %stats.offset.min,
            max_offset = %stats.offset.max,
            mean_offset = %stats.offset.mean,
            delta_t = stats.delta_t,
            "servo statistics"
        );
    }

    fn display_parm(&self) -> ServoStats {
        let offset = if self.config.filter.dist == 0 {
            let value = self.offset_lowpass.value();
            WindowStats {
                min: value,
                max: value,
                mean: value,
            }
        } else {
            self.offset_window.stats()
        };

        ServoStats {
            prop: self.prop,
            integral: self.integral,
            diff: self.diff,
            offset,
            delta_t: self.delta_t,
        }
    }
}
