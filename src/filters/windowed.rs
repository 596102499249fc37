use serde::Serialize;

use crate::datastructures::common::{TimeInterval, Timestamp};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// A filtered value together with the receive time of the sample it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterSample {
    pub value: TimeInterval,
    pub receive_time: Timestamp,
}

/// Minimum, maximum and mean of the samples in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowStats {
    pub min: TimeInterval,
    pub max: TimeInterval,
    pub mean: TimeInterval,
}

/// Collects `period` samples and then emits either their minimum or their
/// mean.
///
/// With a distance above one the minimum is emitted, and the offset variant
/// additionally waits for `dist` windows before reporting. A distance of one
/// emits the mean.
#[derive(Debug, Clone)]
pub struct WindowedFilter {
    period: u32,
    dist: u32,
    count: u32,
    windows: u32,
    min: FilterSample,
    max: TimeInterval,
    sum: i128,
    mean: TimeInterval,
    previous: Option<TimeInterval>,
}

impl WindowedFilter {
    pub fn new(period: u32, dist: u32) -> Self {
        Self {
            period: period.max(1),
            dist,
            count: 0,
            windows: 0,
            min: FilterSample::default(),
            max: TimeInterval::ZERO,
            sum: 0,
            mean: TimeInterval::ZERO,
            previous: None,
        }
    }

    /// Drop all collected samples and statistics
    pub fn reset(&mut self) {
        *self = Self::new(self.period, self.dist);
    }

    /// Statistics of the current, or just completed, window
    pub fn stats(&self) -> WindowStats {
        WindowStats {
            min: self.min.value,
            max: self.max,
            mean: self.mean,
        }
    }

    fn use_min(&self) -> bool {
        self.dist > 1
    }

    /// Add a sample, returning the window result once `period` samples have
    /// been collected.
    fn accumulate(&mut self, sample: FilterSample) -> Option<FilterSample> {
        if self.count == 0 {
            self.min.value = TimeInterval::MAX;
            self.max = TimeInterval::MIN;
            self.sum = 0;
        }

        if sample.value < self.min.value {
            self.min = sample;
        }
        if sample.value > self.max {
            self.max = sample.value;
        }
        self.sum += sample.value.to_bits() as i128;

        self.count += 1;
        if self.count < self.period {
            return None;
        }

        self.count = 0;
        self.mean = TimeInterval::from_bits((self.sum / self.period as i128) as i64);
        tracing::debug!(
            min = %self.min.value,
            max = %self.max,
            mean = %self.mean,
            "filter window complete"
        );

        Some(if self.use_min() {
            self.min
        } else {
            FilterSample {
                value: self.mean,
                receive_time: sample.receive_time,
            }
        })
    }

    /// Filter a path delay sample.
    ///
    /// Between window ends the last emitted delay is repeated. A delay of a
    /// second or more cannot be filtered: the filter is reset and `None` is
    /// returned.
    pub fn delay(&mut self, delay: TimeInterval) -> Option<TimeInterval> {
        if delay.nanos() / NANOS_PER_SECOND != 0 {
            tracing::debug!(%delay, "delay out of filter range, resetting");
            self.reset();
            return None;
        }

        let mut previous = *self.previous.get_or_insert(delay);

        let sample = FilterSample {
            value: delay,
            receive_time: Timestamp::default(),
        };
        if let Some(result) = self.accumulate(sample) {
            previous = result.value;
            self.previous = Some(previous);
        }

        Some(previous)
    }

    /// Filter an offset sample, returning a value only when a full result is
    /// available.
    pub fn offset(&mut self, sample: FilterSample) -> Option<FilterSample> {
        let result = self.accumulate(sample)?;

        if self.use_min() {
            self.windows += 1;
            if self.windows < self.dist {
                return None;
            }
            self.windows = 0;
        }

        Some(result)
    }
}
