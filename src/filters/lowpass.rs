use crate::datastructures::common::TimeInterval;

/// Consecutive rejected samples after which the running minimum is assumed
/// to be stale
const MAX_SKIPPED: u32 = 5;

/// How strongly a new sample pulls the filter output
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Smoothing {
    /// `y = ((k - 1) * y + x) / k`, with `k` ramping up to the period
    Period(u32),
    /// `y += factor * (x - y)`
    Factor(f64),
}

/// First order lowpass filter over time intervals
///
/// Optionally tracks the smallest sample seen so far and ignores samples that
/// exceed it by more than a configured variation, which suits path delays
/// where queueing only ever adds to the true value.
#[derive(Debug, Clone)]
pub struct LowpassFilter {
    name: &'static str,
    min: TimeInterval,
    value: TimeInterval,
    divisor: u32,
    skipped: u32,
}

impl LowpassFilter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            min: TimeInterval::MAX,
            value: TimeInterval::ZERO,
            divisor: 0,
            skipped: 0,
        }
    }

    pub fn reset(&mut self) {
        self.min = TimeInterval::MAX;
        self.value = TimeInterval::ZERO;
        self.divisor = 0;
        self.skipped = 0;
        tracing::debug!(filter = self.name, "lowpass filter reset");
    }

    /// The current ramp divisor
    pub fn divisor(&self) -> u32 {
        self.divisor
    }

    pub fn value(&self) -> TimeInterval {
        self.value
    }

    /// Feed one sample and return the filtered value.
    ///
    /// With `max_variation` set, samples more than that above the running
    /// minimum leave the output unchanged. Once more than five samples in a
    /// row have been skipped the filter restarts from the current sample.
    pub fn filter(
        &mut self,
        sample: TimeInterval,
        smoothing: Smoothing,
        max_variation: Option<TimeInterval>,
    ) -> TimeInterval {
        if let Smoothing::Period(period) = smoothing {
            let period = period.max(1);
            if self.divisor < 1 {
                self.divisor = 1;
            } else if self.divisor < period {
                self.divisor += 1;
            } else if self.divisor > period {
                self.divisor = period;
            }
        }

        if sample < self.min {
            self.min = sample;
            tracing::trace!(filter = self.name, min = %sample, "new minimum");
        }

        let accept = match max_variation {
            Some(variation) => sample < self.min.saturating_add(variation),
            None => true,
        };

        if accept {
            self.value = match smoothing {
                Smoothing::Period(_) => {
                    let k = self.divisor as i128;
                    let previous = self.value.to_bits() as i128;
                    let bits = ((k - 1) * previous + sample.to_bits() as i128) / k;
                    TimeInterval::from_bits(bits as i64)
                }
                Smoothing::Factor(factor) => {
                    let delta = sample.to_bits() as f64 - self.value.to_bits() as f64;
                    let step = (factor * delta) as i64;
                    TimeInterval::from_bits(self.value.to_bits().saturating_add(step))
                }
            };
            self.skipped = 0;
            tracing::trace!(
                filter = self.name,
                sample = %sample,
                filtered = %self.value,
                divisor = self.divisor,
                "lowpass sample"
            );
        } else {
            self.skipped += 1;
            if self.skipped > MAX_SKIPPED {
                tracing::debug!(
                    filter = self.name,
                    old_min = %self.min,
                    new_min = %sample,
                    "too many samples skipped, restarting from current sample"
                );
                self.min = sample;
                self.divisor = 0;
                self.value = sample;
            }
        }

        self.value
    }
}
