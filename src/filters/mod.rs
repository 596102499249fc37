//! Filters applied to path delay and offset samples before they reach the
//! servo

mod lowpass;
mod windowed;

pub use lowpass::{LowpassFilter, Smoothing};
pub use windowed::{FilterSample, WindowStats, WindowedFilter};

/// Filter bandwidth in Hz selected by a configured period, which counts in
/// steps of 0.01 Hz
pub fn bandwidth_from_period(period: u32) -> f64 {
    period as f64 / 100.0
}

/// Smoothing factor of a first order lowpass with the given bandwidth when
/// samples arrive every `2^log_interval` seconds.
///
/// Intervals of a second or more are treated as one sample per second.
pub fn smoothing_factor(bandwidth_hz: f64, log_interval: i8) -> f64 {
    let rate = if log_interval <= 0 {
        2f64.powi(-(log_interval as i32))
    } else {
        1.0
    };

    rate / (2.0 * core::f64::consts::PI * bandwidth_hz + rate)
}
