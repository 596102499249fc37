//! Clock synchronization core of a PTP slave.
//!
//! Timestamps taken from Sync and Delay messages are fed to a
//! [`servo::SlaveClock`], which filters them, runs a PID servo and steers a
//! local clock through the [`clock::ClockControl`] trait. Settling periods
//! are timed by a [`timer::TimerScheduler`] that the application ticks.
//! [`datastructures`] contains the wire format of the PTP messages.

pub mod clock;
pub mod config;
pub mod datastructures;
pub mod filters;
pub mod servo;
pub mod timer;
pub mod tracing;
