//! Datasets shared between the codec and the servo

use serde::Deserialize;

mod time_properties;

pub use time_properties::*;

/// PTP profile the clock runs, where it changes what goes on the wire
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PtpProfile {
    #[default]
    Default,
    /// IEEE 802.1AS, which requires reserved Announce fields to be zero
    Ieee8021As,
}
