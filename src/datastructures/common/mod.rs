//! Common data structures that are used throughout the protocol

mod clock_identity;
mod clock_quality;
mod port_identity;
mod time_interval;
mod time_source;
mod timestamp;
mod tlv;

pub use clock_identity::*;
pub use clock_quality::*;
pub use port_identity::*;
pub use time_interval::*;
pub use time_source::*;
pub use timestamp::*;
pub use tlv::*;
