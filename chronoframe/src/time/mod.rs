//! Time expression machinery: clocks, durations, moments, and named times.

pub mod clock;
pub mod duration;
pub mod moment;
pub mod named;

pub use clock::Clock;
pub use duration::{parse_duration, DurationSpec};
pub use moment::{resolve_moment, Fraction, MomentSpec};
pub use named::{NamedTimeTable, RESERVED_NAMES};
