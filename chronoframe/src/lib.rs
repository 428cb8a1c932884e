//! # Chronoframe
//!
//! A declarative, event-driven time-frame scheduling engine.
//!
//! Chronoframe turns loosely specified time expressions into concrete
//! schedules. A [`TimeFrame`](frame::TimeFrame) is described with moments
//! (`"2026-09-01T12:00:00Z"`, `"5 minutes after launch"`) and durations
//! (`"PT1H30M"`, `"90 seconds"`), then started; from that point its
//! begin, tick, and end transitions are driven by timers and published on
//! broadcast channels. A [`FrameCollection`](collection::FrameCollection)
//! registers frames by name and fans their events into one bus.
//!
//! ## Core Concepts
//!
//! - **Moments** are absolute points in time, expressed in milliseconds
//!   since the Unix epoch. Any [`MomentSpec`](time::MomentSpec) resolves
//!   to one, including sentence forms like `"interpolated 50% between
//!   start and finish"`. Unintelligible input resolves to `0`; resolution
//!   never fails.
//! - **Durations** are millisecond spans. A [`DurationSpec`](time::DurationSpec)
//!   accepts raw numbers, ISO-8601 strings, and natural phrases.
//! - **Named times** give moments reusable names. Every frame carries a
//!   table seeded with `epoch`, `now`, and `never`; entries may reference
//!   each other and resolve lazily.
//! - **Frames** are begin/tick/end intervals. Configuration is mutable
//!   until [`start()`](frame::TimeFrame::start), at which point every
//!   expression is resolved once and frozen.
//!
//! ## Example
//!
//! ```no_run
//! use chronoframe::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let frame = TimeFrame::new(FrameOptions {
//!         name: Some("heartbeat".into()),
//!         ends_at: Some("10 seconds after now".into()),
//!         ticks_every: Some("1 second".into()),
//!         ..FrameOptions::default()
//!     });
//!
//!     let mut ticks = frame.subscribe("ticked");
//!     frame.start();
//!     while let Ok(event) = ticks.recv().await {
//!         println!("tick at {}", event.at_ms);
//!     }
//! }
//! ```

pub mod bus;
pub mod collection;
pub mod common;
pub mod config;
pub mod errors;
pub mod events;
pub mod frame;
pub mod time;

/// A convenience prelude importing the types most applications need.
pub mod prelude {
    pub use crate::bus::EventBus;
    pub use crate::collection::FrameCollection;
    pub use crate::common::FrameKey;
    pub use crate::config::ScheduleConfig;
    pub use crate::errors::FrameError;
    pub use crate::events::{FrameEvent, FrameEventKind};
    pub use crate::frame::{FrameOptions, FrameSnapshot, TimeFrame};
    pub use crate::time::{
        parse_duration, resolve_moment, Clock, DurationSpec, MomentSpec, NamedTimeTable,
    };
}
