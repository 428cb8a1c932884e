//! The error taxonomy for frame and collection operations.
//!
//! Parse failures are deliberately not errors anywhere in this crate: an
//! unparseable duration or moment expression resolves to 0. The conditions
//! below are precondition breaches on the public API and are always raised
//! synchronously at the call site.

use thiserror::Error;

/// Errors raised by `TimeFrame` and `FrameCollection` operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Two frames in one collection declared the same non-empty name.
    #[error("duplicate time frame name: {0}")]
    DuplicateName(String),

    /// A setter was called after `start()`; started frames are frozen.
    #[error("time frame is immutable once started")]
    Immutable,

    /// A required argument was empty or absent.
    #[error("no value was provided for {0}")]
    MissingParameter(&'static str),

    /// A named-time lookup referenced a name the frame does not know.
    #[error("unknown named time: {0}")]
    UnknownNamedTime(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
