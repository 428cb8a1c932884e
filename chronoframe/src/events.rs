//! Defines the event types broadcast by frames and collections.
//!
//! Subscribers receive a typed event record, never the live frame: the
//! record carries a snapshot of everything a consumer needs at the moment
//! the event fired, so a subscriber can neither mutate a frame nor observe
//! it mid-transition.

use crate::errors::{FrameError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// The lifecycle transitions a frame can announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameEventKind {
    Began,
    Ended,
    Ticked,
    Muted,
    Unmuted,
}

impl FrameEventKind {
    pub const ALL: [FrameEventKind; 5] = [
        FrameEventKind::Began,
        FrameEventKind::Ended,
        FrameEventKind::Ticked,
        FrameEventKind::Muted,
        FrameEventKind::Unmuted,
    ];

    /// The channel a frame publishes this transition on.
    pub fn channel(self) -> &'static str {
        match self {
            FrameEventKind::Began => "began",
            FrameEventKind::Ended => "ended",
            FrameEventKind::Ticked => "ticked",
            FrameEventKind::Muted => "muted",
            FrameEventKind::Unmuted => "unmuted",
        }
    }

    /// The type-scoped channel a collection republishes this transition on.
    pub fn collection_channel(self) -> &'static str {
        match self {
            FrameEventKind::Began => "timeFrameBegan",
            FrameEventKind::Ended => "timeFrameEnded",
            FrameEventKind::Ticked => "timeFrameTicked",
            FrameEventKind::Muted => "timeFrameMuted",
            FrameEventKind::Unmuted => "timeFrameUnmuted",
        }
    }
}

/// A snapshot record describing one frame lifecycle transition.
#[derive(Debug, Clone)]
pub struct FrameEvent {
    /// Which transition fired.
    pub kind: FrameEventKind,
    /// Absolute time of the transition in milliseconds.
    pub at_ms: f64,
    /// The name of the frame, if it has one.
    pub frame_name: Option<String>,
    /// The consumer-owned payload attached to the frame.
    pub user_data: serde_json::Value,
    /// The frame's resolved `relativeTo` moment.
    pub relative_to_ms: f64,
    /// The frame's resolved named times, reserved names and the frame's own
    /// `beginsAt`/`endsAt` included, for relative-duration arithmetic.
    pub named_times: Arc<HashMap<String, f64>>,
}

impl FrameEvent {
    /// Milliseconds from this event to the frame's `relativeTo` moment.
    /// Positive while the reference point is still ahead.
    pub fn relative_duration(&self) -> f64 {
        self.relative_to_ms - self.at_ms
    }

    /// Milliseconds from this event to the named time `name`.
    pub fn duration_relative_to(&self, name: &str) -> Result<f64> {
        if name.is_empty() {
            return Err(FrameError::MissingParameter("name"));
        }
        self.named_times
            .get(name)
            .map(|origin| origin - self.at_ms)
            .ok_or_else(|| FrameError::UnknownNamedTime(name.to_string()))
    }

    /// The name-scoped collection channel for this event, e.g.
    /// `"checkout/began"`, when the source frame is named.
    pub fn scoped_channel(&self) -> Option<String> {
        self.frame_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| format!("{}/{}", name, self.kind.channel()))
    }
}
