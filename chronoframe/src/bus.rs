//! A named-channel publish/subscribe bus over `tokio::sync::broadcast`.
//!
//! Channels are identified by string and created lazily on first
//! subscription. Publishing to a channel nobody listens on is a no-op, the
//! same way the engine-wide `.send(..).ok()` discipline drops events with
//! no receivers. Unsubscription is dropping the receiver.

use crate::events::FrameEvent;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// A cloneable handle to a set of named broadcast channels.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<FrameEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to `channel`, creating it if needed.
    ///
    /// A subscriber that falls more than the channel capacity behind loses
    /// the oldest events (`RecvError::Lagged`) rather than blocking the
    /// publisher; one slow consumer cannot stall event delivery to others.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<FrameEvent> {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes `event` on `channel`, returning how many subscribers
    /// received it.
    pub fn publish(&self, channel: &str, event: FrameEvent) -> usize {
        let channels = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match channels.get(channel) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }
}
