//! A registry of time frames with collection-wide event fan-in.
//!
//! Every frame added to a collection has its lifecycle events re-published
//! on the collection's own bus: always on an aggregate channel keyed by
//! event kind (`"timeFrameBegan"`, `"timeFrameTicked"`, ...) and, when the
//! frame is named, additionally on a frame-scoped channel
//! (`"heartbeat/began"`). One subscription can watch every frame, or
//! exactly one. Names must be unique; unnamed frames are accepted and ride
//! the aggregate channels only.

use crate::bus::EventBus;
use crate::common::FrameKey;
use crate::errors::{FrameError, Result};
use crate::events::FrameEvent;
use crate::frame::{FrameOptions, FrameSnapshot, TimeFrame};
use crate::time::moment::MomentSpec;
use crate::time::Clock;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct CollectionEntry {
    frame: TimeFrame,
    proxy: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct CollectionState {
    frames: SlotMap<FrameKey, CollectionEntry>,
    by_name: HashMap<String, FrameKey>,
}

#[derive(Debug)]
struct CollectionInner {
    clock: Clock,
    bus: EventBus,
    state: RwLock<CollectionState>,
}

impl Drop for CollectionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        for entry in state.frames.values() {
            entry.proxy.abort();
        }
    }
}

/// A cloneable handle to a collection of named time frames.
#[derive(Debug, Clone)]
pub struct FrameCollection {
    inner: Arc<CollectionInner>,
}

impl FrameCollection {
    /// Creates an empty collection whose frames schedule against the
    /// system clock.
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    /// Creates an empty collection scheduling against an explicit clock.
    /// Frames built through [`FrameCollection::create`] inherit it.
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                clock,
                bus: EventBus::new(),
                state: RwLock::new(CollectionState::default()),
            }),
        }
    }

    /// Builds a collection from anything convertible into frames (handles
    /// or `FrameOptions`), on the system clock. Fails on the first
    /// duplicate name, leaving no frame of the batch running.
    pub fn from_frames<I, T>(frames: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<TimeFrame>,
    {
        let collection = Self::new();
        for frame in frames {
            if let Err(err) = collection.add(frame.into()) {
                collection.stop_all();
                return Err(err);
            }
        }
        Ok(collection)
    }

    /// Builds a frame from `options` on the collection's clock and adds
    /// it. A name in the options must not already be present.
    pub fn create(&self, options: FrameOptions) -> Result<TimeFrame> {
        let frame = TimeFrame::with_clock(options, self.inner.clock);
        self.add(frame.clone())?;
        Ok(frame)
    }

    /// Adds an existing frame. A named frame's name must be unique within
    /// the collection; a collision rejects the frame untouched. Unnamed
    /// frames are always accepted and are reachable by key only.
    pub fn add(&self, frame: TimeFrame) -> Result<FrameKey> {
        let name = frame.name().map(str::to_string).filter(|n| !n.is_empty());

        let mut state = self.write_state();
        if let Some(name) = &name {
            if state.by_name.contains_key(name) {
                return Err(FrameError::DuplicateName(name.clone()));
            }
        }

        let proxy = spawn_proxy(self.inner.bus.clone(), &frame);
        let key = state.frames.insert(CollectionEntry { frame, proxy });
        if let Some(name) = name {
            info!(name = %name, "time frame added to collection");
            state.by_name.insert(name, key);
        } else {
            info!("unnamed time frame added to collection");
        }
        Ok(key)
    }

    /// Removes a frame by name, stopping it and detaching its event proxy.
    /// Returns the removed frame, or `None` when the name is unknown.
    pub fn remove(&self, name: &str) -> Option<TimeFrame> {
        let mut state = self.write_state();
        let key = state.by_name.remove(name)?;
        let entry = state.frames.remove(key)?;
        drop(state);

        entry.proxy.abort();
        entry.frame.stop();
        debug!(name, "time frame removed from collection");
        Some(entry.frame)
    }

    /// Looks up a frame by name.
    pub fn get(&self, name: &str) -> Option<TimeFrame> {
        let state = self.read_state();
        let key = *state.by_name.get(name)?;
        state.frames.get(key).map(|entry| entry.frame.clone())
    }

    /// Looks up a frame by its registry key.
    pub fn get_by_key(&self, key: FrameKey) -> Option<TimeFrame> {
        self.read_state()
            .frames
            .get(key)
            .map(|entry| entry.frame.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read_state().by_name.contains_key(name)
    }

    /// The names of every named frame, unordered.
    pub fn names(&self) -> Vec<String> {
        self.read_state().by_name.keys().cloned().collect()
    }

    /// Handles to every registered frame, unordered.
    pub fn frames(&self) -> Vec<TimeFrame> {
        self.read_state()
            .frames
            .values()
            .map(|entry| entry.frame.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read_state().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().frames.is_empty()
    }

    /// Starts every frame in the collection.
    pub fn start_all(&self) -> &Self {
        for frame in self.frames() {
            frame.start();
        }
        self
    }

    /// Stops every frame in the collection.
    pub fn stop_all(&self) -> &Self {
        for frame in self.frames() {
            frame.stop();
        }
        self
    }

    /// Mutes every frame in the collection.
    pub fn mute_all(&self) -> &Self {
        for frame in self.frames() {
            frame.mute();
        }
        self
    }

    /// Unmutes every frame in the collection.
    pub fn unmute_all(&self) -> &Self {
        for frame in self.frames() {
            frame.unmute();
        }
        self
    }

    /// Merges entries into the named-time table of every frame in the
    /// collection. Fails on the first frame that is already started; frames
    /// visited before it keep the new entries.
    pub fn extend_named_times<I, K, V>(&self, entries: I) -> Result<&Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MomentSpec>,
    {
        let entries: Vec<(String, MomentSpec)> = entries
            .into_iter()
            .map(|(name, spec)| (name.into(), spec.into()))
            .collect();
        if entries.is_empty() {
            return Err(FrameError::MissingParameter("namedTimes"));
        }
        for frame in self.frames() {
            frame.extend_named_times(entries.clone())?;
        }
        Ok(self)
    }

    /// Subscribes to a collection channel: an aggregate kind channel such
    /// as `"timeFrameBegan"`, or a frame-scoped channel such as
    /// `"heartbeat/ticked"`. Unsubscribe by dropping the receiver.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<FrameEvent> {
        self.inner.bus.subscribe(channel)
    }

    /// Publishes an event on an arbitrary collection channel.
    pub fn publish(&self, channel: &str, event: FrameEvent) -> &Self {
        self.inner.bus.publish(channel, event);
        self
    }

    /// Snapshots of every registered frame, unordered.
    pub fn snapshot(&self) -> Vec<FrameSnapshot> {
        self.frames()
            .into_iter()
            .map(|frame| frame.snapshot())
            .collect()
    }

    /// The snapshots as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CollectionState> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CollectionState> {
        self.inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for FrameCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.snapshot()) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("<unserializable frame collection>"),
        }
    }
}

/// Forwards one frame's lifecycle events onto the collection bus, on both
/// the aggregate and the frame-scoped channel. Exits when the frame is
/// dropped; aborted when the frame is removed.
fn spawn_proxy(bus: EventBus, frame: &TimeFrame) -> JoinHandle<()> {
    let mut events = frame.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(scoped) = event.scoped_channel() {
                        bus.publish(&scoped, event.clone());
                    }
                    bus.publish(event.kind.collection_channel(), event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "collection proxy fell behind; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named_frame(name: &str) -> TimeFrame {
        TimeFrame::with_clock(
            FrameOptions {
                name: Some(name.to_string()),
                ..FrameOptions::default()
            },
            Clock::fixed(0.0),
        )
    }

    #[tokio::test]
    async fn rejects_duplicate_names() {
        let collection = FrameCollection::with_clock(Clock::fixed(0.0));
        collection.add(named_frame("alpha")).unwrap();
        assert_eq!(
            collection.add(named_frame("alpha")),
            Err(FrameError::DuplicateName("alpha".to_string()))
        );
        assert_eq!(collection.len(), 1);
    }

    #[tokio::test]
    async fn accepts_unnamed_frames_by_key() {
        let collection = FrameCollection::with_clock(Clock::fixed(0.0));
        let unnamed = || TimeFrame::with_clock(FrameOptions::default(), Clock::fixed(0.0));

        let first = collection.add(unnamed()).unwrap();
        let second = collection.add(unnamed()).unwrap();
        assert_eq!(collection.len(), 2);
        assert!(collection.names().is_empty());
        assert!(collection.get_by_key(first).is_some());
        assert!(collection.get_by_key(second).is_some());

        let batch =
            FrameCollection::from_frames([FrameOptions::default(), FrameOptions::default()])
                .unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[tokio::test]
    async fn removal_frees_the_name_for_reuse() {
        let collection = FrameCollection::with_clock(Clock::fixed(0.0));
        collection.add(named_frame("alpha")).unwrap();
        let removed = collection.remove("alpha").unwrap();
        assert!(removed.is_stopped());
        assert!(!collection.contains("alpha"));
        collection.add(named_frame("alpha")).unwrap();
    }

    #[tokio::test]
    async fn from_frames_rejects_duplicates_wholesale() {
        let result = FrameCollection::from_frames([named_frame("twin"), named_frame("twin")]);
        assert!(matches!(result, Err(FrameError::DuplicateName(_))));
    }

    #[tokio::test]
    async fn extend_named_times_reaches_every_frame() {
        let collection = FrameCollection::with_clock(Clock::fixed(0.0));
        collection.add(named_frame("alpha")).unwrap();
        collection.add(named_frame("beta")).unwrap();

        collection
            .extend_named_times([("launch", MomentSpec::from(9_000.0))])
            .unwrap();
        for frame in collection.frames() {
            assert_eq!(frame.named_times(false)["launch"], 9_000.0);
        }

        // A started frame refuses the broadcast.
        collection.get("alpha").unwrap().start();
        assert_eq!(
            collection
                .extend_named_times([("launch", MomentSpec::from(1.0))])
                .unwrap_err(),
            FrameError::Immutable
        );
    }

    #[tokio::test]
    async fn lookup_by_name_and_key() {
        let collection = FrameCollection::with_clock(Clock::fixed(0.0));
        let key = collection.add(named_frame("alpha")).unwrap();
        assert_eq!(collection.get("alpha").unwrap().name(), Some("alpha"));
        assert_eq!(collection.get_by_key(key).unwrap().name(), Some("alpha"));
        assert!(collection.get("beta").is_none());
    }
}
