//! The schedulable time frame: a begin/tick/end interval driven by timers.
//!
//! A `TimeFrame` is configured declaratively with moment and duration
//! expressions, then `start()`ed. Starting freezes a normalized snapshot of
//! every expression-valued field; from then on the frame is immutable and
//! its transitions are driven by spawned timer tasks against the frame's
//! clock. The frame is a cloneable handle; timer tasks hold weak references,
//! so dropping the last handle quiesces the frame.
//!
//! Terminology: "begin" is the moment things start to happen (`beginsAt`);
//! "start" is the control command that ends setup and arms the timers.

use crate::bus::EventBus;
use crate::errors::{FrameError, Result};
use crate::events::{FrameEvent, FrameEventKind};
use crate::time::clock::Clock;
use crate::time::duration::{parse_duration, DurationSpec};
use crate::time::moment::{MomentSpec, ResolutionScope};
use crate::time::named::{NamedTimeTable, RESERVED_NAMES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

const EVENT_CAPACITY: usize = 64;

/// Names injected into resolution scopes but not part of the user table.
const DERIVED_NAMES: [&str; 2] = ["beginsAt", "endsAt"];

/// Declarative configuration for a `TimeFrame`.
///
/// Every field is optional; `begins_at` defaults to `"epoch"`, `ends_at` to
/// `"never"`, and `relative_to` to `"beginsAt"`. Deserializable, so frame
/// schedules can live in configuration files.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameOptions {
    pub name: Option<String>,
    pub begins_at: Option<MomentSpec>,
    pub ends_at: Option<MomentSpec>,
    pub ticks_every: Option<DurationSpec>,
    pub relative_to: Option<MomentSpec>,
    pub syncs_to: Option<DurationSpec>,
    #[serde(default)]
    pub named_times: HashMap<String, MomentSpec>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The lifecycle flags of a frame, as independent booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameStateFlags {
    pub is_started: bool,
    pub is_stopped: bool,
    pub is_begun: bool,
    pub is_ended: bool,
    pub is_muted: bool,
}

/// A serializable snapshot of a frame, all time fields as resolved
/// milliseconds. Non-finite values (an unbounded `ends_at`) serialize as
/// JSON null.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSnapshot {
    pub name: Option<String>,
    pub state: FrameStateFlags,
    pub begins_at: f64,
    pub ends_at: f64,
    pub ticks_every: f64,
    pub relative_to: f64,
    pub sync_to: f64,
    pub named_times: HashMap<String, f64>,
    pub data: serde_json::Value,
}

/// The normalized schedule captured once at `start()`.
#[derive(Debug, Clone)]
struct Frozen {
    begins_at: f64,
    ends_at: f64,
    ticks_every: f64,
    relative_to: f64,
    syncs_to: f64,
    /// User-declared named times, resolved; reserved names excluded.
    named_times: HashMap<String, f64>,
    /// Full resolved lookup: user names, reserved names, `beginsAt`,
    /// `endsAt`. Shared with every event this frame publishes.
    lookup: Arc<HashMap<String, f64>>,
}

#[derive(Debug)]
struct FrameState {
    begins_at: MomentSpec,
    ends_at: MomentSpec,
    relative_to: MomentSpec,
    ticks_every: Option<DurationSpec>,
    syncs_to: Option<DurationSpec>,
    named_times: NamedTimeTable,
    data: serde_json::Value,
    is_started: bool,
    is_begun: bool,
    is_ended: bool,
    is_muted: bool,
    is_stopped: bool,
    frozen: Option<Frozen>,
    begin_task: Option<JoinHandle<()>>,
    tick_task: Option<JoinHandle<()>>,
    end_task: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct FrameInner {
    name: Option<String>,
    clock: Clock,
    bus: EventBus,
    events: broadcast::Sender<FrameEvent>,
    state: RwLock<FrameState>,
}

/// A cloneable handle to a schedulable time frame.
#[derive(Debug, Clone)]
pub struct TimeFrame {
    inner: Arc<FrameInner>,
}

impl TimeFrame {
    /// Creates a frame from options, scheduling against the system clock.
    ///
    /// Frames must be created inside a Tokio runtime; their timers are
    /// spawned tasks.
    pub fn new(options: FrameOptions) -> Self {
        Self::with_clock(options, Clock::system())
    }

    /// Creates a named frame, overriding any name in `options`.
    pub fn named(name: impl Into<String>, options: FrameOptions) -> Self {
        Self::with_clock(
            FrameOptions {
                name: Some(name.into()),
                ..options
            },
            Clock::system(),
        )
    }

    /// Creates a frame scheduling against an explicit clock.
    pub fn with_clock(options: FrameOptions, clock: Clock) -> Self {
        debug!(name = options.name.as_deref(), "creating time frame");
        let mut named_times = NamedTimeTable::new(&clock);
        named_times.extend(options.named_times);

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(FrameInner {
                name: options.name,
                clock,
                bus: EventBus::new(),
                events,
                state: RwLock::new(FrameState {
                    begins_at: options.begins_at.unwrap_or_else(|| "epoch".into()),
                    ends_at: options.ends_at.unwrap_or_else(|| "never".into()),
                    relative_to: options.relative_to.unwrap_or_else(|| "beginsAt".into()),
                    ticks_every: options.ticks_every,
                    syncs_to: options.syncs_to,
                    named_times,
                    data: options.data,
                    is_started: false,
                    is_begun: false,
                    is_ended: false,
                    is_muted: false,
                    is_stopped: false,
                    frozen: None,
                    begin_task: None,
                    tick_task: None,
                    end_task: None,
                }),
            }),
        }
    }

    /// Arms the frame: freezes its normalized schedule and either ends it
    /// silently (already over), begins it synchronously (already underway),
    /// or schedules the begin timer. Idempotent; a no-op once started or
    /// stopped.
    pub fn start(&self) -> &Self {
        let mut state = self.inner.write_state();
        if state.is_started || state.is_stopped {
            return self;
        }

        let frozen = freeze(&state);
        let begins_at = frozen.begins_at;
        let ends_at = frozen.ends_at;
        state.frozen = Some(frozen);
        state.is_started = true;

        let now = self.inner.clock.now_ms();
        if ends_at <= now {
            // Over before it ever began: ends silently, no events.
            state.is_ended = true;
            debug!(name = self.name(), "time frame already over at start");
        } else if begins_at <= now {
            FrameInner::begin(&self.inner, &mut state);
        } else {
            state.begin_task = Some(spawn_begin(&self.inner, begins_at));
        }
        self
    }

    /// Permanently shuts the frame down: every pending timer is cancelled
    /// and no further events fire. Idempotent and irreversible.
    pub fn stop(&self) -> &Self {
        let mut state = self.inner.write_state();
        if !state.is_stopped {
            state.is_stopped = true;
            abort_all(&mut state);
            info!(name = self.name(), "time frame stopped");
        }
        self
    }

    /// Suppresses tick notifications. Begin and end still fire while muted.
    /// A no-op (without event) when already muted.
    pub fn mute(&self) -> &Self {
        let mut state = self.inner.write_state();
        if !state.is_muted {
            state.is_muted = true;
            if let Some(ticks) = state.tick_task.take() {
                ticks.abort();
            }
            let event = self.inner.make_event(FrameEventKind::Muted, &state);
            self.inner.emit(event);
        }
        self
    }

    /// Resumes tick notifications from now; ticks missed while muted are
    /// never replayed. A no-op (without event) when not muted.
    pub fn unmute(&self) -> &Self {
        let mut state = self.inner.write_state();
        if state.is_muted {
            state.is_muted = false;
            let ticking = state
                .frozen
                .as_ref()
                .map(|frozen| frozen.ticks_every > 0.0)
                .unwrap_or(false);
            if ticking && state.is_begun && !state.is_ended && !state.is_stopped {
                state.tick_task = Some(spawn_ticks(&self.inner));
            }
            let event = self.inner.make_event(FrameEventKind::Unmuted, &state);
            self.inner.emit(event);
        }
        self
    }

    /// Subscribes to one of the frame's named channels (`"began"`,
    /// `"ended"`, `"ticked"`, `"muted"`, `"unmuted"`, or any custom channel
    /// published to via [`TimeFrame::publish`]). Unsubscribe by dropping
    /// the receiver.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<FrameEvent> {
        self.inner.bus.subscribe(channel)
    }

    /// Subscribes to every lifecycle event this frame publishes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<FrameEvent> {
        self.inner.events.subscribe()
    }

    /// Publishes an event on an arbitrary named channel.
    pub fn publish(&self, channel: &str, event: FrameEvent) -> &Self {
        self.inner.bus.publish(channel, event);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.inner.read_state().is_started
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.read_state().is_stopped
    }

    pub fn is_begun(&self) -> bool {
        self.inner.read_state().is_begun
    }

    pub fn is_ended(&self) -> bool {
        self.inner.read_state().is_ended
    }

    pub fn is_muted(&self) -> bool {
        self.inner.read_state().is_muted
    }

    /// The resolved `beginsAt` in absolute milliseconds: frozen once the
    /// frame is started, computed live against the current table before.
    pub fn begins_at(&self) -> f64 {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) => frozen.begins_at,
            None => resolve_begins_at(&state),
        }
    }

    /// The original `beginsAt` expression.
    pub fn begins_at_spec(&self) -> MomentSpec {
        self.inner.read_state().begins_at.clone()
    }

    /// The resolved `endsAt` in absolute milliseconds.
    pub fn ends_at(&self) -> f64 {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) => frozen.ends_at,
            None => resolve_ends_at(&state),
        }
    }

    /// The original `endsAt` expression.
    pub fn ends_at_spec(&self) -> MomentSpec {
        self.inner.read_state().ends_at.clone()
    }

    /// The resolved tick interval in milliseconds; 0 when the frame does
    /// not tick.
    pub fn ticks_every(&self) -> f64 {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) => frozen.ticks_every,
            None => state.ticks_every.as_ref().map(parse_duration).unwrap_or(0.0),
        }
    }

    /// The original tick interval expression, if any.
    pub fn ticks_every_spec(&self) -> Option<DurationSpec> {
        self.inner.read_state().ticks_every.clone()
    }

    /// The resolved `relativeTo` reference moment in absolute milliseconds.
    pub fn relative_to(&self) -> f64 {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) => frozen.relative_to,
            None => resolve_relative_to(&state),
        }
    }

    /// The original `relativeTo` expression.
    pub fn relative_to_spec(&self) -> MomentSpec {
        self.inner.read_state().relative_to.clone()
    }

    /// The resolved tick-alignment boundary in milliseconds; 0 when ticks
    /// are unaligned.
    pub fn syncs_to(&self) -> f64 {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) => frozen.syncs_to,
            None => state.syncs_to.as_ref().map(parse_duration).unwrap_or(0.0),
        }
    }

    /// The original sync expression, if any.
    pub fn syncs_to_spec(&self) -> Option<DurationSpec> {
        self.inner.read_state().syncs_to.clone()
    }

    /// The named times resolved to absolute milliseconds, reserved entries
    /// (`epoch`, `now`, `never`) included only on request.
    pub fn named_times(&self, include_defaults: bool) -> HashMap<String, f64> {
        let state = self.inner.read_state();
        match &state.frozen {
            Some(frozen) if !include_defaults => frozen.named_times.clone(),
            Some(frozen) => frozen
                .lookup
                .iter()
                .filter(|(name, _)| !DERIVED_NAMES.contains(&name.as_str()))
                .map(|(name, ms)| (name.clone(), *ms))
                .collect(),
            None => {
                let entries = derived_entries(&state);
                let scope = ResolutionScope::new(&entries);
                state
                    .named_times
                    .entries()
                    .keys()
                    .filter(|name| include_defaults || !is_reserved(name))
                    .map(|name| {
                        (name.clone(), scope.resolve(&MomentSpec::Text(name.clone())))
                    })
                    .collect()
            }
        }
    }

    /// The original named-time expressions.
    pub fn named_time_specs(&self, include_defaults: bool) -> HashMap<String, MomentSpec> {
        self.inner.read_state().named_times.specs(include_defaults)
    }

    /// The consumer-owned payload attached to this frame.
    pub fn data(&self) -> serde_json::Value {
        self.inner.read_state().data.clone()
    }

    /// Milliseconds from now to the frame's `relativeTo` moment; positive
    /// while the reference point is still ahead.
    pub fn relative_duration(&self) -> f64 {
        self.relative_to() - self.inner.clock.now_ms()
    }

    /// Milliseconds from now to the named time `name`.
    pub fn duration_relative_to(&self, name: &str) -> Result<f64> {
        if name.is_empty() {
            return Err(FrameError::MissingParameter("name"));
        }
        let state = self.inner.read_state();
        let origin = match &state.frozen {
            Some(frozen) => frozen.lookup.get(name).copied(),
            None => {
                let entries = derived_entries(&state);
                if entries.contains_key(name) {
                    let scope = ResolutionScope::new(&entries);
                    Some(scope.resolve(&MomentSpec::Text(name.to_string())))
                } else {
                    None
                }
            }
        };
        origin
            .map(|origin| origin - self.inner.clock.now_ms())
            .ok_or_else(|| FrameError::UnknownNamedTime(name.to_string()))
    }

    /// Replaces the `beginsAt` expression. Fails once the frame is started.
    pub fn set_begins_at(&self, value: impl Into<MomentSpec>) -> Result<&Self> {
        let value = require_moment(value.into(), "beginsAt")?;
        self.mutate(|state| state.begins_at = value)
    }

    /// Replaces the `endsAt` expression. Fails once the frame is started.
    pub fn set_ends_at(&self, value: impl Into<MomentSpec>) -> Result<&Self> {
        let value = require_moment(value.into(), "endsAt")?;
        self.mutate(|state| state.ends_at = value)
    }

    /// Replaces the tick interval. Fails once the frame is started.
    pub fn set_ticks_every(&self, value: impl Into<DurationSpec>) -> Result<&Self> {
        let value = require_duration(value.into(), "ticksEvery")?;
        self.mutate(|state| state.ticks_every = Some(value))
    }

    /// Replaces the `relativeTo` expression. Fails once the frame is
    /// started.
    pub fn set_relative_to(&self, value: impl Into<MomentSpec>) -> Result<&Self> {
        let value = require_moment(value.into(), "relativeTo")?;
        self.mutate(|state| state.relative_to = value)
    }

    /// Replaces the tick-alignment boundary. Fails once the frame is
    /// started.
    pub fn set_syncs_to(&self, value: impl Into<DurationSpec>) -> Result<&Self> {
        let value = require_duration(value.into(), "syncsTo")?;
        self.mutate(|state| state.syncs_to = Some(value))
    }

    /// Attaches a consumer-owned payload. Fails once the frame is started.
    pub fn set_data(&self, value: serde_json::Value) -> Result<&Self> {
        if value.is_null() {
            return Err(FrameError::MissingParameter("data"));
        }
        self.mutate(|state| state.data = value)
    }

    /// Merges entries into the named-time table. Fails once the frame is
    /// started, or when `entries` is empty.
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
        self.mutate(|state| state.named_times.extend(entries))
    }

    /// A serializable snapshot of the frame's current state.
    pub fn snapshot(&self) -> FrameSnapshot {
        FrameSnapshot {
            name: self.name().map(str::to_string),
            state: FrameStateFlags {
                is_started: self.is_started(),
                is_stopped: self.is_stopped(),
                is_begun: self.is_begun(),
                is_ended: self.is_ended(),
                is_muted: self.is_muted(),
            },
            begins_at: self.begins_at(),
            ends_at: self.ends_at(),
            ticks_every: self.ticks_every(),
            relative_to: self.relative_to(),
            sync_to: self.syncs_to(),
            named_times: self.named_times(false),
            data: self.data(),
        }
    }

    /// The snapshot as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }

    fn mutate(&self, apply: impl FnOnce(&mut FrameState)) -> Result<&Self> {
        let mut state = self.inner.write_state();
        if state.is_started {
            return Err(FrameError::Immutable);
        }
        apply(&mut state);
        Ok(self)
    }
}

impl From<FrameOptions> for TimeFrame {
    fn from(options: FrameOptions) -> Self {
        TimeFrame::new(options)
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(&self.snapshot()) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("<unserializable time frame>"),
        }
    }
}

impl FrameInner {
    fn read_state(&self) -> RwLockReadGuard<'_, FrameState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, FrameState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transitions into the begun state and arms the tick and end timers.
    /// Callers hold the state write lock, which serializes this against
    /// every other transition.
    fn begin(inner: &Arc<FrameInner>, state: &mut FrameState) {
        state.is_begun = true;
        info!(name = inner.name.as_deref(), "time frame began");

        if let Some(frozen) = state.frozen.clone() {
            if frozen.ticks_every > 0.0 && !state.is_muted {
                state.tick_task = Some(spawn_ticks(inner));
            }
            if frozen.ends_at.is_finite() {
                state.end_task = Some(spawn_end(inner, frozen.ends_at));
            }
        }

        let event = inner.make_event(FrameEventKind::Began, state);
        inner.emit(event);
    }

    fn make_event(&self, kind: FrameEventKind, state: &FrameState) -> FrameEvent {
        let (relative_to_ms, named_times) = match &state.frozen {
            Some(frozen) => (frozen.relative_to, frozen.lookup.clone()),
            None => {
                let entries = derived_entries(state);
                let scope = ResolutionScope::new(&entries);
                let lookup: HashMap<String, f64> = entries
                    .keys()
                    .map(|name| {
                        (name.clone(), scope.resolve(&MomentSpec::Text(name.clone())))
                    })
                    .collect();
                (scope.resolve(&state.relative_to), Arc::new(lookup))
            }
        };
        FrameEvent {
            kind,
            at_ms: self.clock.now_ms(),
            frame_name: self.name.clone(),
            user_data: state.data.clone(),
            relative_to_ms,
            named_times,
        }
    }

    fn emit(&self, event: FrameEvent) {
        self.bus.publish(event.kind.channel(), event.clone());
        self.events.send(event).ok();
    }
}

fn require_moment(value: MomentSpec, field: &'static str) -> Result<MomentSpec> {
    if matches!(&value, MomentSpec::Text(text) if text.trim().is_empty()) {
        return Err(FrameError::MissingParameter(field));
    }
    Ok(value)
}

fn require_duration(value: DurationSpec, field: &'static str) -> Result<DurationSpec> {
    if matches!(&value, DurationSpec::Text(text) if text.trim().is_empty()) {
        return Err(FrameError::MissingParameter(field));
    }
    Ok(value)
}

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

fn abort_all(state: &mut FrameState) {
    for task in [
        state.begin_task.take(),
        state.tick_task.take(),
        state.end_task.take(),
    ]
    .into_iter()
    .flatten()
    {
        task.abort();
    }
}

/// The raw named-time entries with `beginsAt` and `endsAt` injected as
/// resolvable names, in that order, so either can appear inside any other
/// expression.
fn derived_entries(state: &FrameState) -> HashMap<String, MomentSpec> {
    let mut entries = state.named_times.entries().clone();
    let begins_at = ResolutionScope::new(&entries).resolve(&state.begins_at);
    entries.insert("beginsAt".to_string(), MomentSpec::Millis(begins_at));
    let ends_at = ResolutionScope::new(&entries).resolve(&state.ends_at);
    entries.insert("endsAt".to_string(), MomentSpec::Millis(ends_at));
    entries
}

fn resolve_begins_at(state: &FrameState) -> f64 {
    let entries = state.named_times.entries();
    ResolutionScope::new(entries).resolve(&state.begins_at)
}

fn resolve_ends_at(state: &FrameState) -> f64 {
    let mut entries = state.named_times.entries().clone();
    let begins_at = ResolutionScope::new(&entries).resolve(&state.begins_at);
    entries.insert("beginsAt".to_string(), MomentSpec::Millis(begins_at));
    ResolutionScope::new(&entries).resolve(&state.ends_at)
}

fn resolve_relative_to(state: &FrameState) -> f64 {
    let entries = derived_entries(state);
    ResolutionScope::new(&entries).resolve(&state.relative_to)
}

/// Resolves every expression-valued field once, against the table as it
/// stands right now. The result is immutable for the rest of the frame's
/// life.
fn freeze(state: &FrameState) -> Frozen {
    let entries = derived_entries(state);
    let scope = ResolutionScope::new(&entries);

    let mut lookup = HashMap::new();
    let mut named_times = HashMap::new();
    for name in entries.keys() {
        let resolved = scope.resolve(&MomentSpec::Text(name.clone()));
        if !is_reserved(name) && !DERIVED_NAMES.contains(&name.as_str()) {
            named_times.insert(name.clone(), resolved);
        }
        lookup.insert(name.clone(), resolved);
    }

    Frozen {
        begins_at: lookup.get("beginsAt").copied().unwrap_or(0.0),
        ends_at: lookup.get("endsAt").copied().unwrap_or(f64::INFINITY),
        ticks_every: state.ticks_every.as_ref().map(parse_duration).unwrap_or(0.0),
        relative_to: scope.resolve(&state.relative_to),
        syncs_to: state.syncs_to.as_ref().map(parse_duration).unwrap_or(0.0),
        named_times,
        lookup: Arc::new(lookup),
    }
}

/// Where the next tick lands. With a sync boundary, ticks align to
/// wall-clock multiples of `sync`; the target is pushed forward by whole
/// sync steps until it is strictly in the future, so a boundary at or
/// behind `now` can never schedule a zero-delay tick loop.
fn next_tick_ms(now: f64, interval: f64, sync: f64) -> f64 {
    if sync > 0.0 {
        let mut target = now + interval - (now + interval) % sync;
        while target <= now {
            target += sync;
        }
        target
    } else {
        now + interval
    }
}

fn spawn_begin(inner: &Arc<FrameInner>, begins_at: f64) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let clock = inner.clock;
    tokio::spawn(async move {
        clock.sleep_until_ms(begins_at).await;
        if let Some(inner) = weak.upgrade() {
            let mut state = inner.write_state();
            if state.is_stopped || state.is_begun || state.is_ended {
                return;
            }
            FrameInner::begin(&inner, &mut state);
        }
    })
}

fn spawn_ticks(inner: &Arc<FrameInner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let clock = inner.clock;
    tokio::spawn(async move {
        loop {
            let target = match weak.upgrade() {
                Some(inner) => {
                    let state = inner.read_state();
                    if state.is_stopped || state.is_ended || state.is_muted {
                        return;
                    }
                    match &state.frozen {
                        Some(frozen) if frozen.ticks_every > 0.0 => {
                            next_tick_ms(clock.now_ms(), frozen.ticks_every, frozen.syncs_to)
                        }
                        _ => return,
                    }
                }
                None => return,
            };

            clock.sleep_until_ms(target).await;

            let Some(inner) = weak.upgrade() else { return };
            // The read guard is held through emit: the end transition takes
            // the write lock before publishing, so a tick can never land
            // after `ended`.
            let state = inner.read_state();
            if state.is_stopped || state.is_ended || state.is_muted {
                return;
            }
            trace!(name = inner.name.as_deref(), "time frame ticked");
            let event = inner.make_event(FrameEventKind::Ticked, &state);
            inner.emit(event);
        }
    })
}

fn spawn_end(inner: &Arc<FrameInner>, ends_at: f64) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let clock = inner.clock;
    tokio::spawn(async move {
        clock.sleep_until_ms(ends_at).await;
        let Some(inner) = weak.upgrade() else { return };
        let mut state = inner.write_state();
        if state.is_stopped || state.is_ended {
            return;
        }
        // Cancel ticking before anything observable happens.
        if let Some(ticks) = state.tick_task.take() {
            ticks.abort();
        }
        state.is_ended = true;
        info!(name = inner.name.as_deref(), "time frame ended");
        let event = inner.make_event(FrameEventKind::Ended, &state);
        inner.emit(event);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaligned_ticks_are_interval_spaced() {
        assert_eq!(next_tick_ms(1_000.0, 50.0, 0.0), 1_050.0);
    }

    #[test]
    fn aligned_ticks_land_on_sync_boundaries() {
        // interval 100, sync 30: the tick snaps back to the boundary
        // preceding now + interval.
        assert_eq!(next_tick_ms(0.0, 100.0, 30.0), 90.0);
        assert_eq!(next_tick_ms(90.0, 100.0, 30.0), 180.0);
    }

    #[test]
    fn degenerate_sync_targets_advance_into_the_future() {
        // interval 30, sync 100: the raw target collapses onto `now` and
        // must be pushed to the next boundary.
        assert_eq!(next_tick_ms(0.0, 30.0, 100.0), 100.0);
        assert_eq!(next_tick_ms(100.0, 30.0, 100.0), 200.0);
    }
}
