//! Declarative frame schedules loaded from configuration files.
//!
//! A schedule is a TOML (or any `config`-supported) document listing named
//! times and frame definitions. It can be deserialized on its own or turned
//! directly into a running [`FrameCollection`].
//!
//! ```toml
//! [named_times]
//! launch = "2026-09-01T12:00:00Z"
//!
//! [[frames]]
//! name = "countdown"
//! ends_at = "launch"
//! ticks_every = "PT1S"
//! ```

use crate::collection::FrameCollection;
use crate::errors::Result;
use crate::frame::FrameOptions;
use crate::time::moment::MomentSpec;
use crate::time::Clock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// A complete frame schedule: shared named times plus frame definitions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// Named times visible to every frame in the schedule. A frame's own
    /// entry with the same name wins.
    #[serde(default)]
    pub named_times: HashMap<String, MomentSpec>,

    /// The frames to build, in declaration order.
    #[serde(default)]
    pub frames: Vec<FrameOptions>,
}

impl ScheduleConfig {
    /// Loads a schedule from a file, with `CHRONOFRAME_`-prefixed
    /// environment variables layered on top.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let builder = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(config::Environment::with_prefix("CHRONOFRAME").separator("__"));

        let schedule: Self = builder.build()?.try_deserialize()?;
        info!(path = %path.display(), frames = schedule.frames.len(), "loaded frame schedule");
        Ok(schedule)
    }

    /// Parses a schedule from a TOML string.
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml));
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Builds a collection containing every configured frame, scheduling
    /// against `clock`. Frames are created but not started. Fails on
    /// unnamed or duplicate frame names; no frame from a failing schedule
    /// is left running.
    pub fn build_collection(&self, clock: Clock) -> Result<FrameCollection> {
        let collection = FrameCollection::with_clock(clock);
        for options in &self.frames {
            let mut options = options.clone();
            for (name, spec) in &self.named_times {
                options
                    .named_times
                    .entry(name.clone())
                    .or_insert_with(|| spec.clone());
            }
            if let Err(err) = collection.create(options) {
                collection.stop_all();
                return Err(err);
            }
        }
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::duration::parse_duration;

    const SCHEDULE: &str = r#"
        [named_times]
        launch = 120000

        [[frames]]
        name = "countdown"
        ends_at = "launch"
        ticks_every = "PT1S"

        [[frames]]
        name = "mission"
        begins_at = "launch"
        ticks_every = "5 minutes"
        data = { crew = 3 }
    "#;

    #[test]
    fn parses_a_toml_schedule() {
        let schedule = ScheduleConfig::from_toml(SCHEDULE).unwrap();
        assert_eq!(schedule.frames.len(), 2);
        assert_eq!(schedule.frames[0].name.as_deref(), Some("countdown"));
        let ticks = schedule.frames[1].ticks_every.as_ref().unwrap();
        assert_eq!(parse_duration(ticks), 300_000.0);
        assert_eq!(schedule.frames[1].data["crew"], 3);
    }

    #[tokio::test]
    async fn builds_a_collection_with_shared_named_times() {
        let schedule = ScheduleConfig::from_toml(SCHEDULE).unwrap();
        let collection = schedule.build_collection(Clock::fixed(0.0)).unwrap();
        assert_eq!(collection.len(), 2);

        // The shared `launch` name resolves inside both frames.
        assert_eq!(collection.get("countdown").unwrap().ends_at(), 120_000.0);
        assert_eq!(collection.get("mission").unwrap().begins_at(), 120_000.0);
    }

    #[tokio::test]
    async fn duplicate_schedule_names_fail() {
        let schedule = ScheduleConfig::from_toml(
            r#"
            [[frames]]
            name = "twin"
            [[frames]]
            name = "twin"
            "#,
        )
        .unwrap();
        assert!(schedule.build_collection(Clock::fixed(0.0)).is_err());
    }
}
