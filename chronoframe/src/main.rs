//! `chronodev`: a small interactive demo of the chronoframe engine.
//!
//! Builds a handful of frames against the system clock, fans their events
//! through a collection, and prints everything until Ctrl-C. Pass a TOML
//! schedule path to run your own frames instead.

use anyhow::Result;
use chronoframe::prelude::*;
use colored::Colorize;
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    println!("{}", "chronoframe demo".cyan().bold());

    let collection = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "loading schedule from file");
            ScheduleConfig::load(&path)?.build_collection(Clock::system())?
        }
        None => demo_collection()?,
    };

    spawn_event_printers(&collection);
    collection.start_all();

    tokio::signal::ctrl_c().await?;
    println!("\n{}", "shutting down".yellow());
    collection.stop_all();
    Ok(())
}

/// A built-in schedule exercising ticks, offsets, and named times.
fn demo_collection() -> Result<FrameCollection> {
    let collection = FrameCollection::new();

    collection.create(FrameOptions {
        name: Some("heartbeat".into()),
        ends_at: Some("30 seconds after now".into()),
        ticks_every: Some("1 second".into()),
        data: json!({ "channel": "demo" }),
        ..FrameOptions::default()
    })?;

    collection.create(FrameOptions {
        name: Some("late-riser".into()),
        begins_at: Some("5 seconds after now".into()),
        ends_at: Some("20 seconds after beginsAt".into()),
        ticks_every: Some("PT2S".into()),
        syncs_to: Some("1 second".into()),
        ..FrameOptions::default()
    })?;

    Ok(collection)
}

/// One printer task per aggregate channel, plus a scoped one to show the
/// `<name>/<event>` form.
fn spawn_event_printers(collection: &FrameCollection) {
    for kind in FrameEventKind::ALL {
        let mut rx = collection.subscribe(kind.collection_channel());
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                let name = event.frame_name.as_deref().unwrap_or("?");
                let label = match event.kind {
                    FrameEventKind::Began => "BEGAN".green().bold(),
                    FrameEventKind::Ended => "ENDED".red().bold(),
                    FrameEventKind::Ticked => "TICK".blue(),
                    FrameEventKind::Muted => "MUTED".yellow(),
                    FrameEventKind::Unmuted => "UNMUTED".yellow(),
                };
                println!(
                    "{:>8} {} at {:.0}ms ({:+.0}ms from reference)",
                    label,
                    name.cyan(),
                    event.at_ms,
                    event.relative_duration(),
                );
            }
        });
    }

    let mut scoped = collection.subscribe("heartbeat/ticked");
    tokio::spawn(async move {
        while let Ok(event) = scoped.recv().await {
            info!(at_ms = event.at_ms, "heartbeat/ticked");
        }
    });
}
