//! End-to-end lifecycle tests for a single time frame, driven on Tokio's
//! paused virtual clock so every timestamp is exact.

use chronoframe::prelude::*;
use serde_json::json;
use std::time::Duration;

fn frame(options: FrameOptions) -> TimeFrame {
    TimeFrame::with_clock(options, Clock::fixed(0.0))
}

#[tokio::test(start_paused = true)]
async fn begins_at_the_scheduled_moment() {
    let frame = frame(FrameOptions {
        begins_at: Some(1_000.0.into()),
        ..FrameOptions::default()
    });
    let mut began = frame.subscribe("began");

    frame.start();
    assert!(frame.is_started());
    assert!(!frame.is_begun());

    let event = began.recv().await.unwrap();
    assert_eq!(event.kind, FrameEventKind::Began);
    assert_eq!(event.at_ms, 1_000.0);
    assert!(frame.is_begun());
    assert!(!frame.is_ended());
}

#[tokio::test(start_paused = true)]
async fn ticks_between_begin_and_end() {
    let frame = frame(FrameOptions {
        begins_at: Some(0.0.into()),
        ends_at: Some(4_500.0.into()),
        ticks_every: Some("1 second".into()),
        ..FrameOptions::default()
    });
    let mut events = frame.subscribe_events();

    frame.start();

    let mut seen = Vec::new();
    loop {
        let event = events.recv().await.unwrap();
        let done = event.kind == FrameEventKind::Ended;
        seen.push((event.kind, event.at_ms));
        if done {
            break;
        }
    }

    assert_eq!(
        seen,
        vec![
            (FrameEventKind::Began, 0.0),
            (FrameEventKind::Ticked, 1_000.0),
            (FrameEventKind::Ticked, 2_000.0),
            (FrameEventKind::Ticked, 3_000.0),
            (FrameEventKind::Ticked, 4_000.0),
            (FrameEventKind::Ended, 4_500.0),
        ]
    );
    assert!(frame.is_ended());
}

#[tokio::test(start_paused = true)]
async fn synced_ticks_align_to_the_boundary() {
    let frame = TimeFrame::with_clock(
        FrameOptions {
            ticks_every: Some(1_000.0.into()),
            syncs_to: Some(3_000.0.into()),
            ..FrameOptions::default()
        },
        Clock::fixed(500.0),
    );
    let mut ticks = frame.subscribe("ticked");

    frame.start();
    assert_eq!(ticks.recv().await.unwrap().at_ms, 3_000.0);
    assert_eq!(ticks.recv().await.unwrap().at_ms, 6_000.0);
}

#[tokio::test(start_paused = true)]
async fn a_frame_already_over_ends_silently() {
    let frame = TimeFrame::with_clock(
        FrameOptions {
            ends_at: Some(5_000.0.into()),
            ..FrameOptions::default()
        },
        Clock::fixed(10_000.0),
    );
    let mut events = frame.subscribe_events();

    frame.start();
    assert!(frame.is_started());
    assert!(frame.is_ended());
    assert!(!frame.is_begun());
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn mute_suppresses_ticks_without_pausing_the_frame() {
    let frame = frame(FrameOptions {
        ticks_every: Some(1_000.0.into()),
        ..FrameOptions::default()
    });
    let mut ticks = frame.subscribe("ticked");
    let mut muted = frame.subscribe("muted");
    let mut unmuted = frame.subscribe("unmuted");

    frame.start();
    assert_eq!(ticks.recv().await.unwrap().at_ms, 1_000.0);

    frame.mute();
    assert!(frame.is_muted());
    assert_eq!(muted.recv().await.unwrap().at_ms, 1_000.0);

    // Three full intervals pass in silence.
    tokio::time::sleep(Duration::from_millis(3_000)).await;

    frame.unmute();
    assert_eq!(unmuted.recv().await.unwrap().at_ms, 4_000.0);

    // Ticking resumes one interval after the unmute; the muted window is
    // never replayed.
    assert_eq!(ticks.recv().await.unwrap().at_ms, 5_000.0);
}

#[tokio::test(start_paused = true)]
async fn stop_is_terminal_and_silent() {
    let frame = frame(FrameOptions {
        ticks_every: Some(1_000.0.into()),
        ends_at: Some(10_000.0.into()),
        ..FrameOptions::default()
    });
    let mut events = frame.subscribe_events();

    frame.start();
    assert_eq!(events.recv().await.unwrap().kind, FrameEventKind::Began);

    frame.stop();
    assert!(frame.is_stopped());

    // Past both the next tick and the end moment: nothing fires.
    tokio::time::sleep(Duration::from_millis(15_000)).await;
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // Stopped frames can never be restarted.
    frame.start();
    assert!(!frame.is_ended());
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn repeated_control_calls_fire_no_duplicate_events() {
    let frame = frame(FrameOptions {
        ticks_every: Some(1_000.0.into()),
        ..FrameOptions::default()
    });
    let mut events = frame.subscribe_events();

    // A second start is a no-op: exactly one began.
    frame.start();
    frame.start();
    assert_eq!(events.recv().await.unwrap().kind, FrameEventKind::Began);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // Muting while muted emits no second muted.
    frame.mute();
    frame.mute();
    assert_eq!(events.recv().await.unwrap().kind, FrameEventKind::Muted);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));

    // A second stop changes nothing and emits nothing.
    frame.stop();
    frame.stop();
    assert!(frame.is_stopped());
    tokio::time::sleep(Duration::from_millis(3_000)).await;
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn configuration_freezes_at_start() {
    let frame = frame(FrameOptions {
        begins_at: Some("launch".into()),
        named_times: [("launch".to_string(), MomentSpec::from(2_000.0))].into(),
        ..FrameOptions::default()
    });

    assert_eq!(frame.begins_at(), 2_000.0);

    // Mutable until started: moving the named time moves the resolution.
    frame
        .extend_named_times([("launch", MomentSpec::from(3_000.0))])
        .unwrap();
    assert_eq!(frame.begins_at(), 3_000.0);

    frame.start();
    assert_eq!(
        frame.set_begins_at(9_000.0).unwrap_err(),
        FrameError::Immutable
    );
    assert_eq!(frame.set_ticks_every(50.0).unwrap_err(), FrameError::Immutable);
    assert_eq!(
        frame
            .extend_named_times([("launch", MomentSpec::from(0.0))])
            .unwrap_err(),
        FrameError::Immutable
    );
    assert_eq!(frame.begins_at(), 3_000.0);
}

#[tokio::test(start_paused = true)]
async fn empty_values_are_rejected_before_start() {
    let frame = frame(FrameOptions::default());
    assert_eq!(
        frame.set_ends_at("  ").unwrap_err(),
        FrameError::MissingParameter("endsAt")
    );
    assert_eq!(
        frame.set_data(serde_json::Value::Null).unwrap_err(),
        FrameError::MissingParameter("data")
    );
    assert_eq!(
        frame
            .extend_named_times(Vec::<(String, MomentSpec)>::new())
            .unwrap_err(),
        FrameError::MissingParameter("namedTimes")
    );
}

#[tokio::test(start_paused = true)]
async fn events_carry_the_frozen_named_time_lookup() {
    let frame = frame(FrameOptions {
        name: Some("mission".into()),
        ends_at: Some(8_000.0.into()),
        relative_to: Some("endsAt".into()),
        named_times: [("checkpoint".to_string(), MomentSpec::from(6_000.0))].into(),
        data: json!({ "crew": 3 }),
        ..FrameOptions::default()
    });
    let mut began = frame.subscribe("began");

    frame.start();
    let event = began.recv().await.unwrap();

    assert_eq!(event.frame_name.as_deref(), Some("mission"));
    assert_eq!(event.user_data["crew"], 3);
    assert_eq!(event.relative_to_ms, 8_000.0);
    // Began at 0, reference at the end: the whole span is still ahead.
    assert_eq!(event.relative_duration(), 8_000.0);
    assert_eq!(event.duration_relative_to("checkpoint"), Ok(6_000.0));
    assert_eq!(event.duration_relative_to("beginsAt"), Ok(0.0));
    assert_eq!(
        event.duration_relative_to("nowhere"),
        Err(FrameError::UnknownNamedTime("nowhere".to_string()))
    );
}

#[tokio::test(start_paused = true)]
async fn duration_relative_to_tracks_the_clock() {
    let frame = frame(FrameOptions {
        named_times: [("deadline".to_string(), MomentSpec::from(5_000.0))].into(),
        ..FrameOptions::default()
    });

    assert_eq!(frame.duration_relative_to("deadline"), Ok(5_000.0));
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert_eq!(frame.duration_relative_to("deadline"), Ok(3_000.0));
    assert_eq!(
        frame.duration_relative_to(""),
        Err(FrameError::MissingParameter("name"))
    );
}

#[tokio::test(start_paused = true)]
async fn snapshots_serialize_the_resolved_schedule() {
    let frame = frame(FrameOptions {
        name: Some("window".into()),
        begins_at: Some(1_000.0.into()),
        ticks_every: Some("PT1S".into()),
        ..FrameOptions::default()
    });
    frame.start();

    let json = frame.to_json();
    assert_eq!(json["name"], "window");
    assert_eq!(json["state"]["is_started"], true);
    assert_eq!(json["begins_at"], 1_000.0);
    assert_eq!(json["ticks_every"], 1_000.0);
    // An unbounded end has no JSON number representation.
    assert_eq!(json["ends_at"], serde_json::Value::Null);
}

#[tokio::test(start_paused = true)]
async fn sentence_expressions_drive_the_schedule() {
    let frame = frame(FrameOptions {
        begins_at: Some("1 second after launch".into()),
        ends_at: Some("interpolated 50% between launch and cutoff".into()),
        named_times: [
            ("launch".to_string(), MomentSpec::from(2_000.0)),
            ("cutoff".to_string(), MomentSpec::from(10_000.0)),
        ]
        .into(),
        ..FrameOptions::default()
    });
    let mut events = frame.subscribe_events();

    frame.start();
    assert_eq!(events.recv().await.unwrap().at_ms, 3_000.0);
    let ended = events.recv().await.unwrap();
    assert_eq!(ended.kind, FrameEventKind::Ended);
    assert_eq!(ended.at_ms, 6_000.0);
}
