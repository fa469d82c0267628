//! End-to-end pipeline scenarios: detector verdicts driving the recorder,
//! finished clips flowing through the offload worker against the in-memory
//! store fake.

use std::time::{Duration, Instant};

use sentry_cam::clip::scan_pending_clips;
use sentry_cam::offload::{Coordinator, OffloadConfig};
use sentry_cam::record::{Recorder, RecorderConfig};
use sentry_cam::store::InMemoryRemoteStore;
use sentry_cam::{Frame, MotionDetector, MotionScore, UploadState};

fn recorder_config(dir: &std::path::Path, grace_ms: u64) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.to_path_buf(),
        grace: Duration::from_millis(grace_ms),
        max_clip: None,
        fps: 10,
        jpeg_quality: 60,
    }
}

fn offload_config() -> OffloadConfig {
    OffloadConfig {
        backoff_base: Duration::from_millis(10),
        backoff_cap: Duration::from_millis(50),
        auth_recheck: Duration::from_millis(25),
        sweep_interval: Duration::from_millis(40),
        ..OffloadConfig::default()
    }
}

fn frame(timestamp_ms: u64, sequence: u64) -> Frame {
    Frame::new(vec![40u8; 64], 8, 8, timestamp_ms, sequence)
}

fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

/// Scenario A: threshold 5.0, frames 3..=6 score 8.0, all others 1.0.
/// Exactly one clip, starting at frame 3 and extending through the grace
/// window after frame 6.
#[test]
fn scored_burst_produces_exactly_one_clip() {
    let dir = tempfile::tempdir().unwrap();
    let detector = MotionDetector::new(5.0);
    let mut recorder = Recorder::new(recorder_config(dir.path(), 250));

    let mut clips = Vec::new();
    for i in 1..=10u64 {
        let score = MotionScore {
            timestamp_ms: i * 100,
            magnitude: if (3..=6).contains(&i) { 8.0 } else { 1.0 },
        };
        let motion = detector.is_motion(score);
        if let Some(clip) = recorder.process(&frame(i * 100, i), motion) {
            clips.push(clip);
        }
    }

    assert_eq!(clips.len(), 1);
    let clip = &clips[0];
    assert_eq!(clip.start_ms, 300, "clip starts at the first motion frame");
    // Frames 3..=6 above threshold plus frames 7 and 8 inside the 250ms
    // grace window; frame 9 expires the window and finalizes.
    assert_eq!(clip.frames, 6);
    assert_eq!(clip.state, UploadState::Pending);
    assert!(clip.path.exists());
}

#[test]
fn bursts_split_by_more_than_the_grace_window_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let detector = MotionDetector::new(5.0);
    let mut recorder = Recorder::new(recorder_config(dir.path(), 250));

    let mut clips = Vec::new();
    for i in 1..=24u64 {
        let magnitude = if (2..=4).contains(&i) || (14..=16).contains(&i) {
            9.0
        } else {
            0.5
        };
        let score = MotionScore {
            timestamp_ms: i * 100,
            magnitude,
        };
        if let Some(clip) = recorder.process(&frame(i * 100, i), detector.is_motion(score)) {
            clips.push(clip);
        }
    }

    assert_eq!(clips.len(), 2, "a gap well past the grace window fragments");
    assert_eq!(clips[0].start_ms, 200);
    assert_eq!(clips[1].start_ms, 1_400);
}

/// Scenario B: the store fails twice, then succeeds. The clip ends
/// UPLOADED after exactly three attempts with backoff delays between them.
#[test]
fn recorded_clip_uploads_after_two_transient_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = Recorder::new(recorder_config(dir.path(), 200));

    // Record a real clip: motion, then silence past the grace window.
    let mut clip = None;
    for i in 1..=8u64 {
        let motion = i <= 3;
        if let Some(finished) = recorder.process(&frame(i * 100, i), motion) {
            clip = Some(finished);
        }
    }
    let clip = clip.expect("one finished clip");
    let clip_name = clip.file_name();

    let store = InMemoryRemoteStore::new();
    store.fail_next_uploads(2);
    let (tx, handle) = Coordinator::new(offload_config())
        .spawn(store.clone())
        .unwrap();

    let started = Instant::now();
    tx.send(clip).unwrap();
    drop(tx);
    handle.join();

    assert_eq!(store.upload_attempts(), 3);
    assert_eq!(store.uploaded_names(), vec![clip_name]);
    // Backoff of 10ms then 20ms (plus jitter) separated the attempts.
    assert!(started.elapsed() >= Duration::from_millis(30));
}

/// Round trip: PENDING -> UPLOADED exactly once, then local delete. The
/// file exists until the upload is confirmed and not after.
#[test]
fn confirmed_upload_then_local_delete_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = Recorder::new(recorder_config(dir.path(), 200));

    let mut clip = None;
    for i in 1..=8u64 {
        if let Some(finished) = recorder.process(&frame(i * 100, i), i <= 2) {
            clip = Some(finished);
        }
    }
    let clip = clip.expect("one finished clip");
    let local_path = clip.path.clone();
    assert!(local_path.exists());

    let store = InMemoryRemoteStore::new();
    let cfg = OffloadConfig {
        delete_local_after_upload: true,
        ..offload_config()
    };
    let (tx, handle) = Coordinator::new(cfg).spawn(store.clone()).unwrap();
    let stats = handle.stats();

    tx.send(clip).unwrap();
    drop(tx);
    handle.join();

    assert_eq!(stats.clips_uploaded(), 1, "uploaded exactly once");
    assert_eq!(stats.locals_deleted(), 1, "local delete exactly once");
    assert!(!local_path.exists());
    assert_eq!(store.remote_count(), 1);
}

/// Scenario C: retention max age 604800s against remote ages 700000s and
/// 100000s deletes only the older file, and a second pass deletes nothing.
#[test]
fn retention_sweep_deletes_only_expired_files_idempotently() {
    let store = InMemoryRemoteStore::new();
    store.insert_remote_file("rec_100.avi", Duration::from_secs(700_000));
    store.insert_remote_file("rec_200.avi", Duration::from_secs(100_000));

    let cfg = OffloadConfig {
        remote_max_age: Some(Duration::from_secs(604_800)),
        ..offload_config()
    };
    let (tx, handle) = Coordinator::new(cfg).spawn(store.clone()).unwrap();
    let stats = handle.stats();

    // Let at least two sweep passes run.
    assert!(wait_until(2_000, || stats.sweeps() >= 2));
    drop(tx);
    handle.join();

    assert_eq!(stats.remote_deleted(), 1);
    assert_eq!(store.remote_count(), 1);
    assert_eq!(store.uploaded_names(), vec!["rec_200.avi"]);
}

/// A restart forgets nothing: pending clips are rebuilt from the directory
/// listing and uploaded.
#[test]
fn pending_clips_resume_from_a_directory_listing() {
    let dir = tempfile::tempdir().unwrap();

    // Two finished clips from a "previous run".
    let mut recorder = Recorder::new(recorder_config(dir.path(), 100));
    for i in 1..=6u64 {
        recorder.process(&frame(i * 100, i), i == 1);
    }
    for i in 10..=16u64 {
        recorder.process(&frame(i * 100, i), i == 10);
    }
    drop(recorder);

    let pending = scan_pending_clips(dir.path()).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|c| c.state == UploadState::Pending));

    let store = InMemoryRemoteStore::new();
    let (tx, handle) = Coordinator::new(offload_config())
        .spawn(store.clone())
        .unwrap();
    for clip in pending {
        tx.send(clip).unwrap();
    }
    drop(tx);
    handle.join();

    assert_eq!(store.uploaded_names().len(), 2);
}
