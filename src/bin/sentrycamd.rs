//! sentrycamd - motion-triggered camera recorder daemon
//!
//! This daemon:
//! 1. Ingests frames from the configured camera source
//! 2. Scores each frame against the previous one for motion
//! 3. Records clips while motion persists (plus a grace window)
//! 4. Hands finished clips to the offload worker for upload
//! 5. Sweeps remote recordings past the configured age
//!
//! The frame loop runs on the main thread at the camera's rate; uploads and
//! retention never touch it. Ctrl-C finalizes any in-progress recording
//! before exiting.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentry_cam::clip::scan_pending_clips;
use sentry_cam::config::{DaemonArgs, DaemonConfig};
use sentry_cam::store::HttpRemoteStore;
use sentry_cam::{
    CameraSource, Clip, Coordinator, CoordinatorHandle, FrameSource, MotionDetector, NullPreview,
    PreviewSink, Recorder, SnapshotPreview,
};

/// Consecutive capture failures tolerated before giving up on the camera.
const MAX_CAPTURE_ERRORS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const PREVIEW_INTERVAL: Duration = Duration::from_secs(1);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = DaemonArgs::parse();
    let cfg = DaemonConfig::load(&args)?;

    std::fs::create_dir_all(&cfg.recording_dir).with_context(|| {
        format!(
            "create recordings directory {}",
            cfg.recording_dir.display()
        )
    })?;

    // Camera init failure is the one unrecoverable startup error.
    let mut source = CameraSource::new(cfg.camera())?;
    source.connect().context("camera initialization failed")?;

    let mut detector = MotionDetector::new(cfg.min_pixel_diff);
    let mut recorder = Recorder::new(cfg.recorder());
    let mut preview: Box<dyn PreviewSink> = if cfg.preview {
        Box::new(SnapshotPreview::new(cfg.preview_path(), PREVIEW_INTERVAL))
    } else {
        Box::new(NullPreview)
    };

    let (clip_tx, coordinator) = if cfg.drive_upload {
        let store = HttpRemoteStore::new(cfg.http_store())?;
        let (tx, handle) = Coordinator::new(cfg.offload()).spawn(store)?;
        // Resume anything an earlier run left behind.
        let pending = scan_pending_clips(&cfg.recording_dir)?;
        if !pending.is_empty() {
            log::info!("resuming {} pending upload(s) from disk", pending.len());
        }
        for clip in pending {
            let _ = tx.send(clip);
        }
        (Some(tx), Some(handle))
    } else {
        (None, None)
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("set Ctrl-C handler")?;
    }

    log::info!(
        "sentrycamd running. camera={} recording to {}",
        cfg.camera_url,
        cfg.recording_dir.display()
    );
    log::info!(
        "sensitivity={} grace={}s upload={}",
        cfg.min_pixel_diff,
        cfg.grace_seconds,
        if cfg.drive_upload { "on" } else { "off" }
    );

    let mut last_health_log = Instant::now();
    let mut capture_errors = 0u32;

    while !shutdown.load(Ordering::SeqCst) {
        let frame = match source.next_frame() {
            Ok(frame) => {
                capture_errors = 0;
                frame
            }
            Err(e) => {
                capture_errors += 1;
                log::warn!(
                    "frame capture failed ({}/{}): {:#}",
                    capture_errors,
                    MAX_CAPTURE_ERRORS,
                    e
                );
                if capture_errors >= MAX_CAPTURE_ERRORS {
                    finish_pipeline(&mut recorder, clip_tx, coordinator);
                    return Err(anyhow!(
                        "camera failed after {} reconnect attempts",
                        MAX_CAPTURE_ERRORS
                    ));
                }
                std::thread::sleep(RECONNECT_DELAY);
                if let Err(e) = source.connect() {
                    log::warn!("camera reconnect failed: {:#}", e);
                }
                continue;
            }
        };

        let score = detector.score(&frame);
        let motion = detector.is_motion(score);
        if let Some(clip) = recorder.process(&frame, motion) {
            dispatch_clip(clip, &clip_tx);
        }
        preview.render(&frame);

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            log::debug!(
                "camera health={} frames={} score={:.2} recording={}",
                source.is_healthy(),
                stats.frames_captured,
                score.magnitude,
                recorder.is_active()
            );
            last_health_log = Instant::now();
        }
    }

    log::info!("shutdown signal received");
    finish_pipeline(&mut recorder, clip_tx, coordinator);
    log::info!("sentrycamd stopped");
    Ok(())
}

/// Finalize any in-progress recording, hand it off, and drain the worker.
fn finish_pipeline(
    recorder: &mut Recorder,
    clip_tx: Option<Sender<Clip>>,
    coordinator: Option<CoordinatorHandle>,
) {
    if let Some(clip) = recorder.finalize() {
        dispatch_clip(clip, &clip_tx);
    }
    drop(clip_tx);
    if let Some(handle) = coordinator {
        handle.join();
    }
}

fn dispatch_clip(clip: Clip, clip_tx: &Option<Sender<Clip>>) {
    match clip_tx {
        Some(tx) => {
            if tx.send(clip).is_err() {
                log::warn!("offload worker is gone; clip kept on disk for next start");
            }
        }
        // Local-only mode: the clip stays where the recorder put it.
        None => log::debug!("upload disabled, keeping {}", clip.path.display()),
    }
}
