//! Recording state machine.
//!
//! The recorder consumes one frame per tick together with the detector's
//! motion verdict and decides, frame by frame, when to open a new clip, when
//! to keep writing, and when to finalize. States:
//!
//! - **IDLE**: no open file. A motion tick opens a new container named from
//!   the frame timestamp and transitions to ACTIVE.
//! - **ACTIVE**: every tick writes the frame and refreshes the last-motion
//!   time while motion persists. When motion stops, the recording rides out
//!   a grace window so a brief pause does not fragment one event into many
//!   clips; once the window expires (or the optional maximum clip length is
//!   reached) the container is finalized and a `Clip` is emitted.
//!
//! A write failure mid-recording finalizes best-effort, logs, and returns to
//! IDLE; it never propagates out of the tick, so a full disk cannot stall
//! frame ingestion. The open file handle is owned exclusively by this state
//! machine and is moved out on the ACTIVE -> IDLE transition.

pub mod avi;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::clip::{self, Clip, UploadState};
use crate::frame::Frame;
use avi::AviWriter;

#[derive(Clone, Debug)]
pub struct RecorderConfig {
    /// Directory finished and in-progress clips live in.
    pub output_dir: PathBuf,
    /// How long a recording stays ACTIVE after the last motion tick.
    pub grace: Duration,
    /// Hard cap on a single clip's length. `None` = unlimited.
    pub max_clip: Option<Duration>,
    /// Nominal frame rate stamped into the container.
    pub fps: u32,
    pub jpeg_quality: u8,
}

struct ActiveRecording {
    writer: AviWriter,
    start_ms: u64,
    last_motion_ms: u64,
}

/// Motion-triggered recorder. At most one recording is active at a time.
pub struct Recorder {
    cfg: RecorderConfig,
    active: Option<ActiveRecording>,
}

impl Recorder {
    pub fn new(cfg: RecorderConfig) -> Self {
        Self { cfg, active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Advance the state machine by one frame.
    ///
    /// Returns a finalized `Clip` on the ACTIVE -> IDLE transition, `None`
    /// otherwise.
    pub fn process(&mut self, frame: &Frame, motion: bool) -> Option<Clip> {
        if self.active.is_none() {
            if !motion {
                return None;
            }
            if let Err(e) = self.start(frame) {
                log::error!("failed to start recording: {:#}", e);
            }
            return None;
        }

        let mut rec = self.active.take()?;
        if motion {
            rec.last_motion_ms = frame.timestamp_ms;
        }

        let elapsed_ms = frame.timestamp_ms.saturating_sub(rec.start_ms);
        let max_exceeded = self
            .cfg
            .max_clip
            .is_some_and(|max| u128::from(elapsed_ms) >= max.as_millis());
        if max_exceeded {
            log::info!(
                "max recording length reached after {:.1}s",
                elapsed_ms as f64 / 1000.0
            );
            return self.finish(rec);
        }

        let since_motion_ms = frame.timestamp_ms.saturating_sub(rec.last_motion_ms);
        if u128::from(since_motion_ms) > self.cfg.grace.as_millis() {
            log::info!(
                "no motion for {:.1}s, finalizing recording",
                since_motion_ms as f64 / 1000.0
            );
            return self.finish(rec);
        }

        if let Err(e) = rec.writer.write_frame(&frame.data) {
            log::warn!("recording write failed: {:#}; finalizing best-effort", e);
            return self.finish(rec);
        }
        self.active = Some(rec);
        None
    }

    /// Finalize any in-progress recording (shutdown path).
    pub fn finalize(&mut self) -> Option<Clip> {
        let rec = self.active.take()?;
        log::info!("finalizing in-progress recording on shutdown");
        self.finish(rec)
    }

    fn start(&mut self, frame: &Frame) -> Result<()> {
        let path = self
            .cfg
            .output_dir
            .join(clip::clip_file_name(frame.timestamp_ms));
        log::info!("motion detected, starting recording {}", path.display());
        let mut writer = AviWriter::create(&path, frame.width, frame.height, self.cfg.fps)
            .context("open recording container")?
            .with_quality(self.cfg.jpeg_quality);
        writer.write_frame(&frame.data)?;
        self.active = Some(ActiveRecording {
            writer,
            start_ms: frame.timestamp_ms,
            last_motion_ms: frame.timestamp_ms,
        });
        Ok(())
    }

    fn finish(&mut self, rec: ActiveRecording) -> Option<Clip> {
        let path = rec.writer.path().to_path_buf();
        match rec.writer.finalize() {
            Ok(summary) => {
                log::info!(
                    "finalized {} ({} frames, {:.1}s)",
                    path.display(),
                    summary.frames,
                    summary.duration_secs()
                );
                Some(Clip {
                    path,
                    start_ms: rec.start_ms,
                    duration_secs: summary.duration_secs(),
                    frames: summary.frames,
                    state: UploadState::Pending,
                })
            }
            Err(e) => {
                // File stays on disk; the startup rescan will pick it up.
                log::error!("failed to finalize {}: {:#}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn recorder(dir: &TempDir, grace_ms: u64, max_clip_ms: Option<u64>) -> Recorder {
        Recorder::new(RecorderConfig {
            output_dir: dir.path().to_path_buf(),
            grace: Duration::from_millis(grace_ms),
            max_clip: max_clip_ms.map(Duration::from_millis),
            fps: 10,
            jpeg_quality: 60,
        })
    }

    fn frame(timestamp_ms: u64, sequence: u64) -> Frame {
        Frame::new(vec![50u8; 64], 8, 8, timestamp_ms, sequence)
    }

    fn clip_files(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[test]
    fn no_motion_never_opens_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 500, None);
        for i in 0..20u64 {
            assert!(rec.process(&frame(i * 100, i + 1), false).is_none());
        }
        assert!(!rec.is_active());
        assert_eq!(clip_files(&dir), 0);
    }

    #[test]
    fn burst_then_grace_expiry_produces_one_clip() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 250, None);

        // Frames every 100ms: motion on frames 3..=6, quiet after.
        let mut clips = Vec::new();
        for i in 1..=12u64 {
            let motion = (3..=6).contains(&i);
            if let Some(clip) = rec.process(&frame(i * 100, i), motion) {
                clips.push(clip);
            }
        }

        assert_eq!(clips.len(), 1);
        let clip = &clips[0];
        assert_eq!(clip.start_ms, 300);
        // Motion frames 3..=6 plus quiet frames 7 and 8 inside the 250ms
        // grace window; frame 9 (300ms after last motion) finalizes.
        assert_eq!(clip.frames, 6);
        assert_eq!(clip.state, UploadState::Pending);
        assert!(clip.path.exists());
        assert!(!rec.is_active());
        assert_eq!(clip_files(&dir), 1);
    }

    #[test]
    fn short_gap_does_not_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 250, None);

        let mut clips = 0;
        for i in 1..=20u64 {
            // Two bursts with a 200ms quiet gap between them (< grace).
            let motion = (2..=4).contains(&i) || (7..=9).contains(&i);
            if rec.process(&frame(i * 100, i), motion).is_some() {
                clips += 1;
            }
        }
        rec.finalize();
        assert_eq!(clips, 1);
        assert_eq!(clip_files(&dir), 1);
    }

    #[test]
    fn long_gap_produces_two_clips() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 250, None);

        let mut clips = Vec::new();
        for i in 1..=20u64 {
            // Two bursts with a 600ms quiet gap between them (> grace).
            let motion = (2..=4).contains(&i) || (11..=13).contains(&i);
            if let Some(clip) = rec.process(&frame(i * 100, i), motion) {
                clips.push(clip);
            }
        }
        if let Some(clip) = rec.finalize() {
            clips.push(clip);
        }

        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0].start_ms, 200);
        assert_eq!(clips[1].start_ms, 1_100);
        assert_eq!(clip_files(&dir), 2);
    }

    #[test]
    fn max_length_caps_a_clip_even_under_motion() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 10_000, Some(450));

        let mut clips = Vec::new();
        for i in 1..=10u64 {
            if let Some(clip) = rec.process(&frame(i * 100, i), true) {
                clips.push(clip);
            }
        }
        rec.finalize();

        // Continuous motion: capped at 450ms, then a new recording starts.
        assert!(!clips.is_empty());
        assert_eq!(clips[0].start_ms, 100);
        assert!(clips[0].duration_secs <= 0.5);
        assert_eq!(clip_files(&dir), 2);
    }

    #[test]
    fn shutdown_finalizes_in_progress_recording() {
        let dir = tempfile::tempdir().unwrap();
        let mut rec = recorder(&dir, 1_000, None);
        assert!(rec.process(&frame(100, 1), true).is_none());
        assert!(rec.is_active());

        let clip = rec.finalize().expect("clip");
        assert_eq!(clip.frames, 1);
        assert!(!rec.is_active());
        assert!(rec.finalize().is_none());
    }
}
