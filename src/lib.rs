//! sentry-cam
//!
//! This crate implements a motion-triggered camera recorder with optional
//! remote offload.
//!
//! # Architecture
//!
//! One real-time loop and one background worker:
//!
//! 1. **Frame loop** (main thread): camera source -> motion detector ->
//!    recording state machine. Must keep up with the camera's frame rate;
//!    nothing on this path blocks on the network.
//! 2. **Offload worker** (background thread): drains finished clips from an
//!    unbounded queue, uploads each with bounded retry, optionally deletes
//!    the local copy after a confirmed upload, and sweeps remote files past
//!    the configured age.
//!
//! The pending-upload queue is durable by construction: a clip *is* its file
//! on disk, named by start timestamp, so a restart rescans the recordings
//! directory and resumes where it left off.
//!
//! # Module Structure
//!
//! - `frame`: timestamped frame value type
//! - `ingest`: camera sources (HTTP MJPEG/JPEG, synthetic stub)
//! - `detect`: frame-difference motion scoring
//! - `record`: recording state machine + AVI container writer
//! - `clip`: finalized clip records and their upload lifecycle
//! - `store`: remote storage capability (trait + HTTP client + test fake)
//! - `offload`: upload worker and retention sweep
//! - `preview`: observational frame sinks
//! - `config`: daemon configuration (file + env + flags)

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod clip;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod offload;
pub mod preview;
pub mod record;
pub mod store;

pub use clip::{Clip, UploadState};
pub use detect::{MotionDetector, MotionScore};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, FrameSource, SourceStats};
pub use offload::{Coordinator, CoordinatorHandle, OffloadConfig};
pub use preview::{NullPreview, PreviewSink, SnapshotPreview};
pub use record::{Recorder, RecorderConfig};
pub use store::{InMemoryRemoteStore, RemoteFileInfo, RemoteId, RemoteStore, StoreError};

/// Current wall-clock time as milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(now.as_millis() as u64)
}
