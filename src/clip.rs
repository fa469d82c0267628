//! Finalized clip records.
//!
//! A `Clip` is a closed video file plus its upload lifecycle state. The file
//! name encodes the recording start timestamp (`rec_<start_ms>.avi`), so the
//! set of pending uploads can always be recovered from a plain directory
//! listing: no database, no in-memory bookkeeping that a crash could lose.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::record::avi;

const CLIP_PREFIX: &str = "rec_";
const CLIP_EXTENSION: &str = "avi";

/// Upload lifecycle of a finalized clip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    /// Finalized, not yet uploaded.
    Pending,
    /// Confirmed on the remote store.
    Uploaded,
    /// Last upload attempt failed; still eligible for retry.
    Failed,
    /// Uploaded and the local file has been removed.
    DeletedLocal,
}

/// A finalized recording on disk.
#[derive(Clone, Debug)]
pub struct Clip {
    pub path: PathBuf,
    /// Recording start, milliseconds since the Unix epoch.
    pub start_ms: u64,
    pub duration_secs: f64,
    pub frames: u32,
    pub state: UploadState,
}

impl Clip {
    /// File name (without directory) this clip uploads under.
    pub fn file_name(&self) -> String {
        clip_file_name(self.start_ms)
    }

    /// Recover a clip record from a finished file on disk.
    ///
    /// Start time comes from the file name; frame count and duration come
    /// from probing the container header. A file that was never finalized
    /// (crash mid-recording) probes with zero frames and is still offered
    /// for upload rather than silently dropped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("clip path has no file name: {}", path.display()))?;
        let start_ms = parse_clip_start_ms(name)
            .ok_or_else(|| anyhow!("not a clip file name: {}", name))?;
        let summary = avi::probe(path)
            .with_context(|| format!("probe clip container {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            start_ms,
            duration_secs: summary.duration_secs(),
            frames: summary.frames,
            state: UploadState::Pending,
        })
    }
}

/// Deterministic clip file name for a recording start time.
pub fn clip_file_name(start_ms: u64) -> String {
    format!("{CLIP_PREFIX}{start_ms}.{CLIP_EXTENSION}")
}

/// Sidecar marker recording that a clip was uploaded but kept locally.
///
/// Without it, a restart could not tell an uploaded-and-kept clip from a
/// pending one by looking at the directory, and would upload it again.
pub fn uploaded_marker_path(clip_path: &Path) -> PathBuf {
    let mut name = clip_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".uploaded");
    clip_path.with_file_name(name)
}

/// Parse the start timestamp back out of a clip file name.
pub fn parse_clip_start_ms(file_name: &str) -> Option<u64> {
    let stem = file_name
        .strip_prefix(CLIP_PREFIX)?
        .strip_suffix(&format!(".{CLIP_EXTENSION}"))?;
    stem.parse().ok()
}

/// List finished clip files in a recordings directory, oldest first.
///
/// Used at startup to rebuild the pending-upload queue after a restart or
/// crash. Non-clip files are ignored; clip files that fail to probe are
/// logged and skipped so one corrupt file cannot wedge the resume.
pub fn scan_pending_clips(dir: &Path) -> Result<Vec<Clip>> {
    let mut clips = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("list recordings directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if parse_clip_start_ms(name).is_none() {
            continue;
        }
        if uploaded_marker_path(&path).exists() {
            continue;
        }
        match Clip::from_file(&path) {
            Ok(clip) => clips.push(clip),
            Err(e) => log::warn!("skipping unreadable clip {}: {:#}", path.display(), e),
        }
    }
    clips.sort_by_key(|clip| clip.start_ms);
    Ok(clips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_round_trips_start_time() {
        let name = clip_file_name(1_754_560_123_456);
        assert_eq!(name, "rec_1754560123456.avi");
        assert_eq!(parse_clip_start_ms(&name), Some(1_754_560_123_456));
    }

    #[test]
    fn rejects_foreign_file_names() {
        assert_eq!(parse_clip_start_ms("rec_.avi"), None);
        assert_eq!(parse_clip_start_ms("rec_12x4.avi"), None);
        assert_eq!(parse_clip_start_ms("preview.jpg"), None);
        assert_eq!(parse_clip_start_ms("rec_123.mp4"), None);
    }

    #[test]
    fn scan_orders_clips_and_ignores_strays() {
        let dir = tempfile::tempdir().expect("temp dir");
        for start_ms in [3_000u64, 1_000, 2_000] {
            let path = dir.path().join(clip_file_name(start_ms));
            let mut writer =
                avi::AviWriter::create(&path, 8, 8, 10).expect("create clip");
            writer.write_frame(&[0u8; 64]).expect("write frame");
            writer.finalize().expect("finalize clip");
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignore me").expect("stray file");

        let clips = scan_pending_clips(dir.path()).expect("scan");
        let starts: Vec<u64> = clips.iter().map(|c| c.start_ms).collect();
        assert_eq!(starts, vec![1_000, 2_000, 3_000]);
        assert!(clips.iter().all(|c| c.state == UploadState::Pending));
        assert!(clips.iter().all(|c| c.frames == 1));
    }

    #[test]
    fn scan_skips_clips_already_marked_uploaded() {
        let dir = tempfile::tempdir().expect("temp dir");
        for start_ms in [1_000u64, 2_000] {
            let path = dir.path().join(clip_file_name(start_ms));
            let mut writer =
                avi::AviWriter::create(&path, 8, 8, 10).expect("create clip");
            writer.write_frame(&[0u8; 64]).expect("write frame");
            writer.finalize().expect("finalize clip");
        }
        let uploaded = dir.path().join(clip_file_name(1_000));
        std::fs::write(uploaded_marker_path(&uploaded), b"").expect("marker");

        let clips = scan_pending_clips(dir.path()).expect("scan");
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[0].start_ms, 2_000);
    }
}
