//! Observational frame sinks.
//!
//! A `PreviewSink` sees every frame the loop processes but can never mutate
//! pipeline state; failures inside a sink are logged and swallowed. Window
//! rendering is out of scope; `SnapshotPreview` covers the headless case by
//! keeping a recent JPEG of the scene on disk.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Something that observes frames. Purely passive.
pub trait PreviewSink {
    fn render(&mut self, frame: &Frame);
}

/// Discards every frame. Used when preview is disabled.
#[derive(Default)]
pub struct NullPreview;

impl PreviewSink for NullPreview {
    fn render(&mut self, _frame: &Frame) {}
}

/// Writes the latest frame as a JPEG, rate-limited so the disk is not part
/// of the per-frame budget.
pub struct SnapshotPreview {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    quality: u8,
}

impl SnapshotPreview {
    pub fn new(path: PathBuf, interval: Duration) -> Self {
        Self {
            path,
            interval,
            last_write: None,
            quality: 75,
        }
    }

    fn write_snapshot(&self, frame: &Frame) -> anyhow::Result<()> {
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            &frame.data,
            frame.width,
            frame.height,
            ExtendedColorType::L8,
        )?;
        // Write-then-rename so readers never see a partial file.
        let tmp = self.path.with_extension("jpg.tmp");
        std::fs::write(&tmp, &jpeg)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl PreviewSink for SnapshotPreview {
    fn render(&mut self, frame: &Frame) {
        if let Some(last) = self.last_write {
            if last.elapsed() < self.interval {
                return;
            }
        }
        self.last_write = Some(Instant::now());
        if let Err(e) = self.write_snapshot(frame) {
            log::warn!("preview snapshot failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(shade: u8) -> Frame {
        Frame::new(vec![shade; 64], 8, 8, 1_000, 1)
    }

    #[test]
    fn snapshot_writes_a_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut preview = SnapshotPreview::new(path.clone(), Duration::ZERO);

        preview.render(&frame(100));
        let bytes = std::fs::read(&path).expect("snapshot written");
        assert_eq!(&bytes[0..2], &[0xFF, 0xD8], "JPEG SOI marker");
    }

    #[test]
    fn snapshot_rate_limits_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.jpg");
        let mut preview = SnapshotPreview::new(path.clone(), Duration::from_secs(60));

        preview.render(&frame(10));
        let first = std::fs::metadata(&path).unwrap().len();
        // Different content, inside the rate limit: must not rewrite.
        preview.render(&Frame::new(vec![200u8; 256], 16, 16, 2_000, 2));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first);
    }
}
