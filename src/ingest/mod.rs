//! Camera frame sources.
//!
//! This module provides the sources the frame loop ingests from:
//! - HTTP MJPEG/JPEG cameras (`http://` / `https://` URLs)
//! - Synthetic source (`stub://` URLs, for tests and development)
//!
//! All sources produce `Frame` instances (luma plane, wall-clock timestamp,
//! sequence number) and pace `next_frame` to the configured target rate.
//! The ingestion layer is responsible for:
//! - Decoding to a single luma plane
//! - Applying the software zoom (center crop) before handing frames on
//! - Rate limiting to the target fps
//!
//! Raw frame acquisition hardware (sensor setup, exposure) is outside this
//! crate; anything that can speak MJPEG over HTTP can feed it.

mod http;
mod normalize;
mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::Frame;
pub use http::HttpCameraSource;
pub use normalize::crop_center;
pub use synthetic::SyntheticCameraSource;

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Source URL: `http(s)://` for MJPEG/JPEG cameras, `stub://` synthetic.
    pub url: String,
    /// Frame width (synthetic frames; HTTP frames carry their own).
    pub width: u32,
    pub height: u32,
    /// Target frame rate; sources pace or decimate to this.
    pub target_fps: u32,
    /// Software zoom as a center-crop factor in (0, 1]. 1.0 = full frame.
    pub zoom: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 1280,
            height: 720,
            target_fps: 10,
            zoom: 1.0,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A continuous source of timestamped frames.
pub trait FrameSource {
    /// Establish the stream. Fatal at daemon startup if this fails.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame, blocking until one is available.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Reconfigure the software zoom (center-crop factor in (0, 1]).
    fn set_zoom(&mut self, zoom: f32) -> Result<()>;

    /// Whether the source has produced a frame recently.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Camera source front: dispatches on the URL scheme.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCameraSource),
    Http(HttpCameraSource),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        validate_zoom(config.zoom)?;
        let backend = if config.url.starts_with("stub://") {
            CameraBackend::Synthetic(SyntheticCameraSource::new(config))
        } else if config.url.starts_with("http://") || config.url.starts_with("https://") {
            CameraBackend::Http(HttpCameraSource::new(config)?)
        } else {
            return Err(anyhow!(
                "unsupported camera url '{}'; expected http(s):// or stub://",
                config.url
            ));
        };
        Ok(Self { backend })
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            CameraBackend::Http(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            CameraBackend::Http(source) => source.next_frame(),
        }
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.set_zoom(zoom),
            CameraBackend::Http(source) => source.set_zoom(zoom),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            CameraBackend::Http(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            CameraBackend::Http(source) => source.stats(),
        }
    }
}

pub(crate) fn validate_zoom(zoom: f32) -> Result<()> {
    if zoom > 0.0 && zoom <= 1.0 {
        Ok(())
    } else {
        Err(anyhow!("zoom must be in (0, 1], got {}", zoom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_stub_urls_to_synthetic() -> Result<()> {
        let mut source = CameraSource::new(CameraConfig {
            url: "stub://front_door".to_string(),
            target_fps: 1_000,
            ..CameraConfig::default()
        })?;
        source.connect()?;
        let frame = source.next_frame()?;
        assert_eq!(frame.width, 1280);
        assert_eq!(frame.sequence, 1);
        Ok(())
    }

    #[test]
    fn rejects_unknown_schemes() {
        let result = CameraSource::new(CameraConfig {
            url: "rtsp://camera".to_string(),
            ..CameraConfig::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn rejects_out_of_range_zoom() {
        for zoom in [0.0, -0.5, 1.5] {
            let result = CameraSource::new(CameraConfig {
                url: "stub://camera".to_string(),
                zoom,
                ..CameraConfig::default()
            });
            assert!(result.is_err(), "zoom {} must be rejected", zoom);
        }
    }
}
