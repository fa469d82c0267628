//! HTTP camera source.
//!
//! Ingests frames from cameras that serve JPEG over HTTP, in either flavor:
//! - an MJPEG stream (`multipart/x-mixed-replace`): one connection, frames
//!   scanned out of the byte stream;
//! - a still endpoint: one GET per frame.
//!
//! Frames are decoded to a luma plane in-memory, center-cropped per the
//! configured zoom, and decimated to the target fps.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use super::normalize::crop_center;
use super::{validate_zoom, CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;
use crate::now_ms;

/// Upper bound on a single JPEG frame.
const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum HttpStream {
    /// Persistent MJPEG connection.
    Mjpeg(Box<dyn Read + Send>),
    /// Still endpoint, fetched per frame.
    SingleJpeg,
}

/// HTTP MJPEG/JPEG frame source.
pub struct HttpCameraSource {
    config: CameraConfig,
    zoom: f32,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
}

impl HttpCameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let url = url::Url::parse(&config.url).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        let zoom = config.zoom;
        Ok(Self {
            config,
            zoom,
            agent: ureq::AgentBuilder::new().timeout_connect(CONNECT_TIMEOUT).build(),
            stream: None,
            frame_count: 0,
            last_frame_at: None,
            connected_at: None,
        })
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.target_fps.max(1)))
    }

    fn health_grace(&self) -> Duration {
        self.frame_interval().saturating_mul(6).max(Duration::from_secs(2))
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        match self.stream.as_mut() {
            Some(HttpStream::Mjpeg(reader)) => scan_jpeg(reader),
            Some(HttpStream::SingleJpeg) => {
                let response = self
                    .agent
                    .get(&self.config.url)
                    .call()
                    .context("fetch still frame")?;
                let mut body = Vec::new();
                response
                    .into_reader()
                    .take(MAX_JPEG_BYTES as u64)
                    .read_to_end(&mut body)
                    .context("read still frame body")?;
                Ok(body)
            }
            None => Err(anyhow!("camera source is not connected")),
        }
    }
}

impl FrameSource for HttpCameraSource {
    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(Box::new(response.into_reader())));
            log::info!("CameraSource: connected to {} (mjpeg)", self.config.url);
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
            log::info!("CameraSource: connected to {} (still)", self.config.url);
        }
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        // Decimate to the target rate; MJPEG cameras often push faster.
        if let Some(last) = self.last_frame_at {
            let interval = self.frame_interval();
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }

        let jpeg = self.read_next_jpeg()?;
        let decoded = image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg)
            .context("decode camera JPEG")?;
        let luma = decoded.to_luma8();
        let (width, height) = luma.dimensions();
        let (data, width, height) = crop_center(luma.into_raw(), width, height, self.zoom);

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Ok(Frame::new(data, width, height, now_ms()?, self.frame_count))
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        validate_zoom(zoom)?;
        self.zoom = zoom;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        match self.last_frame_at {
            Some(last) => last.elapsed() <= self.health_grace(),
            None => connected_at.elapsed() <= Duration::from_secs(5),
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// Scan an MJPEG byte stream for the next complete JPEG (SOI..EOI).
fn scan_jpeg(reader: &mut (dyn Read + Send)) -> Result<Vec<u8>> {
    let mut byte = [0u8; 1];
    let mut prev = 0u8;

    // Seek the start-of-image marker, skipping multipart headers.
    loop {
        reader
            .read_exact(&mut byte)
            .context("camera stream ended while seeking frame start")?;
        if prev == 0xFF && byte[0] == 0xD8 {
            break;
        }
        prev = byte[0];
    }

    let mut jpeg = vec![0xFF, 0xD8];
    prev = 0;
    loop {
        reader
            .read_exact(&mut byte)
            .context("camera stream ended mid-frame")?;
        jpeg.push(byte[0]);
        if prev == 0xFF && byte[0] == 0xD9 {
            return Ok(jpeg);
        }
        if jpeg.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("camera frame exceeds {} bytes", MAX_JPEG_BYTES));
        }
        prev = byte[0];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_a_jpeg_out_of_a_multipart_stream() {
        let mut stream: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\
            \xFF\xD8\x01\x02\x03\xFF\xD9\r\n--frame";
        let jpeg = scan_jpeg(&mut stream).expect("jpeg");
        assert_eq!(jpeg, b"\xFF\xD8\x01\x02\x03\xFF\xD9");
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let mut stream: &[u8] = b"\xFF\xD8\x01\x02";
        assert!(scan_jpeg(&mut stream).is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let result = HttpCameraSource::new(CameraConfig {
            url: "file:///dev/video0".to_string(),
            ..CameraConfig::default()
        });
        assert!(result.is_err());
    }
}
