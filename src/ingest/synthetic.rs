//! Synthetic camera source (`stub://`) for tests and development.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::normalize::crop_center;
use super::{validate_zoom, CameraConfig, FrameSource, SourceStats};
use crate::frame::Frame;
use crate::now_ms;

/// How often the synthetic scene changes (in frames).
const SCENE_CHANGE_PERIOD: u64 = 50;
/// Luma step applied on a scene change; large enough that the default
/// sensitivity sees it as motion.
const SCENE_STEP: u8 = 16;

/// Synthetic frame generator.
///
/// Produces a static scene that shifts every `SCENE_CHANGE_PERIOD` frames,
/// simulating occasional motion events. Frames are paced to the configured
/// target fps so the daemon loop behaves as it would with a real camera.
pub struct SyntheticCameraSource {
    config: CameraConfig,
    zoom: f32,
    frame_count: u64,
    scene_state: u8,
    last_frame_at: Option<Instant>,
}

impl SyntheticCameraSource {
    pub fn new(config: CameraConfig) -> Self {
        let zoom = config.zoom;
        Self {
            config,
            zoom,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.config.target_fps.max(1)))
    }

    fn generate_luma(&mut self) -> Vec<u8> {
        if self.frame_count % SCENE_CHANGE_PERIOD == 0 {
            self.scene_state = self.scene_state.wrapping_add(SCENE_STEP);
        }
        let pixel_count = (self.config.width * self.config.height) as usize;
        let mut luma = vec![0u8; pixel_count];
        for (i, pixel) in luma.iter_mut().enumerate() {
            *pixel = ((i as u64 % 64) as u8).wrapping_add(self.scene_state);
        }
        luma
    }
}

impl FrameSource for SyntheticCameraSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("CameraSource: connected to {} (synthetic)", self.config.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        // Pace to the target rate like a real camera would.
        if let Some(last) = self.last_frame_at {
            let interval = self.frame_interval();
            let elapsed = last.elapsed();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
        self.frame_count += 1;

        let luma = self.generate_luma();
        let (luma, width, height) = crop_center(
            luma,
            self.config.width,
            self.config.height,
            self.zoom,
        );
        Ok(Frame::new(luma, width, height, now_ms()?, self.frame_count))
    }

    fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        validate_zoom(zoom)?;
        self.zoom = zoom;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
