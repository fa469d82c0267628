//! Daemon configuration.
//!
//! Layering, lowest to highest precedence: built-in defaults, a JSON config
//! file (path from `--config` or `SENTRYCAM_CONFIG`), `SENTRYCAM_*`
//! environment variables, command-line flags. `validate` runs once after all
//! layers are applied.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::CameraConfig;
use crate::offload::OffloadConfig;
use crate::record::RecorderConfig;
use crate::store::HttpStoreConfig;

const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_WIDTH: u32 = 1280;
const DEFAULT_HEIGHT: u32 = 720;
const DEFAULT_FPS: u32 = 10;
const DEFAULT_MIN_PIXEL_DIFF: f64 = 7.2;
const DEFAULT_RECORDING_DIR: &str = "./recordings";
const DEFAULT_GRACE_SECONDS: f64 = 5.0;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_TOKEN_PATH: &str = "./token.json";
const DEFAULT_DRIVE_FOLDER: &str = "motion";
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;
const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 5;
const PREVIEW_FILE_NAME: &str = "preview.jpg";

/// Command-line surface of `sentrycamd`.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Motion-triggered camera recorder")]
pub struct DaemonArgs {
    /// Path to a JSON config file.
    #[arg(long, env = "SENTRYCAM_CONFIG")]
    pub config: Option<PathBuf>,
    /// Enable the preview snapshot sink.
    #[arg(long)]
    pub preview: bool,
    /// Software zoom factor in (0, 1] (0.5 keeps the middle half).
    #[arg(long)]
    pub zoom: Option<f32>,
    /// Motion sensitivity threshold; lower = more sensitive.
    #[arg(long)]
    pub min_pixel_diff: Option<f64>,
    /// Enable remote offload of finished recordings.
    #[arg(long)]
    pub drive_upload: bool,
    /// Delete local recordings after a confirmed upload.
    #[arg(long)]
    pub delete_local_recordings_after_upload: bool,
    /// Delete remote recordings older than this many seconds (0 = keep).
    #[arg(long)]
    pub delete_recordings_after_seconds: Option<u64>,
    /// Directory to store recordings.
    #[arg(long)]
    pub recording_dir: Option<PathBuf>,
    /// Camera URL (http(s):// MJPEG/JPEG, or stub:// synthetic).
    #[arg(long)]
    pub camera_url: Option<String>,
    /// Camera resolution width (synthetic source).
    #[arg(long)]
    pub width: Option<u32>,
    /// Camera resolution height (synthetic source).
    #[arg(long)]
    pub height: Option<u32>,
    /// Target frame rate.
    #[arg(long)]
    pub fps: Option<u32>,
    /// Seconds a recording continues after motion stops.
    #[arg(long)]
    pub grace_seconds: Option<f64>,
    /// Limit recording length to seconds (0 = unlimited).
    #[arg(long)]
    pub max_recording_length_seconds: Option<u64>,
    /// Remote object-store endpoint.
    #[arg(long)]
    pub store_url: Option<String>,
    /// Path to the persisted store credential.
    #[arg(long)]
    pub token_path: Option<PathBuf>,
    /// Remote folder recordings upload into.
    #[arg(long)]
    pub drive_folder: Option<String>,
}

// ----------------------------------------------------------------------------
// Config file shape
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct DaemonConfigFile {
    camera: Option<CameraSection>,
    detect: Option<DetectSection>,
    record: Option<RecordSection>,
    upload: Option<UploadSection>,
    retention: Option<RetentionSection>,
    preview: Option<PreviewSection>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraSection {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    zoom: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectSection {
    min_pixel_diff: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct RecordSection {
    dir: Option<PathBuf>,
    grace_seconds: Option<f64>,
    max_length_seconds: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadSection {
    enabled: Option<bool>,
    store_url: Option<String>,
    token_path: Option<PathBuf>,
    folder: Option<String>,
    delete_local_after_upload: Option<bool>,
    max_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RetentionSection {
    delete_after_seconds: Option<u64>,
    sweep_interval_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct PreviewSection {
    enabled: Option<bool>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub camera_url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub zoom: f32,
    pub min_pixel_diff: f64,
    pub recording_dir: PathBuf,
    pub grace_seconds: f64,
    /// 0 = unlimited.
    pub max_recording_length_seconds: u64,
    pub jpeg_quality: u8,
    pub preview: bool,
    pub drive_upload: bool,
    pub store_url: String,
    pub token_path: PathBuf,
    pub drive_folder: String,
    pub delete_local_after_upload: bool,
    /// 0 = never delete remote recordings.
    pub delete_recordings_after_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub max_upload_attempts: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            camera_url: DEFAULT_CAMERA_URL.to_string(),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
            zoom: 1.0,
            min_pixel_diff: DEFAULT_MIN_PIXEL_DIFF,
            recording_dir: PathBuf::from(DEFAULT_RECORDING_DIR),
            grace_seconds: DEFAULT_GRACE_SECONDS,
            max_recording_length_seconds: 0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            preview: false,
            drive_upload: false,
            store_url: String::new(),
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            drive_folder: DEFAULT_DRIVE_FOLDER.to_string(),
            delete_local_after_upload: false,
            delete_recordings_after_seconds: 0,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECS,
            max_upload_attempts: DEFAULT_MAX_UPLOAD_ATTEMPTS,
        }
    }
}

impl DaemonConfig {
    /// Resolve configuration from all layers.
    pub fn load(args: &DaemonArgs) -> Result<Self> {
        let file_path = args
            .config
            .clone()
            .or_else(|| std::env::var("SENTRYCAM_CONFIG").ok().map(PathBuf::from));
        let file_cfg = match &file_path {
            Some(path) => read_config_file(path)?,
            None => DaemonConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.apply_args(args);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(camera) = file.camera {
            if let Some(url) = camera.url {
                cfg.camera_url = url;
            }
            if let Some(width) = camera.width {
                cfg.width = width;
            }
            if let Some(height) = camera.height {
                cfg.height = height;
            }
            if let Some(fps) = camera.fps {
                cfg.fps = fps;
            }
            if let Some(zoom) = camera.zoom {
                cfg.zoom = zoom;
            }
        }
        if let Some(detect) = file.detect {
            if let Some(diff) = detect.min_pixel_diff {
                cfg.min_pixel_diff = diff;
            }
        }
        if let Some(record) = file.record {
            if let Some(dir) = record.dir {
                cfg.recording_dir = dir;
            }
            if let Some(grace) = record.grace_seconds {
                cfg.grace_seconds = grace;
            }
            if let Some(max) = record.max_length_seconds {
                cfg.max_recording_length_seconds = max;
            }
            if let Some(quality) = record.jpeg_quality {
                cfg.jpeg_quality = quality;
            }
        }
        if let Some(upload) = file.upload {
            if let Some(enabled) = upload.enabled {
                cfg.drive_upload = enabled;
            }
            if let Some(url) = upload.store_url {
                cfg.store_url = url;
            }
            if let Some(path) = upload.token_path {
                cfg.token_path = path;
            }
            if let Some(folder) = upload.folder {
                cfg.drive_folder = folder;
            }
            if let Some(delete) = upload.delete_local_after_upload {
                cfg.delete_local_after_upload = delete;
            }
            if let Some(attempts) = upload.max_attempts {
                cfg.max_upload_attempts = attempts;
            }
        }
        if let Some(retention) = file.retention {
            if let Some(secs) = retention.delete_after_seconds {
                cfg.delete_recordings_after_seconds = secs;
            }
            if let Some(secs) = retention.sweep_interval_seconds {
                cfg.sweep_interval_seconds = secs;
            }
        }
        if let Some(preview) = file.preview {
            if let Some(enabled) = preview.enabled {
                cfg.preview = enabled;
            }
        }
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTRYCAM_CAMERA_URL") {
            if !url.trim().is_empty() {
                self.camera_url = url;
            }
        }
        if let Ok(dir) = std::env::var("SENTRYCAM_RECORDING_DIR") {
            if !dir.trim().is_empty() {
                self.recording_dir = PathBuf::from(dir);
            }
        }
        if let Ok(url) = std::env::var("SENTRYCAM_STORE_URL") {
            if !url.trim().is_empty() {
                self.store_url = url;
            }
        }
        if let Ok(path) = std::env::var("SENTRYCAM_TOKEN_PATH") {
            if !path.trim().is_empty() {
                self.token_path = PathBuf::from(path);
            }
        }
        if let Ok(diff) = std::env::var("SENTRYCAM_MIN_PIXEL_DIFF") {
            self.min_pixel_diff = diff
                .parse()
                .map_err(|_| anyhow!("SENTRYCAM_MIN_PIXEL_DIFF must be a number"))?;
        }
        if let Ok(secs) = std::env::var("SENTRYCAM_RETENTION_SECS") {
            self.delete_recordings_after_seconds = secs.parse().map_err(|_| {
                anyhow!("SENTRYCAM_RETENTION_SECS must be an integer number of seconds")
            })?;
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &DaemonArgs) {
        if args.preview {
            self.preview = true;
        }
        if let Some(zoom) = args.zoom {
            self.zoom = zoom;
        }
        if let Some(diff) = args.min_pixel_diff {
            self.min_pixel_diff = diff;
        }
        if args.drive_upload {
            self.drive_upload = true;
        }
        if args.delete_local_recordings_after_upload {
            self.delete_local_after_upload = true;
        }
        if let Some(secs) = args.delete_recordings_after_seconds {
            self.delete_recordings_after_seconds = secs;
        }
        if let Some(dir) = &args.recording_dir {
            self.recording_dir = dir.clone();
        }
        if let Some(url) = &args.camera_url {
            self.camera_url = url.clone();
        }
        if let Some(width) = args.width {
            self.width = width;
        }
        if let Some(height) = args.height {
            self.height = height;
        }
        if let Some(fps) = args.fps {
            self.fps = fps;
        }
        if let Some(grace) = args.grace_seconds {
            self.grace_seconds = grace;
        }
        if let Some(max) = args.max_recording_length_seconds {
            self.max_recording_length_seconds = max;
        }
        if let Some(url) = &args.store_url {
            self.store_url = url.clone();
        }
        if let Some(path) = &args.token_path {
            self.token_path = path.clone();
        }
        if let Some(folder) = &args.drive_folder {
            self.drive_folder = folder.clone();
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.zoom > 0.0 && self.zoom <= 1.0) {
            return Err(anyhow!("zoom must be in (0, 1], got {}", self.zoom));
        }
        if self.min_pixel_diff <= 0.0 {
            return Err(anyhow!("min_pixel_diff must be positive"));
        }
        if self.fps == 0 {
            return Err(anyhow!("fps must be greater than zero"));
        }
        if self.grace_seconds < 0.0 {
            return Err(anyhow!("grace_seconds must not be negative"));
        }
        if self.drive_upload && self.store_url.trim().is_empty() {
            return Err(anyhow!("store_url is required when --drive-upload is set"));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Derived per-module configs
    // ------------------------------------------------------------------

    pub fn camera(&self) -> CameraConfig {
        CameraConfig {
            url: self.camera_url.clone(),
            width: self.width,
            height: self.height,
            target_fps: self.fps,
            zoom: self.zoom,
        }
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            output_dir: self.recording_dir.clone(),
            grace: Duration::from_secs_f64(self.grace_seconds),
            max_clip: match self.max_recording_length_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            fps: self.fps,
            jpeg_quality: self.jpeg_quality,
        }
    }

    pub fn offload(&self) -> OffloadConfig {
        OffloadConfig {
            delete_local_after_upload: self.delete_local_after_upload,
            remote_max_age: match self.delete_recordings_after_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            max_upload_attempts: self.max_upload_attempts,
            ..OffloadConfig::default()
        }
    }

    pub fn http_store(&self) -> HttpStoreConfig {
        HttpStoreConfig {
            base_url: self.store_url.clone(),
            token_path: self.token_path.clone(),
            folder: self.drive_folder.clone(),
        }
    }

    pub fn preview_path(&self) -> PathBuf {
        self.recording_dir.join(PREVIEW_FILE_NAME)
    }
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = DaemonConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.min_pixel_diff, 7.2);
        assert_eq!(cfg.grace_seconds, 5.0);
    }

    #[test]
    fn upload_without_store_url_is_rejected() {
        let cfg = DaemonConfig {
            drive_upload: true,
            ..DaemonConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_retention_disables_the_sweep() {
        let cfg = DaemonConfig::default();
        assert!(cfg.offload().remote_max_age.is_none());

        let cfg = DaemonConfig {
            delete_recordings_after_seconds: 604_800,
            ..DaemonConfig::default()
        };
        assert_eq!(
            cfg.offload().remote_max_age,
            Some(Duration::from_secs(604_800))
        );
    }

    #[test]
    fn zero_max_length_means_unlimited() {
        let cfg = DaemonConfig::default();
        assert!(cfg.recorder().max_clip.is_none());
    }

    #[test]
    fn flags_override_defaults() {
        let args = DaemonArgs {
            zoom: Some(0.5),
            min_pixel_diff: Some(3.0),
            drive_upload: true,
            store_url: Some("http://store.local/v1".to_string()),
            ..DaemonArgs::default()
        };
        let mut cfg = DaemonConfig::default();
        cfg.apply_args(&args);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.zoom, 0.5);
        assert_eq!(cfg.min_pixel_diff, 3.0);
        assert!(cfg.drive_upload);
    }
}
