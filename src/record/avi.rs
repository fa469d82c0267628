//! Minimal AVI (RIFF) container writer for motion-JPEG clips.
//!
//! The writer is responsible for:
//! - Writing the RIFF/`hdrl` headers up front with placeholder sizes
//! - Appending one JPEG-compressed `00dc` chunk per frame
//! - Finalizing the container: `idx1` index trailer, then patching the RIFF
//!   size, total frame count, stream length, and `movi` list size
//!
//! A file that was never finalized (process crash mid-recording) still has a
//! valid header with a zero frame count; `probe` reads such a file without
//! error so the offload path can decide what to do with it.
//!
//! Layout is fixed: one video stream, MJPG fourcc, every frame a keyframe.

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const DEFAULT_JPEG_QUALITY: u8 = 80;

/// `avih` flag: the file carries an `idx1` index.
const AVIF_HASINDEX: u32 = 0x0000_0010;
/// `idx1` flag: chunk is a keyframe (every MJPEG frame is).
const AVIIF_KEYFRAME: u32 = 0x0000_0010;

/// Header facts recovered from a clip file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AviSummary {
    pub frames: u32,
    pub micros_per_frame: u32,
    pub width: u32,
    pub height: u32,
}

impl AviSummary {
    pub fn duration_secs(&self) -> f64 {
        f64::from(self.frames) * f64::from(self.micros_per_frame) / 1_000_000.0
    }
}

struct IndexEntry {
    /// Offset relative to the `movi` fourcc (first chunk sits at 4).
    offset: u32,
    /// Unpadded chunk data size.
    size: u32,
}

/// Streaming AVI writer. Owned exclusively by the active recording.
pub struct AviWriter {
    file: File,
    path: PathBuf,
    width: u32,
    height: u32,
    quality: u8,
    frames: u32,
    index: Vec<IndexEntry>,
    /// File offset of the `movi` LIST size field.
    movi_size_pos: u64,
    /// File offset of the `avih` total-frames field.
    total_frames_pos: u64,
    /// File offset of the `strh` stream-length field.
    stream_length_pos: u64,
    /// Bytes written into the `movi` list so far (starts at 4 for the fourcc).
    movi_bytes: u32,
}

impl AviWriter {
    /// Create the file and write the fixed header with placeholder sizes.
    pub fn create(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self> {
        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("create recording file {}", path.display()))?;
        let fps = fps.max(1);
        let micros_per_frame = 1_000_000 / fps;

        // RIFF header; size patched at finalize.
        file.write_all(b"RIFF")?;
        file.write_all(&0u32.to_le_bytes())?;
        file.write_all(b"AVI ")?;

        // LIST hdrl: avih + one strl.
        let hdrl_size: u32 = 4 + (8 + 56) + (8 + 4 + (8 + 56) + (8 + 40));
        file.write_all(b"LIST")?;
        file.write_all(&hdrl_size.to_le_bytes())?;
        file.write_all(b"hdrl")?;

        file.write_all(b"avih")?;
        file.write_all(&56u32.to_le_bytes())?;
        file.write_all(&micros_per_frame.to_le_bytes())?;
        file.write_all(&0u32.to_le_bytes())?; // max bytes/sec
        file.write_all(&0u32.to_le_bytes())?; // padding granularity
        file.write_all(&AVIF_HASINDEX.to_le_bytes())?;
        let total_frames_pos = file.stream_position()?;
        file.write_all(&0u32.to_le_bytes())?; // total frames, patched
        file.write_all(&0u32.to_le_bytes())?; // initial frames
        file.write_all(&1u32.to_le_bytes())?; // streams
        file.write_all(&0u32.to_le_bytes())?; // suggested buffer size
        file.write_all(&width.to_le_bytes())?;
        file.write_all(&height.to_le_bytes())?;
        file.write_all(&[0u8; 16])?; // reserved

        let strl_size: u32 = 4 + (8 + 56) + (8 + 40);
        file.write_all(b"LIST")?;
        file.write_all(&strl_size.to_le_bytes())?;
        file.write_all(b"strl")?;

        file.write_all(b"strh")?;
        file.write_all(&56u32.to_le_bytes())?;
        file.write_all(b"vids")?;
        file.write_all(b"MJPG")?;
        file.write_all(&0u32.to_le_bytes())?; // flags
        file.write_all(&0u16.to_le_bytes())?; // priority
        file.write_all(&0u16.to_le_bytes())?; // language
        file.write_all(&0u32.to_le_bytes())?; // initial frames
        file.write_all(&1u32.to_le_bytes())?; // scale
        file.write_all(&fps.to_le_bytes())?; // rate (fps = rate/scale)
        file.write_all(&0u32.to_le_bytes())?; // start
        let stream_length_pos = file.stream_position()?;
        file.write_all(&0u32.to_le_bytes())?; // length in frames, patched
        file.write_all(&0u32.to_le_bytes())?; // suggested buffer size
        file.write_all(&u32::MAX.to_le_bytes())?; // quality (default)
        file.write_all(&0u32.to_le_bytes())?; // sample size
        file.write_all(&0u16.to_le_bytes())?; // rcFrame left
        file.write_all(&0u16.to_le_bytes())?; // rcFrame top
        file.write_all(&(width as u16).to_le_bytes())?;
        file.write_all(&(height as u16).to_le_bytes())?;

        file.write_all(b"strf")?;
        file.write_all(&40u32.to_le_bytes())?;
        file.write_all(&40u32.to_le_bytes())?; // biSize
        file.write_all(&(width as i32).to_le_bytes())?;
        file.write_all(&(height as i32).to_le_bytes())?;
        file.write_all(&1u16.to_le_bytes())?; // planes
        file.write_all(&24u16.to_le_bytes())?; // bit count
        file.write_all(b"MJPG")?; // compression
        file.write_all(&(width * height * 3).to_le_bytes())?; // size image
        file.write_all(&[0u8; 16])?; // pels/clr fields

        // LIST movi; size patched at finalize.
        file.write_all(b"LIST")?;
        let movi_size_pos = file.stream_position()?;
        file.write_all(&0u32.to_le_bytes())?;
        file.write_all(b"movi")?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            width,
            height,
            quality: DEFAULT_JPEG_QUALITY,
            frames: 0,
            index: Vec::new(),
            movi_size_pos,
            total_frames_pos,
            stream_length_pos,
            movi_bytes: 4,
        })
    }

    /// Override the JPEG quality used for subsequent frames.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// JPEG-encode one luma frame and append it as a `00dc` chunk.
    pub fn write_frame(&mut self, luma: &[u8]) -> Result<()> {
        if luma.len() != (self.width * self.height) as usize {
            return Err(anyhow!(
                "frame size {} does not match {}x{} container",
                luma.len(),
                self.width,
                self.height
            ));
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode(luma, self.width, self.height, ExtendedColorType::L8)
            .context("encode frame as JPEG")?;

        let size = jpeg.len() as u32;
        self.file.write_all(b"00dc")?;
        self.file.write_all(&size.to_le_bytes())?;
        self.file.write_all(&jpeg)?;
        let mut chunk_bytes = 8 + size;
        if size % 2 != 0 {
            self.file.write_all(&[0u8])?; // RIFF chunks are 2-byte aligned
            chunk_bytes += 1;
        }

        self.index.push(IndexEntry {
            offset: self.movi_bytes,
            size,
        });
        self.movi_bytes += chunk_bytes;
        self.frames += 1;
        Ok(())
    }

    /// Write the index trailer, patch placeholder sizes, and close the file.
    pub fn finalize(mut self) -> Result<AviSummary> {
        self.file.write_all(b"idx1")?;
        self.file
            .write_all(&((self.index.len() * 16) as u32).to_le_bytes())?;
        for entry in &self.index {
            self.file.write_all(b"00dc")?;
            self.file.write_all(&AVIIF_KEYFRAME.to_le_bytes())?;
            self.file.write_all(&entry.offset.to_le_bytes())?;
            self.file.write_all(&entry.size.to_le_bytes())?;
        }

        let file_len = self.file.stream_position()?;
        self.file.seek(SeekFrom::Start(4))?;
        self.file.write_all(&((file_len - 8) as u32).to_le_bytes())?;
        self.file.seek(SeekFrom::Start(self.total_frames_pos))?;
        self.file.write_all(&self.frames.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(self.stream_length_pos))?;
        self.file.write_all(&self.frames.to_le_bytes())?;
        self.file.seek(SeekFrom::Start(self.movi_size_pos))?;
        self.file.write_all(&self.movi_bytes.to_le_bytes())?;
        self.file.sync_all().context("flush finalized recording")?;

        probe_header(&mut self.file).context("re-read finalized header")
    }
}

/// Read the header facts back out of a clip file.
pub fn probe(path: &Path) -> Result<AviSummary> {
    let mut file =
        File::open(path).with_context(|| format!("open clip {}", path.display()))?;
    probe_header(&mut file)
}

fn probe_header(file: &mut File) -> Result<AviSummary> {
    file.seek(SeekFrom::Start(0))?;
    let mut header = [0u8; 88];
    file.read_exact(&mut header).context("read AVI header")?;

    if &header[0..4] != b"RIFF" || &header[8..12] != b"AVI " {
        return Err(anyhow!("not a RIFF/AVI file"));
    }
    if &header[12..16] != b"LIST" || &header[20..24] != b"hdrl" || &header[24..28] != b"avih" {
        return Err(anyhow!("unexpected AVI header layout"));
    }

    let u32_at = |buf: &[u8; 88], at: usize| {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    };
    Ok(AviSummary {
        micros_per_frame: u32_at(&header, 32),
        frames: u32_at(&header, 48),
        width: u32_at(&header, 64),
        height: u32_at(&header, 68),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_probes_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clip.avi");

        let mut writer = AviWriter::create(&path, 16, 8, 10).expect("create");
        for shade in [0u8, 128, 255] {
            writer.write_frame(&vec![shade; 128]).expect("write frame");
        }
        let summary = writer.finalize().expect("finalize");

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.width, 16);
        assert_eq!(summary.height, 8);
        assert_eq!(summary.micros_per_frame, 100_000);
        assert!((summary.duration_secs() - 0.3).abs() < 1e-9);

        assert_eq!(probe(&path).expect("probe"), summary);
    }

    #[test]
    fn riff_size_matches_file_length() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clip.avi");

        let mut writer = AviWriter::create(&path, 8, 8, 5).expect("create");
        writer.write_frame(&[7u8; 64]).expect("write frame");
        writer.finalize().expect("finalize");

        let bytes = std::fs::read(&path).expect("read file");
        let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_eq!(riff_size as usize, bytes.len() - 8);
        assert_eq!(&bytes[bytes.len() - 16 * 1 - 8..][..4], b"idx1");
    }

    #[test]
    fn unfinalized_file_probes_with_zero_frames() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clip.avi");

        let mut writer = AviWriter::create(&path, 8, 8, 10).expect("create");
        writer.write_frame(&[1u8; 64]).expect("write frame");
        drop(writer); // simulate a crash: no finalize

        let summary = probe(&path).expect("probe");
        assert_eq!(summary.frames, 0);
        assert_eq!(summary.width, 8);
    }

    #[test]
    fn rejects_mis_sized_frames() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clip.avi");

        let mut writer = AviWriter::create(&path, 8, 8, 10).expect("create");
        assert!(writer.write_frame(&[0u8; 10]).is_err());
    }
}
