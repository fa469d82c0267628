//! Frame value type.
//!
//! A `Frame` is one capture from the camera: a luma (grayscale) pixel buffer
//! plus a wall-clock timestamp and a monotonic sequence number. Frames are
//! owned transiently by whichever pipeline stage is processing them; the only
//! component that retains one past its tick is the motion detector, which
//! keeps the previous frame as its diff reference.

/// One captured frame. Pixel data is the luma plane, one byte per pixel,
/// row-major, `width * height` bytes.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Monotonic capture counter, starts at 1 for the first frame.
    pub sequence: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ms: u64, sequence: u64) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            data,
            width,
            height,
            timestamp_ms,
            sequence,
        }
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }
}
