//! Decoded pixel-buffer frames fed to the pipeline.

use crate::types::FaceRect;

/// A decoded image buffer with interleaved channels.
///
/// The pipeline treats pixel data opaquely; any layout or precision
/// conversion is the compute backend's concern.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
                width,
                height,
                channels,
            });
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Copy out the region covered by `rect`, clamped to the frame.
    ///
    /// A rectangle with no intersection yields an empty 0x0 frame.
    pub fn crop(&self, rect: &FaceRect) -> Frame {
        let x0 = rect.x.clamp(0, self.width as i32) as u32;
        let y0 = rect.y.clamp(0, self.height as i32) as u32;
        let x1 = rect.x.saturating_add(rect.width).clamp(0, self.width as i32) as u32;
        let y1 = rect.y.saturating_add(rect.height).clamp(0, self.height as i32) as u32;

        let width = x1.saturating_sub(x0);
        let height = y1.saturating_sub(y0);
        let c = self.channels as usize;

        let mut data = Vec::with_capacity(width as usize * height as usize * c);
        for row in y0..y1 {
            let start = (row * self.width + x0) as usize * c;
            let end = start + width as usize * c;
            data.extend_from_slice(&self.data[start..end]);
        }

        Frame {
            data,
            width,
            height,
            channels: self.channels,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected} bytes ({width}x{height}x{channels}), got {actual}")]
    InvalidLength {
        expected: usize,
        actual: usize,
        width: u32,
        height: u32,
        channels: u32,
    },
}
