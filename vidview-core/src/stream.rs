//! Stream layout within a frame-set buffer
//!
//! A source delivers all of its streams in one contiguous buffer. Each
//! `StreamInfo` says where its packed image lives inside that buffer.

use serde::{Deserialize, Serialize};

use crate::pixel_format::{pixel_to_rgba, PixelFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    #[serde(rename = "fmt")]
    pub format: PixelFormat,
    #[serde(rename = "w")]
    pub width: u32,
    #[serde(rename = "h")]
    pub height: u32,
    /// Bytes per row
    pub pitch: usize,
    /// Byte offset of the first row within the frame-set
    pub offset: usize,
}

impl StreamInfo {
    pub fn new(format: PixelFormat, width: u32, height: u32, pitch: usize, offset: usize) -> Self {
        Self { format, width, height, pitch, offset }
    }

    /// Tightly packed rows
    pub fn packed(format: PixelFormat, width: u32, height: u32, offset: usize) -> Self {
        Self::new(format, width, height, width as usize * format.bytes_per_pixel(), offset)
    }

    pub fn size_bytes(&self) -> usize {
        self.pitch * self.height as usize
    }

    /// One past the last byte of this stream in the frame-set
    pub fn end(&self) -> usize {
        self.offset + self.size_bytes()
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// View of this stream's image inside a frame-set buffer
    pub fn image<'a>(&self, frame_set: &'a [u8]) -> ImageRef<'a> {
        let end = self.end().min(frame_set.len());
        let start = self.offset.min(end);
        ImageRef {
            data: &frame_set[start..end],
            width: self.width,
            height: self.height,
            pitch: self.pitch,
            format: self.format,
        }
    }

    pub fn image_mut<'a>(&self, frame_set: &'a mut [u8]) -> &'a mut [u8] {
        let end = self.end().min(frame_set.len());
        let start = self.offset.min(end);
        &mut frame_set[start..end]
    }
}

/// Total frame-set size for a stream list
pub fn frame_set_size(streams: &[StreamInfo]) -> usize {
    streams.iter().map(StreamInfo::end).max().unwrap_or(0)
}

// ============================================================================
// Image view
// ============================================================================

/// Borrowed packed image, one stream of a grabbed frame-set
#[derive(Debug, Clone, Copy)]
pub struct ImageRef<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pitch: usize,
    pub format: PixelFormat,
}

impl<'a> ImageRef<'a> {
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.pitch;
        let len = self.width as usize * self.format.bytes_per_pixel();
        let end = (start + len).min(self.data.len());
        &self.data[start.min(end)..end]
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&'a [u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.pitch + x as usize * bpp;
        self.data.get(start..start + bpp)
    }

    /// Normalised RGBA of the pixel at (x, y)
    pub fn rgba_at(&self, x: u32, y: u32) -> Option<[f32; 4]> {
        self.pixel(x, y).map(|px| pixel_to_rgba(self.format, px))
    }

    pub fn is_complete(&self) -> bool {
        self.height == 0
            || self.data.len()
                >= (self.height as usize - 1) * self.pitch
                    + self.width as usize * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_slices_frame_set() {
        let left = StreamInfo::packed(PixelFormat::GRAY8, 2, 2, 0);
        let right = StreamInfo::packed(PixelFormat::RGB24, 1, 2, left.end());
        let streams = [left, right];
        assert_eq!(frame_set_size(&streams), 4 + 6);

        let buffer: Vec<u8> = (0..10).collect();
        let img = right.image(&buffer);
        assert_eq!(img.data, &[4, 5, 6, 7, 8, 9]);
        assert_eq!(img.pixel(0, 1), Some(&[7u8, 8, 9][..]));
        assert_eq!(img.pixel(1, 0), None);
        assert_eq!(left.image(&buffer).row(1), &[2, 3]);
    }

    #[test]
    fn test_aspect() {
        assert_eq!(StreamInfo::packed(PixelFormat::RGB24, 640, 480, 0).aspect(), 640.0 / 480.0);
        assert_eq!(StreamInfo::packed(PixelFormat::RGB24, 640, 0, 0).aspect(), 1.0);
    }
}
