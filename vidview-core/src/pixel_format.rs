// PIXEL FORMAT - Packed pixel layouts carried by video streams
//
// Every stream in a frame-set is a packed image in one of these formats.
// The viewer needs to know channel count, channel depth and the channel
// type's maximum to upload, window and save images.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PixelFormatError {
    #[error("Unknown pixel format: {0}")]
    Unknown(String),
}

// ============================================================================
// Pixel Formats
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    GRAY8,    // 8-bit luminance
    GRAY16LE, // 16-bit luminance, little endian (depth cameras)
    GRAY32F,  // 32-bit float luminance
    RGB24,    // 8-bit per channel, packed
    BGR24,    // Windows / OpenCV order
    RGBA32,   // 8-bit per channel + alpha, packed
    BGRA32,   // Windows format with alpha
}

/// Storage type of a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelType {
    U8,
    U16,
    F32,
}

impl PixelFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::GRAY8 | Self::GRAY16LE | Self::GRAY32F => 1,
            Self::RGB24 | Self::BGR24 => 3,
            Self::RGBA32 | Self::BGRA32 => 4,
        }
    }

    pub fn channel_type(&self) -> ChannelType {
        match self {
            Self::GRAY16LE => ChannelType::U16,
            Self::GRAY32F => ChannelType::F32,
            _ => ChannelType::U8,
        }
    }

    pub fn bits_per_channel(&self) -> usize {
        match self.channel_type() {
            ChannelType::U8 => 8,
            ChannelType::U16 => 16,
            ChannelType::F32 => 32,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.channels() * self.bits_per_channel() / 8
    }

    /// Value a channel takes at full intensity
    pub fn channel_max(&self) -> f32 {
        match self.channel_type() {
            ChannelType::U8 => 255.0,
            ChannelType::U16 => 65535.0,
            ChannelType::F32 => 1.0,
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::RGBA32 | Self::BGRA32)
    }

    /// Channel count excluding alpha
    pub fn color_channels(&self) -> usize {
        if self.has_alpha() {
            self.channels() - 1
        } else {
            self.channels()
        }
    }

    pub fn is_bgr(&self) -> bool {
        matches!(self, Self::BGR24 | Self::BGRA32)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GRAY8 => "GRAY8",
            Self::GRAY16LE => "GRAY16LE",
            Self::GRAY32F => "GRAY32F",
            Self::RGB24 => "RGB24",
            Self::BGR24 => "BGR24",
            Self::RGBA32 => "RGBA32",
            Self::BGRA32 => "BGRA32",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = PixelFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GRAY8" | "GRAY" | "MONO8" | "Y8" => Ok(Self::GRAY8),
            "GRAY16LE" | "GRAY16" | "MONO16" | "Y16" => Ok(Self::GRAY16LE),
            "GRAY32F" | "GRAY32" => Ok(Self::GRAY32F),
            "RGB24" | "RGB" => Ok(Self::RGB24),
            "BGR24" | "BGR" => Ok(Self::BGR24),
            "RGBA32" | "RGBA" => Ok(Self::RGBA32),
            "BGRA32" | "BGRA" => Ok(Self::BGRA32),
            _ => Err(PixelFormatError::Unknown(s.to_string())),
        }
    }
}

// ============================================================================
// Sample Access
// ============================================================================

/// Read channel `c` of the pixel starting at `px`, normalised to [0, 1]
/// for integer formats (float formats are returned as stored).
#[inline]
pub fn read_normalized(format: PixelFormat, px: &[u8], c: usize) -> f32 {
    match format.channel_type() {
        ChannelType::U8 => px[c] as f32 / 255.0,
        ChannelType::U16 => {
            let i = c * 2;
            u16::from_le_bytes([px[i], px[i + 1]]) as f32 / 65535.0
        }
        ChannelType::F32 => {
            let i = c * 4;
            f32::from_le_bytes([px[i], px[i + 1], px[i + 2], px[i + 3]])
        }
    }
}

/// Convert one pixel into RGBA, normalised. Gray is replicated into RGB.
#[inline]
pub fn pixel_to_rgba(format: PixelFormat, px: &[u8]) -> [f32; 4] {
    match format {
        PixelFormat::GRAY8 | PixelFormat::GRAY16LE | PixelFormat::GRAY32F => {
            let v = read_normalized(format, px, 0);
            [v, v, v, 1.0]
        }
        PixelFormat::RGB24 => [
            read_normalized(format, px, 0),
            read_normalized(format, px, 1),
            read_normalized(format, px, 2),
            1.0,
        ],
        PixelFormat::BGR24 => [
            read_normalized(format, px, 2),
            read_normalized(format, px, 1),
            read_normalized(format, px, 0),
            1.0,
        ],
        PixelFormat::RGBA32 => [
            read_normalized(format, px, 0),
            read_normalized(format, px, 1),
            read_normalized(format, px, 2),
            read_normalized(format, px, 3),
        ],
        PixelFormat::BGRA32 => [
            read_normalized(format, px, 2),
            read_normalized(format, px, 1),
            read_normalized(format, px, 0),
            read_normalized(format, px, 3),
        ],
    }
}

/// Write a normalised RGBA value as one pixel of `format`
pub fn write_from_rgba(format: PixelFormat, rgba: [f32; 4], out: &mut [u8]) {
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    // BT.601 luma
    let luma = 0.299 * rgba[0] + 0.587 * rgba[1] + 0.114 * rgba[2];
    match format {
        PixelFormat::GRAY8 => out[0] = to_u8(luma),
        PixelFormat::GRAY16LE => {
            let v = (luma.clamp(0.0, 1.0) * 65535.0).round() as u16;
            out[..2].copy_from_slice(&v.to_le_bytes());
        }
        PixelFormat::GRAY32F => out[..4].copy_from_slice(&luma.to_le_bytes()),
        PixelFormat::RGB24 => {
            out[0] = to_u8(rgba[0]);
            out[1] = to_u8(rgba[1]);
            out[2] = to_u8(rgba[2]);
        }
        PixelFormat::BGR24 => {
            out[0] = to_u8(rgba[2]);
            out[1] = to_u8(rgba[1]);
            out[2] = to_u8(rgba[0]);
        }
        PixelFormat::RGBA32 => {
            out[0] = to_u8(rgba[0]);
            out[1] = to_u8(rgba[1]);
            out[2] = to_u8(rgba[2]);
            out[3] = to_u8(rgba[3]);
        }
        PixelFormat::BGRA32 => {
            out[0] = to_u8(rgba[2]);
            out[1] = to_u8(rgba[1]);
            out[2] = to_u8(rgba[0]);
            out[3] = to_u8(rgba[3]);
        }
    }
}
