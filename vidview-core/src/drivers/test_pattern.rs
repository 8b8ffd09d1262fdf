//! Synthetic test source: `test:[size=WxH,n=N,fmt=FMT]//`
//!
//! Produces a scrolling colour gradient, different per stream, so the whole
//! viewer can run without a camera or file.

use crate::pixel_format::{write_from_rgba, PixelFormat};
use crate::stream::StreamInfo;
use crate::uri::VideoUri;
use crate::video::{VideoError, VideoSource};

pub struct TestVideo {
    streams: Vec<StreamInfo>,
    frame: u64,
}

impl TestVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let (width, height) = uri.get_size("size", (640, 480))?;
        let count: usize = uri.get_or("n", 1)?;
        let format: PixelFormat = match uri.get("fmt") {
            Some(name) => name.parse()?,
            None => PixelFormat::RGB24,
        };

        if width == 0 || height == 0 {
            return Err(VideoError::open(uri.to_string(), "image size must be non-zero"));
        }

        Ok(Self::new(format, width, height, count))
    }

    pub fn new(format: PixelFormat, width: u32, height: u32, count: usize) -> Self {
        let mut streams = Vec::with_capacity(count);
        let mut offset = 0;
        for _ in 0..count {
            let info = StreamInfo::packed(format, width, height, offset);
            offset = info.end();
            streams.push(info);
        }
        Self { streams, frame: 0 }
    }
}

impl VideoSource for TestVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn grab_next(&mut self, frame_set: &mut [u8], _wait: bool) -> bool {
        if frame_set.len() < self.size_bytes() {
            return false;
        }

        let t = self.frame as u32;
        for (s, info) in self.streams.iter().enumerate() {
            let bpp = info.format.bytes_per_pixel();
            let image = info.image_mut(frame_set);
            let w = info.width.max(1) as f32;
            let h = info.height.max(1) as f32;
            let phase = (s as f32 * 0.25).fract();

            for y in 0..info.height {
                let row = &mut image[y as usize * info.pitch..];
                for x in 0..info.width {
                    let sx = ((x + t * 2) % info.width) as f32 / w;
                    let rgba = [sx, y as f32 / h, ((sx + phase) * 0.5).fract(), 1.0];
                    let px = x as usize * bpp;
                    write_from_rgba(info.format, rgba, &mut row[px..px + bpp]);
                }
            }
        }

        self.frame += 1;
        true
    }
}
