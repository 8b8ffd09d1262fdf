//! Pixel format conversion: `convert:[fmt=RGB24]//<inner uri>`
//!
//! Every stream of the inner source is converted to `fmt` and repacked
//! back to back. Random access is forwarded to the inner source.

use crate::pixel_format::{pixel_to_rgba, write_from_rgba, PixelFormat};
use crate::stream::{ImageRef, StreamInfo};
use crate::uri::VideoUri;
use crate::video::{open_video, VideoError, VideoPlayback, VideoSource};

pub struct ConvertVideo {
    inner: Box<dyn VideoSource>,
    streams: Vec<StreamInfo>,
    scratch: Vec<u8>,
}

impl ConvertVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let format: PixelFormat = match uri.get("fmt") {
            Some(name) => name.parse()?,
            None => PixelFormat::RGB24,
        };
        let inner = open_video(&uri.url)?;
        Ok(Self::new(inner, format))
    }

    pub fn new(inner: Box<dyn VideoSource>, format: PixelFormat) -> Self {
        let mut offset = 0;
        let streams = inner
            .streams()
            .iter()
            .map(|s| {
                let info = StreamInfo::packed(format, s.width, s.height, offset);
                offset = info.end();
                info
            })
            .collect();
        let scratch = vec![0u8; inner.size_bytes()];
        Self { inner, streams, scratch }
    }

    fn convert_into(&self, frame_set: &mut [u8]) {
        for (src_info, dst_info) in self.inner.streams().iter().zip(&self.streams) {
            convert_image(src_info.image(&self.scratch), dst_info, frame_set);
        }
    }
}

fn convert_image(src: ImageRef<'_>, dst_info: &StreamInfo, frame_set: &mut [u8]) {
    let src_bpp = src.format.bytes_per_pixel();
    let dst_bpp = dst_info.format.bytes_per_pixel();
    let dst = dst_info.image_mut(frame_set);

    for y in 0..src.height {
        let src_row = src.row(y);
        let dst_start = y as usize * dst_info.pitch;
        let Some(dst_row) = dst.get_mut(dst_start..dst_start + dst_info.width as usize * dst_bpp) else {
            break;
        };
        for (src_px, dst_px) in src_row.chunks_exact(src_bpp).zip(dst_row.chunks_exact_mut(dst_bpp)) {
            write_from_rgba(dst_info.format, pixel_to_rgba(src.format, src_px), dst_px);
        }
    }
}

impl VideoSource for ConvertVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn start(&mut self) {
        self.inner.start();
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn grab_next(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        if !self.inner.grab_next(&mut self.scratch, wait) {
            return false;
        }
        self.convert_into(frame_set);
        true
    }

    fn grab_newest(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        if !self.inner.grab_newest(&mut self.scratch, wait) {
            return false;
        }
        self.convert_into(frame_set);
        true
    }

    fn playback(&mut self) -> Option<&mut dyn VideoPlayback> {
        self.inner.playback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::test_pattern::TestVideo;

    #[test]
    fn test_convert_to_gray() {
        let inner = Box::new(TestVideo::new(PixelFormat::RGB24, 8, 4, 2));
        let mut video = ConvertVideo::new(inner, PixelFormat::GRAY8);
        assert_eq!(video.streams().len(), 2);
        assert_eq!(video.size_bytes(), 2 * 8 * 4);
        assert!(video.streams().iter().all(|s| s.format == PixelFormat::GRAY8));

        let mut buf = vec![0u8; video.size_bytes()];
        assert!(video.grab_next(&mut buf, true));
        assert!(buf.iter().any(|&b| b != 0));
    }

    #[test]
    fn test_bgr_swap() {
        let src_info = StreamInfo::packed(PixelFormat::BGR24, 1, 1, 0);
        let dst_info = StreamInfo::packed(PixelFormat::RGB24, 1, 1, 0);
        let src = [10u8, 20, 30];
        let mut dst = [0u8; 3];
        convert_image(src_info.image(&src), &dst_info, &mut dst);
        assert_eq!(dst, [30, 20, 10]);
    }

    #[test]
    fn test_open_by_uri() {
        let uri = VideoUri::parse("convert:[fmt=GRAY16LE]//test:[size=4x4]//").unwrap();
        let video = ConvertVideo::open(&uri).unwrap();
        assert_eq!(video.streams()[0].format, PixelFormat::GRAY16LE);
        assert_eq!(video.size_bytes(), 4 * 4 * 2);
    }
}
