//! Image file and image sequence playback
//!
//! Handles URIs like:
//!   file:///home/user/shot.png              (single image, one frame)
//!   files:///home/user/seq/frame%04d.png    (printf-style numbered sequence)
//!   files:///home/user/seq/*.jpg            (wildcard, sorted by name)
//!   files:///home/user/seq                  (every image in a directory)
//!
//! Frames are decoded from disk on demand. The sequence is random access.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::pixel_format::PixelFormat;
use crate::stream::StreamInfo;
use crate::uri::VideoUri;
use crate::video::{VideoError, VideoPlayback, VideoSource};

static PRINTF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?P<zero>0)?(?P<width>\d*)d").expect("valid printf regex"));

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm", "ppm", "tga", "webp"];

pub struct ImageSequenceVideo {
    files: Vec<PathBuf>,
    streams: Vec<StreamInfo>,
    next: usize,
}

impl ImageSequenceVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let start: usize = uri.get_or("start", 0)?;
        let files = expand_files(&uri.url, start)?;
        if files.is_empty() {
            return Err(VideoError::open(uri.to_string(), "no image files matched"));
        }
        Self::from_files(files)
    }

    pub fn from_files(files: Vec<PathBuf>) -> Result<Self, VideoError> {
        let first = files
            .first()
            .ok_or_else(|| VideoError::open("files://", "empty image list"))?;
        let (format, width, height, _) = decode_packed(&image::open(first)?);

        tracing::info!(
            "Image sequence: {} file(s), {}x{} {}",
            files.len(),
            width,
            height,
            format
        );

        Ok(Self {
            streams: vec![StreamInfo::packed(format, width, height, 0)],
            files,
            next: 0,
        })
    }

    fn load_into(&self, path: &Path, frame_set: &mut [u8]) -> Result<bool, VideoError> {
        let info = self.streams[0];
        let (format, width, height, bytes) = decode_packed(&image::open(path)?);
        if format != info.format || width != info.width || height != info.height {
            tracing::warn!(
                "Skipping {}: {}x{} {} does not match sequence {}x{} {}",
                path.display(),
                width,
                height,
                format,
                info.width,
                info.height,
                info.format
            );
            return Ok(false);
        }
        let dst = info.image_mut(frame_set);
        let n = bytes.len().min(dst.len());
        dst[..n].copy_from_slice(&bytes[..n]);
        Ok(true)
    }
}

impl VideoSource for ImageSequenceVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn grab_next(&mut self, frame_set: &mut [u8], _wait: bool) -> bool {
        let Some(path) = self.files.get(self.next) else {
            return false;
        };
        let path = path.clone();
        self.next += 1;

        match self.load_into(&path, frame_set) {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Failed to load {}: {}", path.display(), e);
                false
            }
        }
    }

    fn playback(&mut self) -> Option<&mut dyn VideoPlayback> {
        Some(self)
    }
}

impl VideoPlayback for ImageSequenceVideo {
    fn current_frame(&self) -> usize {
        self.next
    }

    fn total_frames(&self) -> usize {
        self.files.len()
    }

    fn seek(&mut self, frame: usize) -> usize {
        self.next = frame.min(self.files.len().saturating_sub(1));
        self.next
    }
}

// ============================================================================
// File expansion
// ============================================================================

fn expand_files(pattern: &str, start: usize) -> Result<Vec<PathBuf>, VideoError> {
    let path = Path::new(pattern);

    if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_file(p))
            .collect();
        files.sort();
        return Ok(files);
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    if let Some(caps) = PRINTF_RE.captures(&file_name) {
        let width: usize = caps
            .name("width")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let zero = caps.name("zero").is_some();
        let placeholder = caps.get(0).map(|m| m.range()).unwrap_or(0..0);

        let mut files = Vec::new();
        for i in start.. {
            let number = if zero {
                format!("{:0width$}", i, width = width)
            } else {
                format!("{:width$}", i, width = width)
            };
            let name = format!("{}{}{}", &file_name[..placeholder.start], number, &file_name[placeholder.end..]);
            let candidate = dir.join(name);
            if !candidate.is_file() {
                break;
            }
            files.push(candidate);
        }
        return Ok(files);
    }

    if file_name.contains('*') || file_name.contains('?') {
        let glob = wildcard_regex(&file_name)?;
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .map(|n| glob.is_match(&n.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        return Ok(files);
    }

    if path.is_file() {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(VideoError::open(pattern, "file not found"))
    }
}

fn wildcard_regex(pattern: &str) -> Result<Regex, VideoError> {
    let mut re = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| VideoError::open(pattern, e))
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
        .unwrap_or(false)
}

/// Packed bytes of a decoded image in the closest stream format
pub(crate) fn decode_packed(img: &DynamicImage) -> (PixelFormat, u32, u32, Vec<u8>) {
    let (w, h) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(buf) => (PixelFormat::GRAY8, w, h, buf.as_raw().clone()),
        DynamicImage::ImageLuma16(buf) => {
            let bytes = buf.as_raw().iter().flat_map(|v| v.to_le_bytes()).collect();
            (PixelFormat::GRAY16LE, w, h, bytes)
        }
        DynamicImage::ImageRgba8(buf) => (PixelFormat::RGBA32, w, h, buf.as_raw().clone()),
        DynamicImage::ImageLumaA8(_) | DynamicImage::ImageRgb8(_) => {
            (PixelFormat::RGB24, w, h, img.to_rgb8().into_raw())
        }
        _ if img.color().has_alpha() => (PixelFormat::RGBA32, w, h, img.to_rgba8().into_raw()),
        _ => (PixelFormat::RGB24, w, h, img.to_rgb8().into_raw()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn write_sequence(dir: &Path, count: u8) {
        for i in 0..count {
            let img = GrayImage::from_pixel(4, 3, Luma([i * 10]));
            img.save(dir.join(format!("frame{:03}.png", i))).unwrap();
        }
    }

    #[test]
    fn test_printf_sequence() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 5);

        let uri = VideoUri::parse(&format!("files://{}/frame%03d.png", dir.path().display())).unwrap();
        let mut video = ImageSequenceVideo::open(&uri).unwrap();
        assert_eq!(video.streams()[0].format, PixelFormat::GRAY8);
        assert_eq!(video.total_frames(), 5);

        let mut buf = vec![0u8; video.size_bytes()];
        assert!(video.grab_next(&mut buf, true));
        assert_eq!(buf[0], 0);
        assert!(video.grab_next(&mut buf, true));
        assert_eq!(buf[0], 10);
    }

    #[test]
    fn test_seek_clamps() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 3);

        let uri = VideoUri::parse(&format!("files://{}", dir.path().display())).unwrap();
        let mut video = ImageSequenceVideo::open(&uri).unwrap();
        assert_eq!(video.seek(100), 2);
        let mut buf = vec![0u8; video.size_bytes()];
        assert!(video.grab_next(&mut buf, true));
        assert_eq!(buf[0], 20);
        assert!(!video.grab_next(&mut buf, true));
        assert_eq!(video.seek(0), 0);
    }

    #[test]
    fn test_wildcard_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path(), 2);

        let uri = VideoUri::parse(&format!("files://{}/*.png", dir.path().display())).unwrap();
        assert_eq!(ImageSequenceVideo::open(&uri).unwrap().total_frames(), 2);

        let missing = VideoUri::parse(&format!("file://{}/nope.png", dir.path().display())).unwrap();
        assert!(ImageSequenceVideo::open(&missing).is_err());
    }
}
