//! # Video Interfaces
//!
//! Unified interface for every URI-addressed video input and record output.
//!
//! ## Capabilities
//! - `VideoSource`: fixed set of streams, grabs whole frame-sets into a buffer
//! - `VideoPlayback`: optional random access (seek / frame count), reached
//!   through `VideoSource::playback()`
//! - `VideoSink`: accepts frame-sets in the layout of some source

use thiserror::Error;

use crate::drivers::{
    convert::ConvertVideo, images::ImageSequenceVideo, join::JoinVideo, mjpeg::MjpegVideo,
    pango::{PangoVideo, PangoVideoOutput},
    test_pattern::TestVideo,
};
use crate::pixel_format::PixelFormatError;
use crate::stream::{frame_set_size, StreamInfo};
use crate::uri::{UriError, VideoUri};

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("No video streams from device")]
    NoStreams,
    #[error("Unsupported video scheme '{0}'")]
    UnsupportedScheme(String),
    #[error(transparent)]
    Uri(#[from] UriError),
    #[error(transparent)]
    PixelFormat(#[from] PixelFormatError),
    #[error("Unable to open '{uri}': {reason}")]
    Open { uri: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Corrupt packet log: {0}")]
    Corrupt(String),
    #[error("Frame-set size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

impl VideoError {
    pub fn open(uri: impl Into<String>, reason: impl ToString) -> Self {
        Self::Open {
            uri: uri.into(),
            reason: reason.to_string(),
        }
    }
}

/// Video input trait - implemented by all drivers
pub trait VideoSource {
    /// Streams in the order they appear in a frame-set
    fn streams(&self) -> &[StreamInfo];

    /// Bytes needed to hold one frame-set
    fn size_bytes(&self) -> usize {
        frame_set_size(self.streams())
    }

    fn start(&mut self) {}

    fn stop(&mut self) {}

    /// Copy the next frame-set into `frame_set`. Returns false when no frame
    /// is available (end of file, or nothing new and `wait` is false).
    fn grab_next(&mut self, frame_set: &mut [u8], wait: bool) -> bool;

    /// Copy the most recent frame-set, dropping any backlog
    fn grab_newest(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        self.grab_next(frame_set, wait)
    }

    /// Random access, for sources that support it
    fn playback(&mut self) -> Option<&mut dyn VideoPlayback> {
        None
    }
}

/// Random-access capability of file-backed sources
pub trait VideoPlayback {
    /// Index of the frame the next grab returns
    fn current_frame(&self) -> usize;

    fn total_frames(&self) -> usize;

    /// Move to `frame`, clamped to the valid range. Returns the new position.
    fn seek(&mut self, frame: usize) -> usize;
}

/// Record destination trait
pub trait VideoSink {
    /// Declare the frame-set layout. Must be called before writing.
    fn set_streams(&mut self, streams: &[StreamInfo], source_uri: &str) -> Result<(), VideoError>;

    fn write_streams(&mut self, frame_set: &[u8]) -> Result<(), VideoError>;

    /// Flush and finalise. Further writes are an error.
    fn close(&mut self) -> Result<(), VideoError>;
}

// ============================================================================
// Opening by URI
// ============================================================================

pub fn open_video(uri: &str) -> Result<Box<dyn VideoSource>, VideoError> {
    let parsed = VideoUri::parse(uri)?;
    open_video_uri(&parsed)
}

pub fn open_video_uri(uri: &VideoUri) -> Result<Box<dyn VideoSource>, VideoError> {
    tracing::debug!("Opening video '{}'", uri);
    let video: Box<dyn VideoSource> = match uri.scheme.as_str() {
        "test" => Box::new(TestVideo::open(uri)?),
        "file" if is_packet_log(&uri.url) => Box::new(PangoVideo::open(uri)?),
        "file" | "files" => Box::new(ImageSequenceVideo::open(uri)?),
        "pango" => Box::new(PangoVideo::open(uri)?),
        "mjpeg" => Box::new(MjpegVideo::open(uri)?),
        "convert" => Box::new(ConvertVideo::open(uri)?),
        "join" => Box::new(JoinVideo::open(uri)?),
        other => return Err(VideoError::UnsupportedScheme(other.to_string())),
    };
    Ok(video)
}

pub fn open_output(uri: &str) -> Result<Box<dyn VideoSink>, VideoError> {
    let parsed = VideoUri::parse(uri)?;
    match parsed.scheme.as_str() {
        "pango" => Ok(Box::new(PangoVideoOutput::create(&parsed.url)?)),
        "file" if is_packet_log(&parsed.url) => Ok(Box::new(PangoVideoOutput::create(&parsed.url)?)),
        other => Err(VideoError::UnsupportedScheme(other.to_string())),
    }
}

/// File path an output URI writes to, if it is file-backed
pub fn output_path(uri: &str) -> Option<String> {
    let parsed = VideoUri::parse(uri).ok()?;
    match parsed.scheme.as_str() {
        "pango" | "file" => Some(parsed.url),
        _ => None,
    }
}

fn is_packet_log(path: &str) -> bool {
    path.to_ascii_lowercase().ends_with(".pango")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_schemes_are_distinguishable() {
        for uri in ["v4l:///dev/video0", "dc1394:[fps=30]//0", "openni:[img1=rgb]//"] {
            match open_video(uri) {
                Err(VideoError::UnsupportedScheme(_)) => {}
                Err(e) => panic!("unexpected error for {}: {}", uri, e),
                Ok(_) => panic!("{} should not open", uri),
            }
        }
    }

    #[test]
    fn test_convert_of_unsupported_inner_fails() {
        assert!(matches!(
            open_video("convert:[fmt=RGB24]//v4l:///dev/video0"),
            Err(VideoError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_output_dispatch() {
        assert_eq!(output_path("pango://video.pango").as_deref(), Some("video.pango"));
        assert!(matches!(
            open_output("ffmpeg://out.avi"),
            Err(VideoError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_test_source_size() {
        let video = open_video("test:[size=16x8,n=2,fmt=GRAY8]//").unwrap();
        assert_eq!(video.streams().len(), 2);
        assert_eq!(video.size_bytes(), 2 * 16 * 8);
    }
}
