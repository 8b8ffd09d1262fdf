//! MJPEG over HTTP: `mjpeg://http://host/path`
//!
//! Works against both single-JPEG snapshot endpoints and
//! `multipart/x-mixed-replace` streams: each grab opens a request, reads
//! until the first complete JPEG and drops the connection.

use std::io::Read;
use std::time::Duration;

use crate::pixel_format::PixelFormat;
use crate::stream::StreamInfo;
use crate::uri::VideoUri;
use crate::video::{VideoError, VideoSource};

/// Give up on a response that has not produced a frame after this much data
const MAX_FRAME_SEARCH_BYTES: usize = 16 * 1024 * 1024;
const READ_CHUNK: usize = 16 * 1024;

pub struct MjpegVideo {
    url: url::Url,
    client: reqwest::blocking::Client,
    streams: Vec<StreamInfo>,
    /// Frame fetched while probing the stream size
    pending: Option<Vec<u8>>,
}

impl MjpegVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let url = url::Url::parse(&uri.url).map_err(|e| VideoError::open(uri.to_string(), e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VideoError::open(uri.to_string(), "only http(s) streams are supported"));
        }
        let timeout_ms: u64 = uri.get_or("timeout_ms", 5000)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| VideoError::Network(e.to_string()))?;

        let first = fetch_camera_frame(&client, &url)?;
        let streams = vec![StreamInfo::packed(PixelFormat::RGB24, first.width, first.height, 0)];
        tracing::info!("MJPEG stream {}: {}x{}", url, first.width, first.height);

        Ok(Self {
            url,
            client,
            streams,
            pending: Some(first.data),
        })
    }
}

impl VideoSource for MjpegVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn grab_next(&mut self, frame_set: &mut [u8], _wait: bool) -> bool {
        let info = self.streams[0];
        let data = match self.pending.take() {
            Some(data) => data,
            None => match fetch_camera_frame(&self.client, &self.url) {
                Ok(frame) if frame.width == info.width && frame.height == info.height => frame.data,
                Ok(frame) => {
                    tracing::warn!(
                        "MJPEG frame size changed to {}x{}, dropping",
                        frame.width,
                        frame.height
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!("MJPEG grab failed: {}", e);
                    return false;
                }
            },
        };

        let dst = info.image_mut(frame_set);
        let n = data.len().min(dst.len());
        dst[..n].copy_from_slice(&data[..n]);
        true
    }
}

#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn fetch_camera_frame(
    client: &reqwest::blocking::Client,
    url: &url::Url,
) -> Result<CameraFrame, VideoError> {
    let response = client
        .get(url.clone())
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| VideoError::Network(format!("Camera request failed: {}", e)))?;

    let jpeg_bytes = read_first_jpeg(response)?
        .ok_or_else(|| VideoError::Network("Camera stream did not contain a JPEG frame".to_string()))?;

    let image = image::load_from_memory(&jpeg_bytes)?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    Ok(CameraFrame {
        data: rgb.into_raw(),
        width,
        height,
    })
}

/// Read from `body` until one complete JPEG has arrived
fn read_first_jpeg<R: Read>(mut body: R) -> Result<Option<Vec<u8>>, VideoError> {
    let mut bytes = Vec::with_capacity(READ_CHUNK);
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        if let Some(range) = find_jpeg(&bytes) {
            return Ok(Some(bytes[range].to_vec()));
        }
        if bytes.len() > MAX_FRAME_SEARCH_BYTES {
            return Ok(None);
        }
        let n = body
            .read(&mut chunk)
            .map_err(|e| VideoError::Network(format!("Failed to read camera response: {}", e)))?;
        if n == 0 {
            return Ok(None);
        }
        bytes.extend_from_slice(&chunk[..n]);
    }
}

fn looks_like_jpeg(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0] == 0xFF && bytes[1] == 0xD8
}

/// Byte range of the first complete SOI..EOI frame
fn find_jpeg(bytes: &[u8]) -> Option<std::ops::Range<usize>> {
    let start = bytes.windows(2).position(|w| w[0] == 0xFF && w[1] == 0xD8)?;
    if !looks_like_jpeg(&bytes[start..]) {
        return None;
    }
    let end = bytes[start + 2..]
        .windows(2)
        .position(|w| w[0] == 0xFF && w[1] == 0xD9)?;
    Some(start..start + 2 + end + 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_jpeg_in_multipart() {
        let mut body = b"--boundary\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        body.extend_from_slice(b"\r\n--boundary\r\n");
        let range = find_jpeg(&body).unwrap();
        assert_eq!(&body[range], &[0xFFu8, 0xD8, 1, 2, 3, 0xFF, 0xD9][..]);
    }

    #[test]
    fn test_incomplete_jpeg() {
        assert!(find_jpeg(&[0xFF, 0xD8, 1, 2, 3]).is_none());
        assert!(find_jpeg(b"no image here").is_none());
    }

    #[test]
    fn test_read_first_jpeg_stops_at_eof() {
        let data: &[u8] = &[0, 0, 0xFF, 0xD8, 9, 9, 0xFF, 0xD9, 7];
        assert_eq!(read_first_jpeg(data).unwrap().unwrap(), vec![0xFFu8, 0xD8, 9, 9, 0xFF, 0xD9]);
        let empty: &[u8] = &[];
        assert!(read_first_jpeg(empty).unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_http() {
        let uri = VideoUri::parse("mjpeg://ftp://example.com/cam").unwrap();
        assert!(matches!(MjpegVideo::open(&uri), Err(VideoError::Open { .. })));
    }
}
