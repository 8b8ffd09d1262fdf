//! # Packet Log Recording and Playback
//!
//! `.pango` files hold a recorded frame-set stream:
//!
//! ```text
//! "PANGO"                                  magic
//! "SRC" varint(len) json                   stream layout header
//! "PKT" i64le(time_us) varint(len) bytes   one frame-set, repeated
//! "END"                                    clean close
//! ```
//!
//! Varints are LEB128 (7 bits per byte, low group first, high bit set on
//! all but the last byte). The reader indexes every packet on open so the
//! log is random access. A truncated final packet is dropped.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::stream::{frame_set_size, StreamInfo};
use crate::uri::VideoUri;
use crate::video::{VideoError, VideoPlayback, VideoSink, VideoSource};

pub const PANGO_MAGIC: &[u8; 5] = b"PANGO";
const TAG_SRC: &[u8; 3] = b"SRC";
const TAG_PKT: &[u8; 3] = b"PKT";
const TAG_END: &[u8; 3] = b"END";

const LOG_VERSION: u32 = 1;

/// Largest frame-set a log may declare (1 GiB)
const MAX_FRAME_SET_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketLogHeader {
    pub version: u32,
    pub driver: String,
    /// URI of the source that was recorded
    pub uri: String,
    pub streams: Vec<StreamInfo>,
    pub size_bytes: usize,
}

fn put_varint(buf: &mut BytesMut, mut n: usize) {
    while n >= 0x80 {
        buf.put_u8(0x80 | (n & 0x7F) as u8);
        n >>= 7;
    }
    buf.put_u8(n as u8);
}

fn read_varint<R: Read>(reader: &mut R) -> io::Result<usize> {
    let mut n = 0usize;
    let mut shift = 0u32;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        if shift >= usize::BITS {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflow"));
        }
        n |= ((byte[0] & 0x7F) as usize) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(n);
        }
        shift += 7;
    }
}

/// Reject headers whose stream layout disagrees with the declared or recorded sizes
fn validate_layout(header: &PacketLogHeader, index: &[PacketEntry]) -> Result<(), VideoError> {
    let mut size = 0usize;
    for info in &header.streams {
        let end = info
            .pitch
            .checked_mul(info.height as usize)
            .and_then(|n| n.checked_add(info.offset))
            .ok_or_else(|| VideoError::Corrupt("stream layout overflows".to_string()))?;
        size = size.max(end);
    }
    if size != header.size_bytes {
        return Err(VideoError::Corrupt(format!(
            "header declares {} bytes per frame-set, streams need {}",
            header.size_bytes, size
        )));
    }
    if size > MAX_FRAME_SET_BYTES {
        return Err(VideoError::Corrupt(format!("frame-set of {} bytes is too large", size)));
    }
    if let Some(entry) = index.iter().find(|e| e.len != size) {
        return Err(VideoError::Corrupt(format!(
            "packet of {} bytes in a log of {} byte frame-sets",
            entry.len, size
        )));
    }
    Ok(())
}

// ============================================================================
// Writer
// ============================================================================

pub struct PangoVideoOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    size_bytes: Option<usize>,
    started: Instant,
    frames_written: usize,
}

impl PangoVideoOutput {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, VideoError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(PANGO_MAGIC)?;
        tracing::debug!("Created packet log {}", path.display());

        Ok(Self {
            path,
            writer: Some(writer),
            size_bytes: None,
            started: Instant::now(),
            frames_written: 0,
        })
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, VideoError> {
        self.writer
            .as_mut()
            .ok_or_else(|| VideoError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "packet log closed")))
    }
}

impl VideoSink for PangoVideoOutput {
    fn set_streams(&mut self, streams: &[StreamInfo], source_uri: &str) -> Result<(), VideoError> {
        let header = PacketLogHeader {
            version: LOG_VERSION,
            driver: "vidview".to_string(),
            uri: source_uri.to_string(),
            streams: streams.to_vec(),
            size_bytes: frame_set_size(streams),
        };
        let json = serde_json::to_vec(&header)
            .map_err(|e| VideoError::Corrupt(format!("header encode failed: {}", e)))?;

        let mut buf = BytesMut::with_capacity(json.len() + 8);
        buf.put_slice(TAG_SRC);
        put_varint(&mut buf, json.len());
        buf.put_slice(&json);
        self.writer()?.write_all(&buf)?;

        self.size_bytes = Some(header.size_bytes);
        self.started = Instant::now();
        Ok(())
    }

    fn write_streams(&mut self, frame_set: &[u8]) -> Result<(), VideoError> {
        let expected = self
            .size_bytes
            .ok_or_else(|| VideoError::Corrupt("stream layout not set before writing".to_string()))?;
        if frame_set.len() < expected {
            return Err(VideoError::SizeMismatch {
                expected,
                actual: frame_set.len(),
            });
        }

        let time_us = self.started.elapsed().as_micros() as i64;
        let mut buf = BytesMut::with_capacity(3 + 8 + 10);
        buf.put_slice(TAG_PKT);
        buf.put_i64_le(time_us);
        put_varint(&mut buf, expected);

        let writer = self.writer()?;
        writer.write_all(&buf)?;
        writer.write_all(&frame_set[..expected])?;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), VideoError> {
        if let Some(mut writer) = self.writer.take() {
            writer.write_all(TAG_END)?;
            writer.flush()?;
            tracing::debug!(
                "Closed packet log {} ({} frames)",
                self.path.display(),
                self.frames_written
            );
        }
        Ok(())
    }
}

impl Drop for PangoVideoOutput {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to finalise {}: {}", self.path.display(), e);
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PacketEntry {
    data_pos: u64,
    len: usize,
    time_us: i64,
}

pub struct PangoVideo {
    reader: BufReader<File>,
    header: PacketLogHeader,
    index: Vec<PacketEntry>,
    next: usize,
    realtime: bool,
    /// Wall clock and log time of the first frame since the last seek
    clock: Option<(Instant, i64)>,
}

impl PangoVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let realtime = uri.get_bool("realtime", false)?;
        Self::open_path(&uri.url, realtime)
    }

    pub fn open_path(path: impl AsRef<Path>, realtime: bool) -> Result<Self, VideoError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 5];
        reader
            .read_exact(&mut magic)
            .map_err(|_| VideoError::Corrupt(format!("{} is too short", path.display())))?;
        if &magic != PANGO_MAGIC {
            return Err(VideoError::Corrupt(format!("{} is not a packet log", path.display())));
        }

        let (header, index) = Self::scan(&mut reader, file_len)?;
        let header =
            header.ok_or_else(|| VideoError::Corrupt("missing stream header".to_string()))?;
        validate_layout(&header, &index)?;

        tracing::info!(
            "Packet log {}: {} stream(s), {} frames, recorded from '{}'",
            path.display(),
            header.streams.len(),
            index.len(),
            header.uri
        );

        Ok(Self {
            reader,
            header,
            index,
            next: 0,
            realtime,
            clock: None,
        })
    }

    fn scan(
        reader: &mut BufReader<File>,
        file_len: u64,
    ) -> Result<(Option<PacketLogHeader>, Vec<PacketEntry>), VideoError> {
        let mut header: Option<PacketLogHeader> = None;
        let mut index = Vec::new();

        loop {
            let mut tag = [0u8; 3];
            match reader.read_exact(&mut tag) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            match &tag {
                t if t == TAG_SRC => {
                    let len = read_varint(reader)?;
                    let remaining = file_len.saturating_sub(reader.stream_position()?);
                    if len as u64 > remaining {
                        return Err(VideoError::Corrupt(format!(
                            "stream header of {} bytes runs past the end of the log",
                            len
                        )));
                    }
                    let mut json = vec![0u8; len];
                    reader.read_exact(&mut json)?;
                    let parsed: PacketLogHeader = serde_json::from_slice(&json)
                        .map_err(|e| VideoError::Corrupt(format!("bad header: {}", e)))?;
                    if header.is_none() {
                        header = Some(parsed);
                    } else {
                        tracing::warn!("Ignoring additional stream header in packet log");
                    }
                }
                t if t == TAG_PKT => {
                    let mut time = [0u8; 8];
                    let len = match reader
                        .read_exact(&mut time)
                        .and_then(|_| read_varint(reader))
                    {
                        Ok(len) => len,
                        Err(_) => break,
                    };
                    let data_pos = reader.stream_position()?;
                    if data_pos.saturating_add(len as u64) > file_len {
                        tracing::warn!("Dropping truncated final packet");
                        break;
                    }
                    index.push(PacketEntry {
                        data_pos,
                        len,
                        time_us: i64::from_le_bytes(time),
                    });
                    reader.seek_relative(len as i64)?;
                }
                t if t == TAG_END => break,
                other => {
                    return Err(VideoError::Corrupt(format!(
                        "unknown tag '{}'",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        }

        Ok((header, index))
    }

    pub fn header(&self) -> &PacketLogHeader {
        &self.header
    }

    /// Wait for the recorded time of `entry`. False if not due and not waiting.
    fn pace(&mut self, entry: PacketEntry, wait: bool) -> bool {
        let Some((wall, log)) = self.clock else {
            self.clock = Some((Instant::now(), entry.time_us));
            return true;
        };
        let offset = Duration::from_micros((entry.time_us - log).max(0) as u64);
        let due = wall + offset;
        let now = Instant::now();
        if now >= due {
            return true;
        }
        if !wait {
            return false;
        }
        std::thread::sleep(due - now);
        true
    }

    fn read_packet(&mut self, entry: PacketEntry, frame_set: &mut [u8]) -> io::Result<()> {
        let n = entry.len.min(frame_set.len());
        self.reader.seek(SeekFrom::Start(entry.data_pos))?;
        self.reader.read_exact(&mut frame_set[..n])
    }
}

impl VideoSource for PangoVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.header.streams
    }

    fn size_bytes(&self) -> usize {
        self.header.size_bytes
    }

    fn grab_next(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        let Some(&entry) = self.index.get(self.next) else {
            return false;
        };
        if self.realtime && !self.pace(entry, wait) {
            return false;
        }

        match self.read_packet(entry, frame_set) {
            Ok(()) => {
                self.next += 1;
                true
            }
            Err(e) => {
                tracing::warn!("Packet log read failed at frame {}: {}", self.next, e);
                false
            }
        }
    }

    fn playback(&mut self) -> Option<&mut dyn VideoPlayback> {
        Some(self)
    }
}

impl VideoPlayback for PangoVideo {
    fn current_frame(&self) -> usize {
        self.next
    }

    fn total_frames(&self) -> usize {
        self.index.len()
    }

    fn seek(&mut self, frame: usize) -> usize {
        self.next = frame.min(self.index.len().saturating_sub(1));
        self.clock = None;
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::PixelFormat;

    fn record(path: &Path, frames: u8) -> Vec<StreamInfo> {
        let streams = vec![
            StreamInfo::packed(PixelFormat::GRAY8, 4, 2, 0),
            StreamInfo::packed(PixelFormat::RGB24, 2, 2, 8),
        ];
        let mut out = PangoVideoOutput::create(path).unwrap();
        out.set_streams(&streams, "test:[n=2]//").unwrap();
        for i in 0..frames {
            let frame = vec![i; frame_set_size(&streams)];
            out.write_streams(&frame).unwrap();
        }
        out.close().unwrap();
        streams
    }

    #[test]
    fn test_varint() {
        for n in [0usize, 1, 127, 128, 300, 1 << 20, usize::MAX >> 1] {
            let mut buf = BytesMut::new();
            put_varint(&mut buf, n);
            assert_eq!(read_varint(&mut &buf[..]).unwrap(), n);
        }
    }

    #[test]
    fn test_record_and_play_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.pango");
        let streams = record(&path, 3);

        let mut video = PangoVideo::open_path(&path, false).unwrap();
        assert_eq!(video.streams(), &streams[..]);
        assert_eq!(video.header().uri, "test:[n=2]//");
        assert_eq!(video.total_frames(), 3);

        let mut buf = vec![0xFF; video.size_bytes() + 1];
        for i in 0..3u8 {
            assert!(video.grab_next(&mut buf, true));
            assert!(buf[..20].iter().all(|&b| b == i));
        }
        assert!(!video.grab_next(&mut buf, true));

        assert_eq!(video.seek(1), 1);
        assert!(video.grab_next(&mut buf, true));
        assert_eq!(buf[0], 1);
    }

    #[test]
    fn test_truncated_tail_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.pango");
        record(&path, 2);

        let bytes = std::fs::read(&path).unwrap();
        // Drop END and the last 5 data bytes
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();

        let video = PangoVideo::open_path(&path, false).unwrap();
        assert_eq!(video.total_frames(), 1);
    }

    #[test]
    fn test_write_requires_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = PangoVideoOutput::create(dir.path().join("x.pango")).unwrap();
        assert!(out.write_streams(&[0u8; 4]).is_err());
    }

    fn write_raw(path: &Path, header: &[u8]) {
        let mut buf = BytesMut::new();
        buf.put_slice(PANGO_MAGIC);
        buf.put_slice(TAG_SRC);
        put_varint(&mut buf, header.len());
        buf.put_slice(header);
        buf.put_slice(TAG_END);
        std::fs::write(path, &buf).unwrap();
    }

    #[test]
    fn test_oversized_header_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.pango");
        let mut buf = BytesMut::new();
        buf.put_slice(PANGO_MAGIC);
        buf.put_slice(TAG_SRC);
        put_varint(&mut buf, 1 << 62);
        std::fs::write(&path, &buf).unwrap();

        assert!(matches!(
            PangoVideo::open_path(&path, false),
            Err(VideoError::Corrupt(_))
        ));
    }

    #[test]
    fn test_declared_size_must_match_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("size.pango");
        let header = PacketLogHeader {
            version: LOG_VERSION,
            driver: "vidview".to_string(),
            uri: "test://".to_string(),
            streams: vec![StreamInfo::packed(PixelFormat::GRAY8, 4, 2, 0)],
            size_bytes: usize::MAX,
        };
        write_raw(&path, &serde_json::to_vec(&header).unwrap());
        assert!(matches!(
            PangoVideo::open_path(&path, false),
            Err(VideoError::Corrupt(_))
        ));

        let fixed = PacketLogHeader { size_bytes: 8, ..header };
        write_raw(&path, &serde_json::to_vec(&fixed).unwrap());
        let video = PangoVideo::open_path(&path, false).unwrap();
        assert_eq!(video.size_bytes(), 8);
        assert_eq!(video.total_frames(), 0);
    }

    #[test]
    fn test_overflowing_stream_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overflow.pango");
        let mut info = StreamInfo::packed(PixelFormat::GRAY8, 4, 2, 0);
        info.pitch = usize::MAX;
        let header = PacketLogHeader {
            version: LOG_VERSION,
            driver: "vidview".to_string(),
            uri: "test://".to_string(),
            streams: vec![info],
            size_bytes: 0,
        };
        write_raw(&path, &serde_json::to_vec(&header).unwrap());
        assert!(matches!(
            PangoVideo::open_path(&path, false),
            Err(VideoError::Corrupt(_))
        ));
    }

    #[test]
    fn test_not_a_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.pango");
        std::fs::write(&path, b"NOTPANGO").unwrap();
        assert!(matches!(
            PangoVideo::open_path(&path, false),
            Err(VideoError::Corrupt(_))
        ));
    }
}
