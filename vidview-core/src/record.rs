//! # Record / Repeat
//!
//! Wraps a live source with a record destination and a way to play the
//! recording back:
//! - `record()` / `stop()` bracket one recorded segment
//! - `play()` grabs from the recorded packet log instead of the live input
//! - `source()` returns to the live input

use crate::drivers::pango::PangoVideo;
use crate::stream::StreamInfo;
use crate::video::{open_output, open_video, output_path, VideoError, VideoPlayback, VideoSink, VideoSource};

pub struct VideoRecordRepeat {
    input_uri: String,
    output_uri: String,
    live: Box<dyn VideoSource>,
    repeat: Option<PangoVideo>,
    sink: Option<Box<dyn VideoSink>>,
    segments: usize,
    frames_recorded: usize,
}

impl VideoRecordRepeat {
    /// Open `input_uri` for display, recording to `output_uri` on demand.
    /// Fails with `NoStreams` if the source has nothing to show.
    pub fn open(input_uri: &str, output_uri: &str) -> Result<Self, VideoError> {
        let live = open_video(input_uri)?;
        Self::from_source(live, input_uri, output_uri)
    }

    pub fn from_source(
        mut live: Box<dyn VideoSource>,
        input_uri: &str,
        output_uri: &str,
    ) -> Result<Self, VideoError> {
        if live.streams().is_empty() {
            return Err(VideoError::NoStreams);
        }
        live.start();

        Ok(Self {
            input_uri: input_uri.to_string(),
            output_uri: output_uri.to_string(),
            live,
            repeat: None,
            sink: None,
            segments: 0,
            frames_recorded: 0,
        })
    }

    pub fn input_uri(&self) -> &str {
        &self.input_uri
    }

    pub fn output_uri(&self) -> &str {
        &self.output_uri
    }

    /// First stream's width, used to size the window
    pub fn width(&self) -> u32 {
        self.streams().first().map(|s| s.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.streams().first().map(|s| s.height).unwrap_or(0)
    }

    pub fn is_recording(&self) -> bool {
        self.sink.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.repeat.is_some()
    }

    /// Completed or in-progress record segments since open
    pub fn segments_recorded(&self) -> usize {
        self.segments
    }

    pub fn frames_recorded(&self) -> usize {
        self.frames_recorded
    }

    /// Start writing grabbed frames to the output. Switches back to the
    /// live input first if a recording is being played.
    pub fn record(&mut self) -> Result<(), VideoError> {
        if self.is_recording() {
            return Ok(());
        }
        self.source();

        let mut sink = open_output(&self.output_uri)?;
        sink.set_streams(self.live.streams(), &self.input_uri)?;
        self.sink = Some(sink);
        self.segments += 1;
        tracing::info!("Started recording to {}", self.output_uri);
        Ok(())
    }

    /// Finish the current segment. No-op when not recording.
    pub fn stop(&mut self) -> Result<(), VideoError> {
        if let Some(mut sink) = self.sink.take() {
            sink.close()?;
            tracing::info!(
                "Finished recording segment {} ({} frames total)",
                self.segments_recorded,
                self.frames_recorded
            );
        }
        Ok(())
    }

    /// Switch to playing back the recorded output
    pub fn play(&mut self) -> Result<(), VideoError> {
        self.stop()?;

        let path = output_path(&self.output_uri)
            .ok_or_else(|| VideoError::UnsupportedScheme(self.output_uri.clone()))?;
        let mut video = PangoVideo::open_path(&path, true)?;
        if video.streams() != self.live.streams() {
            return Err(VideoError::open(path, "recorded stream layout differs from the live input"));
        }
        video.start();
        self.repeat = Some(video);
        Ok(())
    }

    /// Switch back to the live input
    pub fn source(&mut self) {
        if let Some(mut video) = self.repeat.take() {
            video.stop();
        }
    }

    fn active(&mut self) -> &mut dyn VideoSource {
        match self.repeat.as_mut() {
            Some(video) => video,
            None => self.live.as_mut(),
        }
    }

    /// Grab one frame-set from the active input, recording it if enabled
    pub fn grab(&mut self, frame_set: &mut [u8]) -> bool {
        self.grab_next(frame_set, true)
    }
}

impl VideoSource for VideoRecordRepeat {
    fn streams(&self) -> &[StreamInfo] {
        match &self.repeat {
            Some(video) => video.streams(),
            None => self.live.streams(),
        }
    }

    fn size_bytes(&self) -> usize {
        self.live.size_bytes()
    }

    fn start(&mut self) {
        self.live.start();
    }

    fn stop(&mut self) {
        self.live.stop();
    }

    fn grab_next(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        if !self.active().grab_next(frame_set, wait) {
            return false;
        }

        if let Some(sink) = self.sink.as_mut() {
            let size = self.live.size_bytes().min(frame_set.len());
            match sink.write_streams(&frame_set[..size]) {
                Ok(()) => self.frames_recorded += 1,
                Err(e) => {
                    tracing::warn!("Recording stopped, write failed: {}", e);
                    self.sink = None;
                }
            }
        }
        true
    }

    fn playback(&mut self) -> Option<&mut dyn VideoPlayback> {
        self.active().playback()
    }
}

impl Drop for VideoRecordRepeat {
    fn drop(&mut self) {
        if let Err(e) = VideoRecordRepeat::stop(self) {
            tracing::warn!("Failed to finish recording: {}", e);
        }
        self.live.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_uri(dir: &tempfile::TempDir) -> String {
        format!("pango://{}", dir.path().join("video.pango").display())
    }

    #[test]
    fn test_zero_streams_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = VideoRecordRepeat::open("test:[n=0]//", &output_uri(&dir));
        assert!(matches!(result, Err(VideoError::NoStreams)));
    }

    #[test]
    fn test_record_segment_then_play() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = VideoRecordRepeat::open("test:[size=8x4,fmt=GRAY8]//", &output_uri(&dir)).unwrap();
        let mut buf = vec![0u8; video.size_bytes() + 1];

        // Not recorded
        assert!(video.grab(&mut buf));

        video.record().unwrap();
        assert!(video.is_recording());
        let mut recorded = Vec::new();
        for _ in 0..3 {
            assert!(video.grab(&mut buf));
            recorded.push(buf[..32].to_vec());
        }
        video.stop().unwrap();
        assert!(!video.is_recording());

        // Not recorded either
        assert!(video.grab(&mut buf));
        assert_eq!(video.segments_recorded(), 1);
        assert_eq!(video.frames_recorded(), 3);

        video.play().unwrap();
        assert!(video.is_playing());
        assert_eq!(video.playback().unwrap().total_frames(), 3);
        for expected in &recorded {
            assert!(video.grab(&mut buf));
            assert_eq!(&buf[..32], &expected[..]);
        }
        assert!(!video.grab(&mut buf));

        video.source();
        assert!(!video.is_playing());
        assert!(video.playback().is_none());
        assert!(video.grab(&mut buf));
    }

    #[test]
    fn test_play_without_recording_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = VideoRecordRepeat::open("test:[size=4x4]//", &output_uri(&dir)).unwrap();
        assert!(video.play().is_err());
        assert!(!video.is_playing());
    }

    #[test]
    fn test_unsupported_output() {
        let mut video = VideoRecordRepeat::open("test:[size=4x4]//", "ffmpeg://out.mp4").unwrap();
        assert!(matches!(video.record(), Err(VideoError::UnsupportedScheme(_))));
        assert!(!video.is_recording());
        assert_eq!(video.segments_recorded(), 0);
    }
}
