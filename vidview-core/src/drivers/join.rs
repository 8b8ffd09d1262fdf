//! Join several sources into one: `join://{uri}{uri}...`
//!
//! Streams of every child are concatenated in child order. A frame-set
//! contains one frame from each child.

use crate::stream::StreamInfo;
use crate::uri::VideoUri;
use crate::video::{open_video, VideoError, VideoSource};

/// Upper bound on frames drained from a live child per `grab_newest`
const MAX_BACKLOG: usize = 64;

pub struct JoinVideo {
    children: Vec<Box<dyn VideoSource>>,
    streams: Vec<StreamInfo>,
    /// (offset, size) of each child's frame-set within ours
    spans: Vec<(usize, usize)>,
}

impl JoinVideo {
    pub fn open(uri: &VideoUri) -> Result<Self, VideoError> {
        let children = uri
            .braced_children()?
            .iter()
            .map(|child| open_video(child))
            .collect::<Result<Vec<_>, _>>()?;
        if children.is_empty() {
            return Err(VideoError::open(uri.to_string(), "join needs at least one child uri"));
        }
        Ok(Self::new(children))
    }

    pub fn new(children: Vec<Box<dyn VideoSource>>) -> Self {
        let mut streams = Vec::new();
        let mut spans = Vec::with_capacity(children.len());
        let mut base = 0;
        for child in &children {
            for s in child.streams() {
                streams.push(StreamInfo::new(s.format, s.width, s.height, s.pitch, base + s.offset));
            }
            spans.push((base, child.size_bytes()));
            base += child.size_bytes();
        }
        Self { children, streams, spans }
    }
}

impl VideoSource for JoinVideo {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn size_bytes(&self) -> usize {
        self.spans.last().map(|(o, s)| o + s).unwrap_or(0)
    }

    fn start(&mut self) {
        self.children.iter_mut().for_each(|c| c.start());
    }

    fn stop(&mut self) {
        self.children.iter_mut().for_each(|c| c.stop());
    }

    fn grab_next(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        let mut grabbed_any = false;
        for (child, &(offset, size)) in self.children.iter_mut().zip(&self.spans) {
            if let Some(slice) = frame_set.get_mut(offset..offset + size) {
                grabbed_any |= child.grab_next(slice, wait);
            }
        }
        grabbed_any
    }

    /// Drains the first child's backlog, then pulls the same number of
    /// frames from every other child so they stay in step.
    fn grab_newest(&mut self, frame_set: &mut [u8], wait: bool) -> bool {
        let Some((first, rest)) = self.children.split_first_mut() else {
            return false;
        };
        let (offset, size) = self.spans[0];
        let Some(slice) = frame_set.get_mut(offset..offset + size) else {
            return false;
        };

        let mut backlog = 0usize;
        while backlog < MAX_BACKLOG && first.grab_next(slice, false) {
            backlog += 1;
        }
        if backlog == 0 && wait && first.grab_next(slice, true) {
            backlog = 1;
        }

        let mut grabbed_any = backlog > 0;
        for (child, &(offset, size)) in rest.iter_mut().zip(&self.spans[1..]) {
            let Some(slice) = frame_set.get_mut(offset..offset + size) else {
                continue;
            };
            for _ in 0..backlog {
                grabbed_any |= child.grab_next(slice, true);
            }
        }
        grabbed_any
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::PixelFormat;

    #[test]
    fn test_streams_concatenate() {
        let uri = VideoUri::parse("join://{test:[size=4x2,n=2,fmt=GRAY8]//}{test:[size=2x2,fmt=RGB24]//}")
            .unwrap();
        let mut video = JoinVideo::open(&uri).unwrap();
        let streams = video.streams().to_vec();
        assert_eq!(streams.len(), 3);
        assert_eq!(streams[1].offset, 8);
        assert_eq!(streams[2].offset, 16);
        assert_eq!(streams[2].format, PixelFormat::RGB24);
        assert_eq!(video.size_bytes(), 16 + 12);

        let mut buf = vec![0u8; video.size_bytes()];
        assert!(video.grab_next(&mut buf, true));
    }

    #[test]
    fn test_grab_newest_keeps_children_in_step() {
        let uri = VideoUri::parse("join://{test:[size=2x2,fmt=GRAY8]//}{test:[size=2x2,fmt=GRAY8]//}").unwrap();
        let mut video = JoinVideo::open(&uri).unwrap();
        let mut buf = vec![0u8; video.size_bytes()];
        assert!(video.grab_newest(&mut buf, false));
        // Both children produced identical frame counts, so identical images
        assert_eq!(buf[..4], buf[4..]);
    }

    #[test]
    fn test_empty_join_fails() {
        let uri = VideoUri::parse("join://").unwrap();
        assert!(JoinVideo::open(&uri).is_err());
    }
}
