//! # Viewer State
//!
//! Everything the viewer loop mutates between frames: the frame counter,
//! the pause limit, the shared frame-set buffer and one view per stream.
//! Key and mouse input are applied here; the window and GPU live in the
//! binary.
//!
//! Keys:
//! - `1`-`9` toggle stream visibility, shifted digits save a screenshot
//! - `r` record, `p` play the recording, `s` back to the live source
//! - space pause, `,` / `.` seek or single-step
//! - `a` / `g` auto-window the focused stream / all streams

use crate::capture::{make_unique_filename, save_image};
use crate::config::ViewerConfig;
use crate::layout::layout_equal;
use crate::record::VideoRecordRepeat;
use crate::stream::ImageRef;
use crate::video::VideoSource;
use crate::view::StreamView;
use crate::windowing::{offset_scale, OffsetScale};

/// Pause limit meaning "never pause"
pub const UNBOUNDED: usize = usize::MAX;

const SCREENSHOT_KEYS: [char; 9] = ['!', '"', '#', '$', '%', '^', '&', '*', '('];

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Zero-based stream index
    ToggleStream(usize),
    Screenshot(usize),
    ToggleRecord,
    PlayRecording,
    LiveSource,
    TogglePause,
    SeekBack,
    SeekForward,
    AdaptFocused,
    AdaptAll,
    Quit,
}

impl Command {
    pub fn from_char(c: char) -> Option<Self> {
        if let Some(d) = c.to_digit(10) {
            return (d >= 1).then(|| Command::ToggleStream(d as usize - 1));
        }
        if let Some(i) = SCREENSHOT_KEYS.iter().position(|&k| k == c) {
            return Some(Command::Screenshot(i));
        }
        match c {
            // US layouts put `@` on shift-2
            '@' => Some(Command::Screenshot(1)),
            'r' => Some(Command::ToggleRecord),
            'p' => Some(Command::PlayRecording),
            's' => Some(Command::LiveSource),
            ' ' => Some(Command::TogglePause),
            ',' => Some(Command::SeekBack),
            '.' => Some(Command::SeekForward),
            'a' => Some(Command::AdaptFocused),
            'g' => Some(Command::AdaptAll),
            '\u{1b}' => Some(Command::Quit),
            _ => None,
        }
    }
}

// ============================================================================
// State
// ============================================================================

pub struct ViewerState {
    /// Frames grabbed so far
    pub frame: usize,
    /// Grabbing stops once `frame` reaches this
    pub end_frame: usize,
    pub frame_skip: usize,
    pub views: Vec<StreamView>,
    /// View under the cursor
    pub focus: Option<usize>,
    pub quit: bool,
    buffer: Vec<u8>,
    has_image: bool,
    screenshot_name: String,
    zoom_step: f32,
}

impl ViewerState {
    pub fn new(video: &mut VideoRecordRepeat, config: &ViewerConfig) -> Self {
        let views = video.streams().iter().copied().map(StreamView::new).collect();
        let mut end_frame = UNBOUNDED;

        if let Some(playback) = video.playback() {
            let total = playback.total_frames();
            if total < UNBOUNDED {
                tracing::info!("Video length: {} frames", total);
                end_frame = 1;
            }
        }

        Self {
            frame: 0,
            end_frame,
            frame_skip: config.frame_skip,
            views,
            focus: None,
            quit: false,
            buffer: vec![0u8; video.size_bytes() + 1],
            has_image: false,
            screenshot_name: config.screenshot_name.clone(),
            zoom_step: config.zoom_step,
        }
    }

    pub fn is_paused(&self) -> bool {
        !(self.frame == 0 || self.frame < self.end_frame)
    }

    /// Pull one frame-set unless paused. Returns whether a new one arrived.
    pub fn step(&mut self, video: &mut VideoRecordRepeat) -> bool {
        if self.is_paused() {
            return false;
        }
        if video.grab(&mut self.buffer) {
            self.frame += 1;
            self.has_image = true;
            true
        } else {
            false
        }
    }

    /// Most recent image of stream `index`, once anything has been grabbed
    pub fn image(&self, index: usize) -> Option<ImageRef<'_>> {
        if !self.has_image {
            return None;
        }
        self.views.get(index).map(|v| v.info.image(&self.buffer))
    }

    pub fn has_image(&self) -> bool {
        self.has_image
    }

    /// Apply one key command. Failures are logged, never fatal.
    pub fn apply(&mut self, command: Command, video: &mut VideoRecordRepeat) {
        tracing::debug!("{:?}", command);
        match command {
            Command::ToggleStream(i) => {
                if let Some(view) = self.views.get_mut(i) {
                    view.shown = !view.shown;
                }
            }
            Command::Screenshot(i) => self.screenshot(i),
            Command::ToggleRecord => {
                let result = if video.is_recording() { video.stop() } else { video.record() };
                if let Err(e) = result {
                    tracing::warn!("Recording failed: {}", e);
                }
            }
            Command::PlayRecording => {
                match video.play() {
                    Ok(()) => tracing::info!("Playing {}", video.output_uri()),
                    Err(e) => tracing::warn!("Unable to play recording: {}", e),
                }
                self.end_frame = UNBOUNDED;
            }
            Command::LiveSource => {
                video.source();
                tracing::info!("Live source {}", video.input_uri());
                self.end_frame = UNBOUNDED;
            }
            Command::TogglePause => {
                self.end_frame = if self.frame < self.end_frame { self.frame } else { UNBOUNDED };
            }
            Command::SeekBack => self.seek_back(video),
            Command::SeekForward => self.seek_forward(video),
            Command::AdaptFocused => {
                if let Some(i) = self.focus {
                    if let Some(os) = self.adapt_for(i) {
                        self.views[i].offset_scale = os;
                    }
                }
            }
            Command::AdaptAll => {
                let os = match self.focus {
                    Some(i) => match self.adapt_for(i) {
                        Some(os) => os,
                        None => return,
                    },
                    None => OffsetScale::IDENTITY,
                };
                self.views.iter_mut().for_each(|v| v.offset_scale = os);
            }
            Command::Quit => self.quit = true,
        }
    }

    fn seek_back(&mut self, video: &mut VideoRecordRepeat) {
        let Some(playback) = video.playback() else { return };
        let total = playback.total_frames();
        let target = playback
            .current_frame()
            .saturating_sub(self.frame_skip)
            .min(total.saturating_sub(1));
        playback.seek(target);
        self.show_seeked_frame();
    }

    fn seek_forward(&mut self, video: &mut VideoRecordRepeat) {
        match video.playback() {
            Some(playback) => {
                let target = playback.current_frame().saturating_add(self.frame_skip);
                playback.seek(target);
                self.show_seeked_frame();
            }
            None => self.end_frame = self.frame + 1,
        }
    }

    /// Let exactly one frame through while paused so a seek shows up
    fn show_seeked_frame(&mut self) {
        if self.is_paused() {
            self.end_frame = self.frame + 1;
        }
    }

    /// Windowing for view `index` from its selection or visible region
    fn adapt_for(&self, index: usize) -> Option<OffsetScale> {
        let image = self.image(index)?;
        let roi = self.views[index].windowing_roi();
        Some(offset_scale(image, &roi))
    }

    fn screenshot(&self, index: usize) {
        let Some(image) = self.image(index) else {
            tracing::warn!("No frame for stream {} to save", index + 1);
            return;
        };
        let path = make_unique_filename(&self.screenshot_name);
        if let Err(e) = save_image(image, &path) {
            tracing::warn!("Failed to save {}: {}", path.display(), e);
        }
    }

    // ------------------------------------------------------------------------
    // Layout and mouse
    // ------------------------------------------------------------------------

    /// Lay the shown views out over a `width x height` window
    pub fn layout(&mut self, width: f32, height: f32) {
        let shown: Vec<usize> = (0..self.views.len()).filter(|&i| self.views[i].shown).collect();
        let aspects: Vec<f32> = shown.iter().map(|&i| self.views[i].info.aspect()).collect();
        for (&i, region) in shown.iter().zip(layout_equal(&aspects, width, height)) {
            self.views[i].region = region;
        }
    }

    /// Shown view under a screen position
    pub fn view_at(&self, px: f32, py: f32) -> Option<usize> {
        // Hidden views keep their last region, so skip them while searching
        self.views.iter().position(|v| v.shown && v.region.contains(px, py))
    }

    pub fn mouse_move(&mut self, px: f32, py: f32) {
        // Keep dragging in the view the drag started in
        if let Some(i) = self.focus.filter(|&i| self.views[i].is_dragging()) {
            self.views[i].mouse_drag(px, py);
            return;
        }
        self.focus = self.view_at(px, py);
        for (i, view) in self.views.iter_mut().enumerate() {
            if Some(i) == self.focus {
                view.mouse_move(px, py);
            } else {
                view.hover = None;
            }
        }
    }

    pub fn mouse_press(&mut self, px: f32, py: f32) {
        self.focus = self.view_at(px, py);
        if let Some(i) = self.focus {
            self.views[i].mouse_down(px, py);
        }
    }

    pub fn mouse_release(&mut self, px: f32, py: f32) {
        if let Some(i) = self.focus {
            if self.views[i].is_dragging() {
                self.views[i].mouse_up(px, py);
            }
        }
    }

    pub fn scroll(&mut self, px: f32, py: f32, steps: f32) {
        if let Some(i) = self.view_at(px, py) {
            self.views[i].scroll(px, py, steps, self.zoom_step);
        }
    }

    pub fn reset_view_at(&mut self, px: f32, py: f32) {
        if let Some(i) = self.view_at(px, py) {
            self.views[i].reset_view();
        }
    }

    /// Cursor readout for the window title
    pub fn status(&self, video: &VideoRecordRepeat) -> String {
        let mut parts = vec![format!("frame {}", self.frame)];
        if self.is_paused() {
            parts.push("paused".to_string());
        }
        if video.is_recording() {
            parts.push("REC".to_string());
        }
        if video.is_playing() {
            parts.push("playback".to_string());
        }
        if let Some(i) = self.focus {
            if let Some(readout) = self.views[i].readout(self.image(i)) {
                parts.push(format!("stream {} {}", i + 1, readout));
            }
        }
        parts.join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::XYRange;

    fn open(input: &str, dir: &tempfile::TempDir) -> (VideoRecordRepeat, ViewerState) {
        let output = format!("pango://{}", dir.path().join("video.pango").display());
        let mut video = VideoRecordRepeat::open(input, &output).unwrap();
        let config = ViewerConfig {
            screenshot_name: dir.path().join("capture.png").display().to_string(),
            ..Default::default()
        };
        let state = ViewerState::new(&mut video, &config);
        (video, state)
    }

    /// Recorded log of `frames` frames, reopened as a random-access source
    fn seekable(frames: usize, dir: &tempfile::TempDir) -> (VideoRecordRepeat, ViewerState) {
        let (mut live, mut state) = open("test:[size=4x4,fmt=GRAY8]//", dir);
        live.record().unwrap();
        for _ in 0..frames {
            assert!(state.step(&mut live));
        }
        live.stop().unwrap();
        drop(live);

        let input = dir.path().join("video.pango").display().to_string();
        let output = format!("pango://{}", dir.path().join("other.pango").display());
        let mut video = VideoRecordRepeat::open(&input, &output).unwrap();
        let state = ViewerState::new(&mut video, &ViewerConfig::default());
        (video, state)
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_char('1'), Some(Command::ToggleStream(0)));
        assert_eq!(Command::from_char('9'), Some(Command::ToggleStream(8)));
        assert_eq!(Command::from_char('0'), None);
        assert_eq!(Command::from_char('!'), Some(Command::Screenshot(0)));
        assert_eq!(Command::from_char('"'), Some(Command::Screenshot(1)));
        assert_eq!(Command::from_char('('), Some(Command::Screenshot(8)));
        assert_eq!(Command::from_char(' '), Some(Command::TogglePause));
        assert_eq!(Command::from_char('x'), None);
    }

    #[test]
    fn test_pause_toggles_back_to_unbounded() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=4x4]//", &dir);
        assert_eq!(state.end_frame, UNBOUNDED);
        assert!(state.step(&mut video));
        assert!(state.step(&mut video));

        state.apply(Command::TogglePause, &mut video);
        assert_eq!(state.end_frame, 2);
        assert!(state.is_paused());
        assert!(!state.step(&mut video));
        assert_eq!(state.frame, 2);

        state.apply(Command::TogglePause, &mut video);
        assert_eq!(state.end_frame, UNBOUNDED);
        assert!(state.step(&mut video));
    }

    #[test]
    fn test_single_step_on_live_source() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=4x4]//", &dir);
        state.step(&mut video);
        state.apply(Command::TogglePause, &mut video);

        state.apply(Command::SeekForward, &mut video);
        assert_eq!(state.end_frame, 2);
        assert!(state.step(&mut video));
        assert!(!state.step(&mut video));

        // Backward seek without random access does nothing
        state.apply(Command::SeekBack, &mut video);
        assert_eq!(state.end_frame, 2);
        assert_eq!(state.frame, 2);
    }

    #[test]
    fn test_finite_source_starts_paused_on_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = seekable(5, &dir);
        assert_eq!(state.end_frame, 1);
        assert!(state.step(&mut video));
        assert!(!state.step(&mut video));
        assert!(state.is_paused());
    }

    #[test]
    fn test_seek_back_then_forward_stays_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = seekable(50, &dir);
        state.frame_skip = 30;
        state.end_frame = UNBOUNDED;
        for _ in 0..40 {
            assert!(state.step(&mut video));
        }
        assert_eq!(video.playback().unwrap().current_frame(), 40);

        state.apply(Command::SeekBack, &mut video);
        assert_eq!(video.playback().unwrap().current_frame(), 10);
        state.apply(Command::SeekForward, &mut video);
        assert_eq!(video.playback().unwrap().current_frame(), 40);

        // Clamped at both ends
        state.apply(Command::SeekForward, &mut video);
        assert_eq!(video.playback().unwrap().current_frame(), 49);
        state.apply(Command::SeekBack, &mut video);
        state.apply(Command::SeekBack, &mut video);
        assert_eq!(video.playback().unwrap().current_frame(), 0);
    }

    #[test]
    fn test_hidden_stream_still_grabbed() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=4x4,n=2]//", &dir);
        state.apply(Command::ToggleStream(1), &mut video);
        assert!(!state.views[1].shown);
        assert!(state.step(&mut video));
        assert!(state.image(1).unwrap().is_complete());

        state.layout(200.0, 100.0);
        assert_eq!(state.view_at(150.0, 50.0), None);
        assert_eq!(state.view_at(50.0, 50.0), Some(0));

        // Out-of-range digit is ignored
        state.apply(Command::ToggleStream(7), &mut video);
        state.apply(Command::ToggleStream(1), &mut video);
        assert!(state.views[1].shown);
    }

    #[test]
    fn test_hiding_first_stream_frees_its_cell() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=100x100,n=2]//", &dir);
        state.layout(200.0, 100.0);
        assert_eq!(state.view_at(60.0, 50.0), Some(0));

        state.apply(Command::ToggleStream(0), &mut video);
        state.layout(200.0, 100.0);
        // Stream 2 now sits centred over part of stream 1's old cell
        assert_eq!(state.view_at(60.0, 50.0), Some(1));
        assert_eq!(state.view_at(20.0, 50.0), None);

        state.mouse_move(60.0, 50.0);
        assert_eq!(state.focus, Some(1));
    }

    #[test]
    fn test_record_toggle_makes_one_segment() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=4x4]//", &dir);
        state.step(&mut video);
        state.apply(Command::ToggleRecord, &mut video);
        assert!(video.is_recording());
        state.step(&mut video);
        state.step(&mut video);
        state.apply(Command::ToggleRecord, &mut video);
        assert!(!video.is_recording());
        state.step(&mut video);
        assert_eq!(video.segments_recorded(), 1);
        assert_eq!(video.frames_recorded(), 2);

        state.apply(Command::TogglePause, &mut video);
        state.apply(Command::PlayRecording, &mut video);
        assert!(video.is_playing());
        assert_eq!(state.end_frame, UNBOUNDED);
        state.apply(Command::LiveSource, &mut video);
        assert!(!video.is_playing());
    }

    #[test]
    fn test_adapt_uses_selection_or_visible_region() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=64x8,fmt=GRAY8]//", &dir);

        // Nothing grabbed yet, nothing to adapt from
        state.focus = Some(0);
        state.apply(Command::AdaptFocused, &mut video);
        assert_eq!(state.views[0].offset_scale, OffsetScale::IDENTITY);

        state.step(&mut video);
        let full = offset_scale(state.image(0).unwrap(), &state.views[0].view_to_render());

        // Degenerate selection falls back to the whole view
        state.views[0].selection = XYRange::new(2.0, 3.0, 2.0, 3.0);
        state.apply(Command::AdaptFocused, &mut video);
        assert_eq!(state.views[0].offset_scale, full);

        let selection = XYRange::new(2.0, 6.0, 2.0, 6.0);
        state.views[0].selection = selection;
        state.apply(Command::AdaptAll, &mut video);
        let expected = offset_scale(state.image(0).unwrap(), &selection);
        assert_eq!(state.views[0].offset_scale, expected);

        // `g` without focus resets everything
        state.focus = None;
        state.apply(Command::AdaptAll, &mut video);
        assert_eq!(state.views[0].offset_scale, OffsetScale::IDENTITY);
    }

    #[test]
    fn test_screenshots_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=4x4]//", &dir);

        // No frame yet: logged, nothing written
        state.apply(Command::Screenshot(0), &mut video);
        assert!(!dir.path().join("capture.png").exists());

        state.step(&mut video);
        state.apply(Command::Screenshot(0), &mut video);
        state.apply(Command::Screenshot(0), &mut video);
        assert!(dir.path().join("capture.png").exists());
        assert!(dir.path().join("capture_1.png").exists());

        // Stream that does not exist
        state.apply(Command::Screenshot(5), &mut video);
        assert!(!dir.path().join("capture_2.png").exists());
    }

    #[test]
    fn test_mouse_drag_selects_in_focused_view() {
        let dir = tempfile::tempdir().unwrap();
        let (mut video, mut state) = open("test:[size=100x100]//", &dir);
        state.step(&mut video);
        state.layout(100.0, 100.0);

        state.mouse_press(10.0, 10.0);
        assert_eq!(state.focus, Some(0));
        state.mouse_move(30.0, 40.0);
        state.mouse_release(30.0, 40.0);
        let sel = state.views[0].selection;
        assert!(sel.area() > 4.0);
        assert!(state.status(&video).contains("stream 1"));

        state.reset_view_at(50.0, 50.0);
        assert_eq!(state.views[0].selection, XYRange::EMPTY);

        state.apply(Command::Quit, &mut video);
        assert!(state.quit);
    }
}
