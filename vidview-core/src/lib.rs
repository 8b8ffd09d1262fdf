//! # vidview core
//!
//! URI-addressed multi-stream video sources, packet-log recording and
//! playback, and the state behind the viewer window.

// ============================================================================
// Sources and Sinks
// ============================================================================
pub mod uri;
pub mod pixel_format;
pub mod stream;
pub mod video;
pub mod drivers;
pub mod record;

// ============================================================================
// Viewer
// ============================================================================
pub mod windowing;
pub mod view;
pub mod layout;
pub mod capture;
pub mod viewer;
pub mod config;

// ============================================================================
// GPU
// ============================================================================
pub mod render;

pub use config::ViewerConfig;
pub use record::VideoRecordRepeat;
pub use video::{open_video, VideoError, VideoPlayback, VideoSink, VideoSource};
pub use viewer::{Command, ViewerState};
