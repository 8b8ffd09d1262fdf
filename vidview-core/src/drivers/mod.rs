//! # Video Drivers
//!
//! One module per URI scheme family. `video::open_video` picks the driver.

pub mod convert;
pub mod images;
pub mod join;
pub mod mjpeg;
pub mod pango;
pub mod test_pattern;
