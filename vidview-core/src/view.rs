//! Per-stream view state
//!
//! Image coordinates put pixel centres on integers, so a `w x h` image
//! covers `[-0.5, w - 0.5] x [-0.5, h - 0.5]`. Screen coordinates are
//! physical window pixels, y down.

use crate::layout::Region;
use crate::render::GpuPixelFormat;
use crate::stream::{ImageRef, StreamInfo};
use crate::windowing::OffsetScale;

// ============================================================================
// Ranges
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XYRange {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl XYRange {
    /// No selection
    pub const EMPTY: XYRange = XYRange { x_min: 0.0, x_max: 0.0, y_min: 0.0, y_max: 0.0 };

    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Self {
        Self { x_min, x_max, y_min, y_max }
    }

    /// Range spanning two corner points in either order
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self::new(a.0.min(b.0), a.0.max(b.0), a.1.min(b.1), a.1.max(b.1))
    }

    /// Full extent of a `width x height` image
    pub fn image_bounds(width: u32, height: u32) -> Self {
        Self::new(-0.5, width as f32 - 0.5, -0.5, height as f32 - 0.5)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Signed area
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn is_finite(&self) -> bool {
        self.x_min.is_finite() && self.x_max.is_finite() && self.y_min.is_finite() && self.y_max.is_finite()
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x_min + self.x_max) * 0.5, (self.y_min + self.y_max) * 0.5)
    }

    /// Scale about `(cx, cy)` by `factor`
    pub fn scaled_about(&self, cx: f32, cy: f32, factor: f32) -> Self {
        Self::new(
            cx + (self.x_min - cx) * factor,
            cx + (self.x_max - cx) * factor,
            cy + (self.y_min - cy) * factor,
            cy + (self.y_max - cy) * factor,
        )
    }

    /// Shift so the range lies within `bounds`, shrinking if it is larger
    pub fn clamped_within(&self, bounds: &XYRange) -> Self {
        let (x_min, x_max) = clamp_span(self.x_min, self.x_max, bounds.x_min, bounds.x_max);
        let (y_min, y_max) = clamp_span(self.y_min, self.y_max, bounds.y_min, bounds.y_max);
        Self::new(x_min, x_max, y_min, y_max)
    }
}

fn clamp_span(min: f32, max: f32, lo: f32, hi: f32) -> (f32, f32) {
    if max - min >= hi - lo {
        return (lo, hi);
    }
    if min < lo {
        (lo, lo + (max - min))
    } else if max > hi {
        (hi - (max - min), hi)
    } else {
        (min, max)
    }
}

// ============================================================================
// Stream view
// ============================================================================

/// Display state for one stream
#[derive(Debug, Clone)]
pub struct StreamView {
    pub info: StreamInfo,
    pub gpu_format: GpuPixelFormat,
    pub offset_scale: OffsetScale,
    /// User-dragged region of interest, image coordinates
    pub selection: XYRange,
    /// Currently visible part of the image
    pub view: XYRange,
    pub shown: bool,
    /// Screen region, physical pixels
    pub region: Region,
    /// Cursor position in image coordinates while over this view
    pub hover: Option<(f32, f32)>,
    drag_start: Option<(f32, f32)>,
}

impl StreamView {
    pub fn new(info: StreamInfo) -> Self {
        Self {
            info,
            gpu_format: GpuPixelFormat::for_format(info.format),
            offset_scale: OffsetScale::IDENTITY,
            selection: XYRange::EMPTY,
            view: XYRange::image_bounds(info.width, info.height),
            shown: true,
            region: Region::default(),
            hover: None,
            drag_start: None,
        }
    }

    pub fn bounds(&self) -> XYRange {
        XYRange::image_bounds(self.info.width, self.info.height)
    }

    /// Visible range of the image
    pub fn view_to_render(&self) -> XYRange {
        self.view
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_start.is_some()
    }

    /// Map a screen position inside `region` to image coordinates
    pub fn screen_to_image(&self, px: f32, py: f32) -> (f32, f32) {
        let r = &self.region;
        let u = if r.width > 0.0 { (px - r.x) / r.width } else { 0.0 };
        let v = if r.height > 0.0 { (py - r.y) / r.height } else { 0.0 };
        (self.view.x_min + u * self.view.width(), self.view.y_min + v * self.view.height())
    }

    /// Selection when it is large enough to window from, otherwise the
    /// whole visible region
    pub fn windowing_roi(&self) -> XYRange {
        if self.selection.is_finite() && self.selection.area().abs() >= 4.0 {
            self.selection
        } else {
            self.view_to_render()
        }
    }

    pub fn mouse_down(&mut self, px: f32, py: f32) {
        let p = self.screen_to_image(px, py);
        self.drag_start = Some(p);
        self.selection = XYRange::from_corners(p, p);
    }

    pub fn mouse_drag(&mut self, px: f32, py: f32) {
        let p = self.screen_to_image(px, py);
        self.hover = Some(p);
        if let Some(start) = self.drag_start {
            self.selection = XYRange::from_corners(start, p);
        }
    }

    pub fn mouse_up(&mut self, px: f32, py: f32) {
        self.mouse_drag(px, py);
        self.drag_start = None;
    }

    pub fn mouse_move(&mut self, px: f32, py: f32) {
        self.hover = Some(self.screen_to_image(px, py));
    }

    /// Zoom about the cursor. Positive `steps` zoom in; the view never
    /// grows past the image.
    pub fn scroll(&mut self, px: f32, py: f32, steps: f32, zoom_step: f32) {
        let (cx, cy) = self.screen_to_image(px, py);
        let factor = zoom_step.powf(-steps);
        let bounds = self.bounds();
        let zoomed = self.view.scaled_about(cx, cy, factor);
        // One pixel is as far as zoom goes
        if zoomed.width() < 1.0 || zoomed.height() < 1.0 {
            return;
        }
        self.view = zoomed.clamped_within(&bounds);
    }

    /// Back to the whole image with no selection
    pub fn reset_view(&mut self) {
        self.view = self.bounds();
        self.selection = XYRange::EMPTY;
        self.drag_start = None;
    }

    /// Pixel under the cursor and its value, e.g. `(12, 40) = [0.5 0.2 0.1]`
    pub fn readout(&self, image: Option<ImageRef<'_>>) -> Option<String> {
        let (x, y) = self.hover?;
        let (ix, iy) = ((x + 0.5).floor(), (y + 0.5).floor());
        if ix < 0.0 || iy < 0.0 {
            return None;
        }
        let (ix, iy) = (ix as u32, iy as u32);
        let rgba = image?.rgba_at(ix, iy)?;
        let channels = self.info.format.color_channels();
        let values: Vec<String> = rgba[..channels.min(3)]
            .iter()
            .map(|v| format!("{:.3}", v))
            .collect();
        Some(format!("({}, {}) = [{}]", ix, iy, values.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::PixelFormat;

    fn view_100x50() -> StreamView {
        let mut view = StreamView::new(StreamInfo::packed(PixelFormat::GRAY8, 100, 50, 0));
        view.region = Region::new(0.0, 0.0, 200.0, 100.0);
        view
    }

    fn assert_range_near(a: XYRange, b: XYRange) {
        for (x, y) in [(a.x_min, b.x_min), (a.x_max, b.x_max), (a.y_min, b.y_min), (a.y_max, b.y_max)] {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_screen_to_image() {
        let view = view_100x50();
        assert_eq!(view.screen_to_image(0.0, 0.0), (-0.5, -0.5));
        assert_eq!(view.screen_to_image(200.0, 100.0), (99.5, 49.5));
    }

    #[test]
    fn test_drag_selection() {
        let mut view = view_100x50();
        view.mouse_down(41.0, 21.0);
        assert!(view.is_dragging());
        view.mouse_up(21.0, 41.0);
        assert!(!view.is_dragging());
        assert_range_near(view.selection, XYRange::new(10.0, 20.0, 10.0, 20.0));
        assert_eq!(view.windowing_roi(), view.selection);
    }

    #[test]
    fn test_small_selection_falls_back_to_view() {
        let mut view = view_100x50();
        view.selection = XYRange::new(3.0, 4.0, 3.0, 6.0);
        assert_eq!(view.windowing_roi(), view.view_to_render());

        view.selection = XYRange::new(f32::NAN, 4.0, 3.0, 6.0);
        assert_eq!(view.windowing_roi(), view.view_to_render());

        view.selection = XYRange::new(3.0, 5.0, 3.0, 5.0);
        assert_eq!(view.windowing_roi(), view.selection);
    }

    #[test]
    fn test_zoom_stays_inside_image() {
        let mut view = view_100x50();
        view.scroll(20.0, 20.0, 3.0, 1.1);
        assert!(view.view.width() < 100.0);
        let bounds = view.bounds();
        assert!(view.view.x_min >= bounds.x_min && view.view.x_max <= bounds.x_max);

        // Zooming out past the image stops at the image
        view.scroll(20.0, 20.0, -50.0, 1.1);
        assert_eq!(view.view, bounds);

        view.selection = XYRange::new(1.0, 9.0, 1.0, 9.0);
        view.scroll(100.0, 50.0, 2.0, 1.1);
        view.reset_view();
        assert_eq!(view.view, bounds);
        assert_eq!(view.selection, XYRange::EMPTY);
    }

    #[test]
    fn test_readout() {
        let info = StreamInfo::packed(PixelFormat::GRAY8, 2, 1, 0);
        let mut view = StreamView::new(info);
        view.hover = Some((1.2, -0.3));
        let data = [0u8, 255];
        assert_eq!(view.readout(Some(info.image(&data))).unwrap(), "(1, 0) = [1.000]");
        view.hover = Some((5.0, 0.0));
        assert!(view.readout(Some(info.image(&data))).is_none());
    }
}
