//! Brightness/contrast windowing
//!
//! Displayed value is `raw * scale + offset`, with `raw` normalised to
//! `[0, 1]` by the format's channel maximum.

use serde::{Deserialize, Serialize};

use crate::pixel_format::read_normalized;
use crate::stream::ImageRef;
use crate::view::XYRange;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetScale {
    pub offset: f32,
    pub scale: f32,
}

impl OffsetScale {
    pub const IDENTITY: OffsetScale = OffsetScale { offset: 0.0, scale: 1.0 };

    /// Map `[min, max]` onto `[0, 1]`
    pub fn from_range(min: f32, max: f32) -> Self {
        let range = max - min;
        if !range.is_finite() || range <= 0.0 {
            return Self::IDENTITY;
        }
        let scale = 1.0 / range;
        Self { offset: -min * scale, scale }
    }

    pub fn apply(&self, value: f32) -> f32 {
        value * self.scale + self.offset
    }
}

impl Default for OffsetScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` covered by `roi`, clamped to the image
pub fn pixel_rect(roi: &XYRange, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if !roi.is_finite() {
        return None;
    }
    let clamp = |v: f32, max: u32| v.max(0.0).min(max as f32) as u32;
    let x0 = clamp((roi.x_min.min(roi.x_max) + 0.5).floor(), width);
    let x1 = clamp((roi.x_min.max(roi.x_max) + 0.5).ceil(), width);
    let y0 = clamp((roi.y_min.min(roi.y_max) + 0.5).floor(), height);
    let y1 = clamp((roi.y_min.max(roi.y_max) + 0.5).ceil(), height);
    (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
}

/// Min and max over the colour channels of the pixels inside `roi`
pub fn min_max(image: ImageRef<'_>, roi: &XYRange) -> Option<(f32, f32)> {
    let (x0, y0, x1, y1) = pixel_rect(roi, image.width, image.height)?;
    let channels = image.format.color_channels();

    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for y in y0..y1 {
        for x in x0..x1 {
            let Some(px) = image.pixel(x, y) else { continue };
            for c in 0..channels {
                let v = read_normalized(image.format, px, c);
                if v.is_finite() {
                    lo = lo.min(v);
                    hi = hi.max(v);
                }
            }
        }
    }
    (lo <= hi).then_some((lo, hi))
}

/// Windowing that stretches the ROI's value range to full contrast
pub fn offset_scale(image: ImageRef<'_>, roi: &XYRange) -> OffsetScale {
    match min_max(image, roi) {
        Some((min, max)) => OffsetScale::from_range(min, max),
        None => OffsetScale::IDENTITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_format::PixelFormat;
    use crate::stream::StreamInfo;

    #[test]
    fn test_from_range() {
        let os = OffsetScale::from_range(0.25, 0.75);
        assert!((os.scale - 2.0).abs() < 1e-6);
        assert!((os.offset + 0.5).abs() < 1e-6);
        assert!(os.apply(0.25).abs() < 1e-6);
        assert!((os.apply(0.75) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_is_identity() {
        assert_eq!(OffsetScale::from_range(0.5, 0.5), OffsetScale::IDENTITY);
        assert_eq!(OffsetScale::from_range(0.7, 0.2), OffsetScale::IDENTITY);
        assert_eq!(OffsetScale::from_range(f32::NAN, 1.0), OffsetScale::IDENTITY);
    }

    #[test]
    fn test_min_max_over_roi() {
        let info = StreamInfo::packed(PixelFormat::GRAY8, 4, 2, 0);
        let data = [0u8, 51, 102, 255, 0, 51, 102, 255];
        let image = info.image(&data);

        let (lo, hi) = min_max(image, &XYRange::image_bounds(4, 2)).unwrap();
        assert_eq!((lo, hi), (0.0, 1.0));

        // Middle two columns only
        let (lo, hi) = min_max(image, &XYRange::new(1.0, 2.0, 0.0, 1.0)).unwrap();
        assert!((lo - 0.2).abs() < 1e-6);
        assert!((hi - 0.4).abs() < 1e-6);

        let os = offset_scale(image, &XYRange::new(1.0, 2.0, 0.0, 1.0));
        assert!((os.apply(0.2)).abs() < 1e-5);
        assert!((os.apply(0.4) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_roi_outside_image() {
        let info = StreamInfo::packed(PixelFormat::GRAY8, 2, 2, 0);
        let data = [10u8, 20, 30, 40];
        assert!(min_max(info.image(&data), &XYRange::new(10.0, 20.0, 10.0, 20.0)).is_none());
        assert_eq!(
            offset_scale(info.image(&data), &XYRange::new(10.0, 20.0, 10.0, 20.0)),
            OffsetScale::IDENTITY
        );
    }

    #[test]
    fn test_alpha_ignored() {
        let info = StreamInfo::packed(PixelFormat::RGBA32, 1, 1, 0);
        let data = [100u8, 150, 200, 0];
        let (lo, hi) = min_max(info.image(&data), &XYRange::image_bounds(1, 1)).unwrap();
        assert!((lo - 100.0 / 255.0).abs() < 1e-6);
        assert!((hi - 200.0 / 255.0).abs() < 1e-6);
    }
}
