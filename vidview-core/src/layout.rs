//! Equal-grid layout of stream views within the window

/// Screen rectangle in physical pixels, origin top-left
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Region {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.x + self.width && py >= self.y && py < self.y + self.height
    }

    /// Largest rectangle of `aspect` (width / height) centred in this one
    pub fn letterbox(&self, aspect: f32) -> Region {
        if !(aspect.is_finite() && aspect > 0.0) || self.width <= 0.0 || self.height <= 0.0 {
            return *self;
        }
        let (w, h) = if self.width / self.height > aspect {
            (self.height * aspect, self.height)
        } else {
            (self.width, self.width / aspect)
        };
        Region::new(self.x + (self.width - w) * 0.5, self.y + (self.height - h) * 0.5, w, h)
    }
}

/// Grid of `ceil(sqrt(n))` columns filling `width x height`, each cell
/// letterboxed to the matching entry of `aspects`
pub fn layout_equal(aspects: &[f32], width: f32, height: f32) -> Vec<Region> {
    let n = aspects.len();
    if n == 0 {
        return Vec::new();
    }
    let cols = (n as f32).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let cell_w = width / cols as f32;
    let cell_h = height / rows as f32;

    aspects
        .iter()
        .enumerate()
        .map(|(i, &aspect)| {
            let (col, row) = (i % cols, i / cols);
            Region::new(col as f32 * cell_w, row as f32 * cell_h, cell_w, cell_h).letterbox(aspect)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_view_letterboxed() {
        let regions = layout_equal(&[2.0], 400.0, 400.0);
        assert_eq!(regions, vec![Region::new(0.0, 100.0, 400.0, 200.0)]);
    }

    #[test]
    fn test_grid_shape() {
        let regions = layout_equal(&[1.0; 2], 200.0, 100.0);
        assert_eq!(regions[0], Region::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(regions[1], Region::new(100.0, 0.0, 100.0, 100.0));

        // Three views make a 2x2 grid with one empty cell
        let regions = layout_equal(&[1.0; 3], 200.0, 200.0);
        assert_eq!(regions[2], Region::new(0.0, 100.0, 100.0, 100.0));

        let regions = layout_equal(&[1.0; 5], 300.0, 200.0);
        assert_eq!(regions.len(), 5);
        assert_eq!(regions[4].y, 100.0);
    }

    #[test]
    fn test_region_contains() {
        let regions = layout_equal(&[1.0; 2], 200.0, 100.0);
        assert!(regions[0].contains(50.0, 50.0));
        assert!(regions[1].contains(150.0, 50.0));
        assert!(!regions.iter().any(|r| r.contains(250.0, 50.0)));
        assert!(layout_equal(&[], 10.0, 10.0).is_empty());
    }
}
