//! Escape-time evaluation of the quadratic map `z <- z^2 + c`.
//!
//! Pure functions only: every column can be evaluated on its own thread
//! without coordination.
use crate::pixel::RGB_MASK;

/// Divisor placing the image origin inside the frame (`width / 1.75`, `height / 1.75`).
const ORIGIN_DIVISOR: f64 = 1.75;

/// Squared escape radius.
const ESCAPE_RADIUS_SQ: f64 = 4.0;

/// Mapping from pixel space into the complex plane plus the iteration budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewWindow {
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub max_iterations: u32,
}

impl ViewWindow {
    /// Complex coordinate `c` for pixel `(px, py)`.
    #[inline]
    pub fn point(&self, px: u32, py: u32) -> (f64, f64) {
        let cx = (f64::from(px) - f64::from(self.width) / ORIGIN_DIVISOR) / self.zoom + self.offset_x;
        let cy = (f64::from(py) - f64::from(self.height) / ORIGIN_DIVISOR) / self.zoom + self.offset_y;
        (cx, cy)
    }

    /// Remaining iteration budget at pixel `(px, py)`.
    #[inline]
    pub fn remaining_at(&self, px: u32, py: u32) -> u32 {
        escape_time(self.point(px, py), self.max_iterations)
    }
}

/// Iterate from `z = 0` while `|z|^2 < 4` and budget remains.
///
/// Returns the *remaining* budget: 0 for points that never escape, larger
/// values for points that escape sooner.
#[inline]
pub fn escape_time(c: (f64, f64), max_iterations: u32) -> u32 {
    let (cx, cy) = c;
    let mut zx = 0.0_f64;
    let mut zy = 0.0_f64;
    let mut remaining = max_iterations;
    while zx * zx + zy * zy < ESCAPE_RADIUS_SQ && remaining > 0 {
        let tmp = zx * zx - zy * zy + cx;
        zy = 2.0 * zx * zy + cy;
        zx = tmp;
        remaining -= 1;
    }
    remaining
}

/// Packed color for a remaining-iteration count: `i | i<<10 | i<<14`, black for 0.
///
/// Bits above the 24-bit RGB layout are dropped, matching what a 24-bit
/// raster stores.
#[inline]
pub fn escape_color(remaining: u32) -> u32 {
    if remaining == 0 {
        return 0;
    }
    (remaining | (remaining << 10) | (remaining << 14)) & RGB_MASK
}

/// Colors for every row of column `x`, top to bottom.
pub fn render_column(view: &ViewWindow, x: u32) -> Vec<u32> {
    (0..view.height)
        .map(|y| escape_color(view.remaining_at(x, y)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ViewWindow {
        ViewWindow {
            width: 64,
            height: 48,
            zoom: 20.0,
            offset_x: -0.5,
            offset_y: 0.0,
            max_iterations: 200,
        }
    }

    #[test]
    fn test_interior_point_exhausts_budget() {
        assert_eq!(escape_time((0.0, 0.0), 500), 0);
        assert_eq!(escape_time((-1.0, 0.0), 500), 0);
    }

    #[test]
    fn test_far_point_escapes_immediately() {
        // |z|^2 after one step is 9 >= 4, so one step is spent.
        assert_eq!(escape_time((3.0, 0.0), 100), 99);
    }

    #[test]
    fn test_zero_budget() {
        assert_eq!(escape_time((3.0, 0.0), 0), 0);
    }

    #[test]
    fn test_color_packing() {
        assert_eq!(escape_color(0), 0);
        assert_eq!(escape_color(1), 1 | (1 << 10) | (1 << 14));
        assert_eq!(escape_color(99), (99 | (99 << 10) | (99 << 14)) & 0xFF_FFFF);
        // 1220 << 14 spills past bit 23; the stored value keeps 24 bits.
        assert_eq!(escape_color(1220) >> 24, 0);
        assert_ne!(escape_color(1220), 0);
    }

    #[test]
    fn test_point_mapping() {
        let v = view();
        let (cx, cy) = v.point(0, 0);
        assert!((cx - (-(64.0 / 1.75) / 20.0 - 0.5)).abs() < 1e-12);
        assert!((cy - (-(48.0 / 1.75) / 20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_render_column_deterministic() {
        let v = view();
        let a = render_column(&v, 10);
        let b = render_column(&v, 10);
        assert_eq!(a.len(), 48);
        assert_eq!(a, b);
    }
}
