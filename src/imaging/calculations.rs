//! Pure geometry for stamp layout and rasterization.
//!
//! All functions here are pure and testable without any I/O or images.

/// Length of the image diagonal, the reference for every preset ratio.
///
/// Identical in raw and display orientation.
///
/// # Examples
/// ```
/// # use oem_stamp::imaging::diagonal;
/// assert_eq!(diagonal(4000, 3000), 5000.0);
/// ```
pub fn diagonal(width: u32, height: u32) -> f64 {
    (width as f64).hypot(height as f64)
}

/// Scale `source` dimensions to a target height, preserving aspect ratio.
///
/// # Arguments
/// * `source` - Original dimensions (width, height)
/// * `height` - Target height in pixels
///
/// # Returns
/// * `(width, height)` - both at least 1
pub fn scale_to_height(source: (u32, u32), height: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    let height = height.max(1);
    if src_h == 0 {
        return (1, height);
    }
    let width = (height as f64 * src_w as f64 / src_h as f64).round() as u32;
    (width.max(1), height)
}

/// Anti-aliased coverage of pixel `(px, py)` by a `width`×`height` rounded
/// rectangle with corner `radius`, sampled at the pixel center.
///
/// Returns 1.0 inside, 0.0 outside, and a linear ramp one pixel wide along
/// the rounded corners. Straight edges are pixel-aligned and fully covered.
pub fn rounded_rect_coverage(px: u32, py: u32, width: u32, height: u32, radius: f32) -> f32 {
    if px >= width || py >= height {
        return 0.0;
    }
    let radius = radius.clamp(0.0, width.min(height) as f32 / 2.0);
    if radius <= 0.0 {
        return 1.0;
    }
    let x = px as f32 + 0.5;
    let y = py as f32 + 0.5;
    let cx = x.clamp(radius, width as f32 - radius);
    let cy = y.clamp(radius, height as f32 - radius);
    let dist = (x - cx).hypot(y - cy);
    (radius - dist + 0.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // diagonal
    // =========================================================================

    #[test]
    fn diagonal_of_3_4_5() {
        assert_eq!(diagonal(4000, 3000), 5000.0);
        assert_eq!(diagonal(3000, 4000), 5000.0);
    }

    #[test]
    fn diagonal_of_line() {
        assert_eq!(diagonal(100, 0), 100.0);
    }

    // =========================================================================
    // scale_to_height
    // =========================================================================

    #[test]
    fn scale_wide_icon() {
        // 200x100 at height 30 → 60x30
        assert_eq!(scale_to_height((200, 100), 30), (60, 30));
    }

    #[test]
    fn scale_tall_icon_keeps_one_pixel() {
        assert_eq!(scale_to_height((1, 500), 10), (1, 10));
    }

    #[test]
    fn scale_zero_height_target() {
        assert_eq!(scale_to_height((64, 64), 0), (1, 1));
    }

    // =========================================================================
    // rounded_rect_coverage
    // =========================================================================

    #[test]
    fn square_corners_fully_covered() {
        assert_eq!(rounded_rect_coverage(0, 0, 10, 10, 0.0), 1.0);
        assert_eq!(rounded_rect_coverage(9, 9, 10, 10, 0.0), 1.0);
    }

    #[test]
    fn outside_is_uncovered() {
        assert_eq!(rounded_rect_coverage(10, 0, 10, 10, 2.0), 0.0);
    }

    #[test]
    fn corner_pixel_is_cut() {
        let corner = rounded_rect_coverage(0, 0, 40, 20, 8.0);
        assert!(corner < 0.1, "corner coverage {corner}");
    }

    #[test]
    fn middle_and_edges_are_solid() {
        assert_eq!(rounded_rect_coverage(20, 10, 40, 20, 8.0), 1.0);
        assert_eq!(rounded_rect_coverage(20, 0, 40, 20, 8.0), 1.0);
        assert_eq!(rounded_rect_coverage(0, 10, 40, 20, 8.0), 1.0);
    }

    #[test]
    fn radius_clamped_to_half_short_side() {
        // A pill shape: the radius can't exceed 5 on a 10px tall box.
        assert_eq!(
            rounded_rect_coverage(20, 5, 40, 10, 100.0),
            rounded_rect_coverage(20, 5, 40, 10, 5.0)
        );
    }

    #[test]
    fn coverage_is_symmetric() {
        for (x, y) in [(0, 0), (1, 2), (3, 1)] {
            let a = rounded_rect_coverage(x, y, 30, 16, 6.0);
            let b = rounded_rect_coverage(29 - x, 15 - y, 30, 16, 6.0);
            assert!((a - b).abs() < 1e-5);
        }
    }
}
