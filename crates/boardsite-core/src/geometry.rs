//! Curve smoothing and pixel hitboxes for freehand strokes.
//!
//! Points are handled as flat `[x0, y0, x1, y1, ...]` slices, the same layout
//! strokes use on the wire. A trailing odd coordinate is ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Set of integer pixels covered by a stroke or an eraser gesture.
pub type Hitbox = HashSet<(i64, i64)>;

/// Largest absolute coordinate a committed stroke may use.
pub const MAX_COORDINATE: f64 = 100_000.0;

const MAX_PIXEL: i64 = MAX_COORDINATE as i64;

/// Whether `v` is a usable stroke coordinate.
pub fn is_valid_coordinate(v: f64) -> bool {
    v.is_finite() && v.abs() <= MAX_COORDINATE
}

// NaN casts to 0.
fn to_pixel(v: f64) -> i64 {
    (v.round() as i64).clamp(-MAX_PIXEL, MAX_PIXEL)
}

/// Tuning parameters for [`compute_hitboxes`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HitboxParams {
    /// Only every `skip`-th sample starts a new segment.
    pub skip: usize,
    /// Segments with a squared length below this are merged into the next one.
    pub min_dist_sq: f64,
    /// Dilate the result by one ring of neighbouring pixels.
    pub padding: bool,
}

impl HitboxParams {
    /// Generous hit area stored with committed strokes.
    pub const STROKE: Self = Self {
        skip: 8,
        min_dist_sq: 64.0,
        padding: true,
    };

    /// Tighter hit area used for the eraser gesture itself.
    pub const ERASER: Self = Self {
        skip: 16,
        min_dist_sq: 25.0,
        padding: false,
    };
}

/// Parameters for [`smooth_polyline`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingParams {
    pub tension: f64,
    pub segments: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            tension: 0.5,
            segments: 16,
        }
    }
}

/// Fit a cardinal spline through `points`.
///
/// Every span between two consecutive input points yields `segments + 1`
/// samples (both span ends included), so an open curve through `n` points
/// returns `(n - 1) * (segments + 1)` points and a closed one `n * (segments + 1)`.
/// Fewer than two points are returned unchanged.
pub fn smooth_polyline(points: &[f64], tension: f64, closed: bool, segments: usize) -> Vec<f64> {
    let n = points.len() / 2;
    if n < 2 || segments == 0 {
        return points[..n * 2].to_vec();
    }

    // One control point before and after the sampled range so that every
    // span sees a full four-point basis.
    let mut padded = Vec::with_capacity((n + 3) * 2);
    if closed {
        padded.extend_from_slice(&points[(n - 1) * 2..n * 2]);
        padded.extend_from_slice(&points[..n * 2]);
        padded.extend_from_slice(&points[..4]);
    } else {
        padded.extend_from_slice(&points[..2]);
        padded.extend_from_slice(&points[..n * 2]);
        padded.extend_from_slice(&points[(n - 1) * 2..n * 2]);
    }

    let spans = if closed { n } else { n - 1 };
    let mut out = Vec::with_capacity(spans * (segments + 1) * 2);

    for span in 0..spans {
        let i = (span + 1) * 2;
        let t1x = (padded[i + 2] - padded[i - 2]) * tension;
        let t2x = (padded[i + 4] - padded[i]) * tension;
        let t1y = (padded[i + 3] - padded[i - 1]) * tension;
        let t2y = (padded[i + 5] - padded[i + 1]) * tension;

        for step in 0..=segments {
            let st = step as f64 / segments as f64;
            let st2 = st * st;
            let st3 = st2 * st;

            let c1 = 2.0 * st3 - 3.0 * st2 + 1.0;
            let c2 = -2.0 * st3 + 3.0 * st2;
            let c3 = st3 - 2.0 * st2 + st;
            let c4 = st3 - st2;

            out.push(c1 * padded[i] + c2 * padded[i + 2] + c3 * t1x + c4 * t2x);
            out.push(c1 * padded[i + 1] + c2 * padded[i + 3] + c3 * t1y + c4 * t2y);
        }
    }

    out
}

/// Round every coordinate to three decimal places.
pub fn round_points(points: &mut [f64]) {
    for v in points.iter_mut() {
        *v = (*v * 1e3).round() / 1e3;
    }
}

/// Every integer pixel touched by the segment from `(x1, y1)` to `(x2, y2)`.
///
/// The segment is normalized so that it runs along its major axis with both
/// coordinates increasing, scanned row by row, and mapped back. Endpoints are
/// ordered by x first, so swapping them yields the same pixels.
///
/// Coordinates are clamped to `±MAX_COORDINATE`.
pub fn rasterize_segment(x1: i64, y1: i64, x2: i64, y2: i64) -> Vec<(i64, i64)> {
    let [x1, y1, x2, y2] = [x1, y1, x2, y2].map(|v| v.clamp(-MAX_PIXEL, MAX_PIXEL));
    let (x1, y1, x2, y2) = if x2 < x1 { (x2, y2, x1, y1) } else { (x1, y1, x2, y2) };
    let dx = x2 - x1;
    let dy = y2 - y1;

    if dx == 0 {
        let (lo, hi) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        return (lo..=hi).map(|y| (x1, y)).collect();
    }
    if dy == 0 {
        return (x1..=x2).map(|x| (x, y1)).collect();
    }

    let steep = dy.abs() > dx;
    let flip = dy < 0;

    // (x, y) -> (u, v) with u the major axis, both ascending.
    let to_uv = |x: i64, y: i64| {
        let y = if flip { -y } else { y };
        if steep { (y, x) } else { (x, y) }
    };
    let from_uv = |u: i64, v: i64| {
        let (x, y) = if steep { (v, u) } else { (u, v) };
        (x, if flip { -y } else { y })
    };

    let (u1, v1) = to_uv(x1, y1);
    let (u2, v2) = to_uv(x2, y2);
    let du = u2 - u1;
    let dv = v2 - v1;
    let run = du as f64 / dv as f64;

    let mut pixels = Vec::with_capacity((du + 1) as usize);
    let mut row_start = u1;
    for row in 0..dv {
        let row_end = (u1 as f64 + (0.5 + row as f64) * run - 1.0).ceil() as i64;
        for u in row_start..=row_end {
            pixels.push(from_uv(u, v1 + row));
        }
        row_start = row_end + 1;
    }
    for u in row_start..=u2 {
        pixels.push(from_uv(u, v2));
    }

    pixels
}

/// Pixel hitbox of a flat point list.
///
/// Walks every `skip`-th sample, rasterizing the segment from the last
/// retained sample unless it is shorter than `min_dist_sq`. The segment to the
/// final sample is always included.
pub fn compute_hitboxes(points: &[f64], params: &HitboxParams) -> Hitbox {
    let mut hitbox = Hitbox::new();
    let n = points.len() / 2;
    if n == 0 {
        return hitbox;
    }

    let pixel = |i: usize| (to_pixel(points[2 * i]), to_pixel(points[2 * i + 1]));
    let step = params.skip.max(1);

    let mut start = pixel(0);
    let mut i = step;
    while i < n {
        let end = pixel(i);
        if dist_sq(start, end) >= params.min_dist_sq {
            hitbox.extend(rasterize_segment(start.0, start.1, end.0, end.1));
            start = end;
        }
        i += step;
    }

    let last = pixel(n - 1);
    hitbox.extend(rasterize_segment(start.0, start.1, last.0, last.1));

    if params.padding {
        dilate(&mut hitbox);
    }
    hitbox
}

fn dist_sq(a: (i64, i64), b: (i64, i64)) -> f64 {
    let dx = a.0.abs_diff(b.0) as f64;
    let dy = a.1.abs_diff(b.1) as f64;
    dx * dx + dy * dy
}

/// Grow the hitbox by its 8-neighbourhood.
fn dilate(hitbox: &mut Hitbox) {
    let core: Vec<(i64, i64)> = hitbox.iter().copied().collect();
    for (x, y) in core {
        for ox in -1..=1 {
            for oy in -1..=1 {
                hitbox.insert((x + ox, y + oy));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_set(pixels: Vec<(i64, i64)>) -> Hitbox {
        pixels.into_iter().collect()
    }

    #[test]
    fn test_smooth_single_point_unchanged() {
        assert_eq!(smooth_polyline(&[3.0, 4.0], 0.5, false, 16), vec![3.0, 4.0]);
        assert!(smooth_polyline(&[], 0.5, false, 16).is_empty());
    }

    #[test]
    fn test_smooth_output_length() {
        let pts = [0.0, 0.0, 10.0, 5.0, 20.0, 0.0, 30.0, 5.0];
        assert_eq!(smooth_polyline(&pts, 0.5, false, 16).len(), 3 * 17 * 2);
        assert_eq!(smooth_polyline(&pts, 0.5, true, 16).len(), 4 * 17 * 2);
        assert_eq!(smooth_polyline(&pts, 0.5, false, 4).len(), 3 * 5 * 2);
    }

    #[test]
    fn test_smooth_passes_through_control_points() {
        let pts = [0.0, 0.0, 10.0, 10.0, 20.0, 0.0];
        let out = smooth_polyline(&pts, 0.5, false, 8);
        // Start of first span, end of first span, end of last span.
        assert!((out[0]).abs() < 1e-9 && (out[1]).abs() < 1e-9);
        assert!((out[16] - 10.0).abs() < 1e-9 && (out[17] - 10.0).abs() < 1e-9);
        let n = out.len();
        assert!((out[n - 2] - 20.0).abs() < 1e-9 && (out[n - 1]).abs() < 1e-9);
    }

    #[test]
    fn test_smooth_ignores_trailing_coordinate() {
        let out = smooth_polyline(&[0.0, 0.0, 4.0, 4.0, 9.0], 0.5, false, 2);
        assert_eq!(out.len(), 3 * 2);
    }

    #[test]
    fn test_round_points() {
        let mut pts = [1.23456, -0.0004, 7.9999];
        round_points(&mut pts);
        assert_eq!(pts, [1.235, -0.0, 8.0]);
    }

    #[test]
    fn test_rasterize_axis_aligned() {
        assert_eq!(rasterize_segment(0, 0, 3, 0), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_eq!(rasterize_segment(2, 3, 2, 1), vec![(2, 1), (2, 2), (2, 3)]);
        assert_eq!(rasterize_segment(5, 5, 5, 5), vec![(5, 5)]);
    }

    #[test]
    fn test_rasterize_diagonal() {
        assert_eq!(rasterize_segment(0, 0, 3, 3), vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
        assert_eq!(
            as_set(rasterize_segment(0, 3, 3, 0)),
            as_set(vec![(0, 3), (1, 2), (2, 1), (3, 0)])
        );
    }

    #[test]
    fn test_rasterize_covers_major_axis_once() {
        // Shallow: one pixel per column.
        let shallow = rasterize_segment(0, 0, 10, 3);
        let mut xs: Vec<i64> = shallow.iter().map(|p| p.0).collect();
        xs.sort_unstable();
        assert_eq!(xs, (0..=10).collect::<Vec<_>>());

        // Steep and descending: one pixel per row.
        let steep = rasterize_segment(0, 0, 3, -10);
        let mut ys: Vec<i64> = steep.iter().map(|p| p.1).collect();
        ys.sort_unstable();
        assert_eq!(ys, (-10..=0).collect::<Vec<_>>());
        assert!(steep.contains(&(0, 0)) && steep.contains(&(3, -10)));
    }

    #[test]
    fn test_rasterize_symmetric() {
        let cases = [
            (0, 0, 7, 2),
            (0, 0, 2, 7),
            (0, 0, 7, -2),
            (0, 0, -2, 7),
            (-4, 9, 13, -6),
            (1, 1, 1, 9),
        ];
        for (x1, y1, x2, y2) in cases {
            assert_eq!(
                as_set(rasterize_segment(x1, y1, x2, y2)),
                as_set(rasterize_segment(x2, y2, x1, y1)),
                "segment ({x1},{y1})-({x2},{y2})"
            );
        }
    }

    #[test]
    fn test_rasterize_extreme_endpoints_are_clamped() {
        let pixels = rasterize_segment(i64::MIN, 0, i64::MAX, 0);
        assert_eq!(pixels.len(), 2 * MAX_PIXEL as usize + 1);
        assert!(pixels.contains(&(-MAX_PIXEL, 0)) && pixels.contains(&(MAX_PIXEL, 0)));

        let vertical = rasterize_segment(3, i64::MAX, 3, i64::MIN);
        assert_eq!(vertical.len(), 2 * MAX_PIXEL as usize + 1);
        assert!(!rasterize_segment(i64::MIN, i64::MIN, i64::MAX, i64::MAX).is_empty());
    }

    #[test]
    fn test_hitbox_of_huge_coordinates_is_bounded() {
        let params = HitboxParams::ERASER;
        let hitbox = compute_hitboxes(&[-1e300, 0.0, 1e300, 0.0], &params);
        assert!(hitbox.contains(&(0, 0)));
        assert!(hitbox.iter().all(|&(x, y)| x.abs() <= MAX_PIXEL && y == 0));

        let hitbox = compute_hitboxes(&[f64::NAN, f64::INFINITY, 0.0, 1e10], &params);
        assert!(hitbox.iter().all(|&(x, y)| x.abs() <= MAX_PIXEL && y.abs() <= MAX_PIXEL));
    }

    #[test]
    fn test_valid_coordinate() {
        assert!(is_valid_coordinate(0.0));
        assert!(is_valid_coordinate(-MAX_COORDINATE));
        assert!(!is_valid_coordinate(1e10));
        assert!(!is_valid_coordinate(f64::NAN));
        assert!(!is_valid_coordinate(f64::NEG_INFINITY));
    }

    #[test]
    fn test_rasterize_endpoints_included() {
        for (x1, y1, x2, y2) in [(0, 0, 9, 4), (3, -2, -5, 6), (0, 0, 1, 8)] {
            let pixels = rasterize_segment(x1, y1, x2, y2);
            assert!(pixels.contains(&(x1, y1)));
            assert!(pixels.contains(&(x2, y2)));
        }
    }

    #[test]
    fn test_hitbox_includes_final_segment() {
        // 3 samples with a skip of 8: only the final segment gets rasterized.
        let pts = [0.0, 0.0, 5.0, 0.0, 10.0, 0.0];
        let params = HitboxParams {
            skip: 8,
            min_dist_sq: 64.0,
            padding: false,
        };
        let hitbox = compute_hitboxes(&pts, &params);
        assert_eq!(hitbox.len(), 11);
        assert!(hitbox.contains(&(10, 0)));
    }

    #[test]
    fn test_hitbox_padding() {
        let pts = [0.0, 0.0, 0.0, 0.0];
        let plain = compute_hitboxes(&pts, &HitboxParams::ERASER);
        assert_eq!(plain, as_set(vec![(0, 0)]));

        let padded = compute_hitboxes(&pts, &HitboxParams::STROKE);
        assert_eq!(padded.len(), 9);
        assert!(padded.contains(&(-1, -1)) && padded.contains(&(1, 1)));
    }

    #[test]
    fn test_hitbox_rounds_coordinates() {
        let hitbox = compute_hitboxes(&[0.4, 0.6, 2.6, 0.6], &HitboxParams::ERASER);
        assert_eq!(hitbox, as_set(vec![(0, 1), (1, 1), (2, 1), (3, 1)]));
    }

    #[test]
    fn test_hitbox_empty_input() {
        assert!(compute_hitboxes(&[], &HitboxParams::STROKE).is_empty());
    }
}
