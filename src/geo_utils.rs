//! Geographic utilities: distance approximation, Mercator flattening, and
//! perpendicular projection onto road segments.
//!
//! Coordinates are fixed-precision integers (10⁻⁵ degrees). Distances come
//! in two flavours with different uses:
//!
//! - [`approximate_distance`] — a cheap equirectangular approximation in
//!   *degrees*, used for bounding-rectangle pruning and for the final
//!   along-segment ratio, where only relative magnitudes matter.
//! - [`project_onto_segment`] — *squared* Euclidean distance in raw
//!   integer-coordinate units, used to rank candidate edges. No square root
//!   is taken; ranking squared values is equivalent and cheaper.

use crate::Coordinate;

/// Fixed-point scaling: one unit is 10⁻⁵ degrees.
pub const COORDINATE_PRECISION: f64 = 100_000.0;

const DEG_TO_RAD: f64 = std::f64::consts::PI / 180.0;

/// Equirectangular distance between two coordinates, in degrees.
///
/// Symmetric, deterministic, and monotone in great-circle distance at city
/// scale, which is all the index needs: the value only ever ranks
/// rectangles against each other. Not metres, and not valid across
/// antimeridian wraps.
pub fn approximate_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.lat as f64 / COORDINATE_PRECISION;
    let lon1 = a.lon as f64 / COORDINATE_PRECISION;
    let lat2 = b.lat as f64 / COORDINATE_PRECISION;
    let lon2 = b.lon as f64 / COORDINATE_PRECISION;

    // Flatten longitude by the cosine of the mean latitude so east-west
    // degrees weigh the same as north-south ones.
    let mean_lat = (lat1 + lat2) * 0.5 * DEG_TO_RAD;
    let dx = (lon2 - lon1) * mean_lat.cos();
    let dy = lat2 - lat1;

    (dx * dx + dy * dy).sqrt()
}

/// Web-Mercator y for a latitude given in degrees, in the same degree
/// scale. Used only to flatten centroids before Hilbert encoding.
pub fn lat2y(lat: f64) -> f64 {
    180.0 / std::f64::consts::PI * ((std::f64::consts::FRAC_PI_4 + lat * DEG_TO_RAD / 2.0).tan()).ln()
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentProjection {
    /// Squared Euclidean distance from the query point to `nearest`, in raw
    /// integer-coordinate units.
    pub distance_sq: f64,
    /// Position of the foot along the segment: 0 at the start, 1 at the
    /// end, clamped.
    pub ratio: f64,
    /// The nearest point on the segment, truncated to fixed precision.
    pub nearest: Coordinate,
}

/// Project `point` onto the segment from `source` to `target`.
///
/// Degenerate segments (both endpoints equal) report ratio 1 when the query
/// coincides with the endpoint and 0 otherwise, with the point-to-point
/// distance.
pub fn project_onto_segment(
    point: &Coordinate,
    source: &Coordinate,
    target: &Coordinate,
) -> SegmentProjection {
    let px = point.lat as f64;
    let py = point.lon as f64;
    let sx = source.lat as f64;
    let sy = source.lon as f64;

    let dx = (target.lat - source.lat) as f64;
    let dy = (target.lon - source.lon) as f64;

    let length_sq = dx * dx + dy * dy;
    let mut ratio = ((px - sx) * dx + (py - sy) * dy) / length_sq;
    if ratio.is_nan() {
        ratio = if point == target { 1.0 } else { 0.0 };
    }

    if ratio <= 0.0 {
        let ax = sx - px;
        let ay = sy - py;
        return SegmentProjection {
            distance_sq: ax * ax + ay * ay,
            ratio: 0.0,
            nearest: *source,
        };
    }
    if ratio >= 1.0 {
        let bx = target.lat as f64 - px;
        let by = target.lon as f64 - py;
        return SegmentProjection {
            distance_sq: bx * bx + by * by,
            ratio: 1.0,
            nearest: *target,
        };
    }

    // Foot strictly inside the segment.
    let fx = sx + ratio * dx;
    let fy = sy + ratio * dy;
    SegmentProjection {
        distance_sq: (fx - px) * (fx - px) + (fy - py) * (fy - py),
        ratio,
        nearest: Coordinate::new(fx as i32, fy as i32),
    }
}
