//! Axis-aligned integer bounding rectangles with the Roussopoulos pruning
//! bounds used by the nearest-edge search.

use serde::{Deserialize, Serialize};

use crate::geo_utils::approximate_distance;
use crate::{Coordinate, RoadEdge};

/// Minimum bounding rectangle over fixed-precision coordinates.
///
/// A freshly created rectangle is *inverted* (min above max) and absorbs the
/// first datum through [`Mbr::expand`] / [`Mbr::extend_with_edge`]; after
/// that `min_* <= max_*` holds on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbr {
    pub min_lon: i32,
    pub max_lon: i32,
    pub min_lat: i32,
    pub max_lat: i32,
}

impl Default for Mbr {
    fn default() -> Self {
        Self::new()
    }
}

impl Mbr {
    /// Create an empty (inverted) rectangle.
    pub fn new() -> Self {
        Self {
            min_lon: i32::MAX,
            max_lon: i32::MIN,
            min_lat: i32::MAX,
            max_lat: i32::MIN,
        }
    }

    /// Grow to cover both endpoints of an edge.
    pub fn extend_with_edge(&mut self, edge: &RoadEdge) {
        self.min_lon = self.min_lon.min(edge.lon1.min(edge.lon2));
        self.max_lon = self.max_lon.max(edge.lon1.max(edge.lon2));
        self.min_lat = self.min_lat.min(edge.lat1.min(edge.lat2));
        self.max_lat = self.max_lat.max(edge.lat1.max(edge.lat2));
    }

    /// Component-wise union with another rectangle.
    pub fn expand(&mut self, other: &Mbr) {
        self.min_lon = self.min_lon.min(other.min_lon);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    /// Strict interior containment: points on the border are NOT contained.
    pub fn contains(&self, location: &Coordinate) -> bool {
        let lats_contained = location.lat > self.min_lat && location.lat < self.max_lat;
        let lons_contained = location.lon > self.min_lon && location.lon < self.max_lon;
        lats_contained && lons_contained
    }

    /// True rectangle intersection: overlap on both axes, borders included.
    pub fn intersects(&self, other: &Mbr) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }

    /// Integer midpoint of the rectangle.
    pub fn centroid(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2,
            (self.min_lon + self.max_lon) / 2,
        )
    }

    fn corners(&self) -> [Coordinate; 4] {
        [
            Coordinate::new(self.max_lat, self.min_lon), // upper left
            Coordinate::new(self.max_lat, self.max_lon), // upper right
            Coordinate::new(self.min_lat, self.max_lon), // lower right
            Coordinate::new(self.min_lat, self.min_lon), // lower left
        ]
    }

    /// Lower bound on the distance from `location` to anything inside the
    /// rectangle: zero when contained, otherwise the nearest corner.
    ///
    /// Corner sampling is looser than projecting onto the rectangle's
    /// sides, which is fine for a bound that only ever prunes.
    pub fn min_dist(&self, location: &Coordinate) -> f64 {
        if self.contains(location) {
            return 0.0;
        }

        self.corners()
            .iter()
            .map(|corner| approximate_distance(location, corner))
            .fold(f64::MAX, f64::min)
    }

    /// Roussopoulos MINMAXDIST: an upper bound on the distance to the
    /// nearest object stored inside the rectangle. For each side, take the
    /// farther of its two corners; the nearest object can be no farther
    /// than the closest such side.
    pub fn min_max_dist(&self, location: &Coordinate) -> f64 {
        let [upper_left, upper_right, lower_right, lower_left] = self.corners();

        let sides = [
            (upper_left, upper_right),
            (upper_right, lower_right),
            (lower_right, lower_left),
            (lower_left, upper_left),
        ];

        sides
            .iter()
            .map(|(a, b)| {
                approximate_distance(location, a).max(approximate_distance(location, b))
            })
            .fold(f64::MAX, f64::min)
    }
}
