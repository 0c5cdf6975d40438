//! Device color gamut and out-of-gamut correction

use super::Xy;

/// Tolerance of the containment test, so points projected onto an edge count as inside
const EDGE_EPSILON: f64 = 1e-9;

/// Points further than this from the centroid are pulled in before projection
const MAX_CENTROID_DISTANCE: f64 = 0.5;

/// Triangle of reproducible chromaticities of a device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gamut {
    pub red: Xy,
    pub green: Xy,
    pub blue: Xy,
}

/// Gamut of the bridge's color lights
pub const HUE_GAMUT: Gamut = Gamut {
    red: Xy::new(0.675, 0.322),
    green: Xy::new(0.409, 0.518),
    blue: Xy::new(0.167, 0.04),
};

fn cross(a: Xy, b: Xy) -> f64 {
    a.x * b.y - a.y * b.x
}

fn sub(a: Xy, b: Xy) -> Xy {
    Xy::new(a.x - b.x, a.y - b.y)
}

/// Closest point to `point` on the segment `[start, end]`
fn closest_point_on_segment(point: Xy, start: Xy, end: Xy) -> Xy {
    let d = sub(end, start);
    let q = sub(point, start);
    let len2 = d.x * d.x + d.y * d.y;

    let t = if len2 > 0.0 {
        ((q.x * d.x + q.y * d.y) / len2).max(0.0).min(1.0)
    } else {
        0.0
    };

    Xy::new(start.x + t * d.x, start.y + t * d.y)
}

impl Gamut {
    pub fn centroid(&self) -> Xy {
        Xy::new(
            (self.red.x + self.green.x + self.blue.x) / 3.0,
            (self.red.y + self.green.y + self.blue.y) / 3.0,
        )
    }

    /// Barycentric sign test, using the two edges leaving the red vertex
    pub fn contains(&self, point: Xy) -> bool {
        let v1 = sub(self.green, self.red);
        let v2 = sub(self.blue, self.red);
        let q = sub(point, self.red);

        let den = cross(v1, v2);
        let s = cross(q, v2) / den;
        let t = cross(v1, q) / den;

        s >= -EDGE_EPSILON && t >= -EDGE_EPSILON && s + t <= 1.0 + EDGE_EPSILON
    }

    /// Clamp `point` to this gamut
    ///
    /// Points inside are returned unchanged. Points outside are projected onto the
    /// closest edge. Points further than 0.5 from the centroid are first pulled
    /// towards the centroid down to that distance. Non-finite input yields the
    /// centroid.
    pub fn closest_point(&self, point: Xy) -> Xy {
        if !point.is_finite() {
            return self.centroid();
        }

        if self.contains(point) {
            return point;
        }

        let center = self.centroid();
        let distance = point.distance(center);

        let point = if distance > MAX_CENTROID_DISTANCE {
            let t = MAX_CENTROID_DISTANCE / distance;
            Xy::new(
                point.x * t + center.x * (1.0 - t),
                point.y * t + center.y * (1.0 - t),
            )
        } else {
            point
        };

        if self.contains(point) {
            return point;
        }

        let edges = [
            (self.red, self.green),
            (self.green, self.blue),
            (self.blue, self.red),
        ];

        let mut closest = point;
        let mut min_distance = f64::INFINITY;

        for &(start, end) in &edges {
            let candidate = closest_point_on_segment(point, start, end);
            let distance = point.distance(candidate);

            if distance < min_distance {
                min_distance = distance;
                closest = candidate;
            }
        }

        closest
    }
}

/// Clamp `xy` to `gamut`, see [Gamut::closest_point]
pub fn closest_point_on_gamut(xy: Xy, gamut: &Gamut) -> Xy {
    gamut.closest_point(xy)
}
