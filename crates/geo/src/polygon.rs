//! Rings and polygons in planar (lng = x, lat = y) degree space.

use crate::{GeoError, LatLng};

const EPSILON: f64 = 1e-12;

/// Result of classifying a point against a ring.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Containment {
    Inside,
    /// On an edge or vertex.
    Boundary,
    Outside,
}

/// Axis-aligned bounding box, inclusive on all sides.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl BoundingBox {
    fn of(points: &[LatLng]) -> Self {
        let mut bbox = Self {
            min_lat: f64::INFINITY,
            max_lat: f64::NEG_INFINITY,
            min_lng: f64::INFINITY,
            max_lng: f64::NEG_INFINITY,
        };
        for p in points {
            bbox.extend(p);
        }
        bbox
    }

    fn extend(&mut self, p: &LatLng) {
        self.min_lat = self.min_lat.min(p.lat);
        self.max_lat = self.max_lat.max(p.lat);
        self.min_lng = self.min_lng.min(p.lng);
        self.max_lng = self.max_lng.max(p.lng);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lat: self.min_lat.min(other.min_lat),
            max_lat: self.max_lat.max(other.max_lat),
            min_lng: self.min_lng.min(other.min_lng),
            max_lng: self.max_lng.max(other.max_lng),
        }
    }

    pub fn contains(&self, p: LatLng) -> bool {
        p.lat >= self.min_lat && p.lat <= self.max_lat && p.lng >= self.min_lng && p.lng <= self.max_lng
    }
}

/// A closed linear ring. The closing vertex is implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    vertices: Vec<LatLng>,
    bbox: BoundingBox,
}

impl Ring {
    /// Build a ring from its vertices.
    ///
    /// A trailing vertex equal to the first is dropped. Every vertex must be a
    /// valid coordinate and at least 3 distinct vertices must remain.
    pub fn new(mut vertices: Vec<LatLng>) -> Result<Self, GeoError> {
        if let Some(bad) = vertices.iter().find(|v| !v.is_valid()) {
            return Err(GeoError::InvalidCoordinate {
                lat: bad.lat,
                lng: bad.lng,
            });
        }

        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        let mut distinct: Vec<LatLng> = Vec::with_capacity(vertices.len());
        for v in &vertices {
            if !distinct.contains(v) {
                distinct.push(*v);
            }
        }
        if distinct.len() < 3 {
            return Err(GeoError::DegenerateRing(format!(
                "{} distinct vertices, need at least 3",
                distinct.len()
            )));
        }

        let bbox = BoundingBox::of(&vertices);
        Ok(Self { vertices, bbox })
    }

    /// Convenience constructor from `(lat, lng)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, GeoError> {
        let vertices = pairs
            .iter()
            .map(|&(lat, lng)| LatLng::new(lat, lng))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(vertices)
    }

    pub fn vertices(&self) -> &[LatLng] {
        &self.vertices
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Even-odd ray casting with explicit edge/vertex detection.
    pub fn classify(&self, p: LatLng) -> Containment {
        if !self.bbox.contains(p) {
            return Containment::Outside;
        }

        let v = &self.vertices;
        let (px, py) = (p.lng, p.lat);
        let mut inside = false;
        let mut j = v.len() - 1;

        for i in 0..v.len() {
            let (xi, yi) = (v[i].lng, v[i].lat);
            let (xj, yj) = (v[j].lng, v[j].lat);

            if on_segment(px, py, xi, yi, xj, yj) {
                return Containment::Boundary;
            }

            if (yi > py) != (yj > py) {
                let x_cross = (xj - xi) * (py - yi) / (yj - yi) + xi;
                if px < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }

        if inside {
            Containment::Inside
        } else {
            Containment::Outside
        }
    }

    /// Shoelace area in square degrees (positive for counter-clockwise rings).
    pub fn signed_area(&self) -> f64 {
        let v = &self.vertices;
        let mut sum = 0.0;
        for i in 0..v.len() {
            let a = v[i];
            let b = v[(i + 1) % v.len()];
            sum += a.lng * b.lat - b.lng * a.lat;
        }
        sum / 2.0
    }

    /// Area-weighted centroid; the vertex mean for (near-)zero-area rings.
    pub fn centroid(&self) -> LatLng {
        let v = &self.vertices;
        let area = self.signed_area();

        if area.abs() < EPSILON {
            let n = v.len() as f64;
            let lat = v.iter().map(|p| p.lat).sum::<f64>() / n;
            let lng = v.iter().map(|p| p.lng).sum::<f64>() / n;
            return LatLng { lat, lng };
        }

        let (mut cx, mut cy) = (0.0, 0.0);
        for i in 0..v.len() {
            let a = v[i];
            let b = v[(i + 1) % v.len()];
            let cross = a.lng * b.lat - b.lng * a.lat;
            cx += (a.lng + b.lng) * cross;
            cy += (a.lat + b.lat) * cross;
        }
        LatLng {
            lat: cy / (6.0 * area),
            lng: cx / (6.0 * area),
        }
    }
}

fn on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    if cross.abs() > EPSILON {
        return false;
    }
    px >= ax.min(bx) - EPSILON
        && px <= ax.max(bx) + EPSILON
        && py >= ay.min(by) - EPSILON
        && py <= ay.max(by) + EPSILON
}

/// One polygon: an outer ring with optional holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    outer: Ring,
    holes: Vec<Ring>,
}

impl Polygon {
    pub fn new(outer: Ring, holes: Vec<Ring>) -> Self {
        Self { outer, holes }
    }

    pub fn simple(outer: Ring) -> Self {
        Self::new(outer, Vec::new())
    }

    pub fn outer(&self) -> &Ring {
        &self.outer
    }

    pub fn holes(&self) -> &[Ring] {
        &self.holes
    }

    /// Inside (or on) the outer ring and not strictly inside any hole.
    pub fn contains(&self, p: LatLng) -> bool {
        match self.outer.classify(p) {
            Containment::Outside => false,
            Containment::Boundary => true,
            Containment::Inside => !self
                .holes
                .iter()
                .any(|h| h.classify(p) == Containment::Inside),
        }
    }

    /// Outer area minus hole areas, in square degrees.
    pub fn area(&self) -> f64 {
        let holes: f64 = self.holes.iter().map(|h| h.signed_area().abs()).sum();
        (self.outer.signed_area().abs() - holes).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: f64, max: f64) -> Ring {
        Ring::from_pairs(&[(min, min), (min, max), (max, max), (max, min)]).unwrap()
    }

    fn pt(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    #[test]
    fn closing_vertex_is_dropped() {
        let ring = Ring::from_pairs(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]).unwrap();
        assert_eq!(ring.vertices().len(), 3);
    }

    #[test]
    fn degenerate_ring_is_rejected() {
        let err = Ring::from_pairs(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, GeoError::DegenerateRing(_)));
    }

    #[test]
    fn classify_inside_outside_and_boundary() {
        let ring = square(0.0, 10.0);
        assert_eq!(ring.classify(pt(5.0, 5.0)), Containment::Inside);
        assert_eq!(ring.classify(pt(11.0, 5.0)), Containment::Outside);
        assert_eq!(ring.classify(pt(0.0, 5.0)), Containment::Boundary);
        assert_eq!(ring.classify(pt(10.0, 10.0)), Containment::Boundary);
    }

    #[test]
    fn concave_ring_excludes_notch() {
        // U shape: notch between lng 3..7 above lat 3.
        let ring = Ring::from_pairs(&[
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 3.0),
            (3.0, 3.0),
            (3.0, 7.0),
            (10.0, 7.0),
            (10.0, 10.0),
            (0.0, 10.0),
        ])
        .unwrap();
        assert_eq!(ring.classify(pt(8.0, 5.0)), Containment::Outside);
        assert_eq!(ring.classify(pt(8.0, 1.0)), Containment::Inside);
        assert_eq!(ring.classify(pt(1.0, 5.0)), Containment::Inside);
    }

    #[test]
    fn hole_excludes_interior_but_not_its_edge() {
        let poly = Polygon::new(square(0.0, 10.0), vec![square(4.0, 6.0)]);
        assert!(!poly.contains(pt(5.0, 5.0)));
        assert!(poly.contains(pt(4.0, 5.0)));
        assert!(poly.contains(pt(2.0, 2.0)));
        assert!((poly.area() - 96.0).abs() < 1e-9);
    }

    #[test]
    fn centroid_of_square_is_its_center() {
        let c = square(0.0, 10.0).centroid();
        assert!((c.lat - 5.0).abs() < 1e-9);
        assert!((c.lng - 5.0).abs() < 1e-9);
    }
}
