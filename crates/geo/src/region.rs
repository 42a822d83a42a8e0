use crate::{BoundingBox, GeoError, LatLng, Polygon, RegionKey, Ring};

/// A named administrative boundary. Immutable once built.
///
/// Most regions have one part; archipelagos and exclaves have several.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    key: RegionKey,
    display_name: String,
    parts: Vec<Polygon>,
    centroid: LatLng,
    bbox: BoundingBox,
}

impl Region {
    pub fn new(
        key: RegionKey,
        display_name: impl Into<String>,
        parts: Vec<Polygon>,
    ) -> Result<Self, GeoError> {
        let display_name = display_name.into();

        let Some(first) = parts.first() else {
            return Err(GeoError::EmptyRegion(display_name));
        };

        let bbox = parts
            .iter()
            .skip(1)
            .fold(*first.outer().bbox(), |acc, p| acc.union(p.outer().bbox()));

        // Centroid of the dominant part, so small islands do not drag it offshore.
        let largest = parts
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
            .unwrap_or(first);
        let centroid = largest.outer().centroid();

        Ok(Self {
            key,
            display_name,
            parts,
            centroid,
            bbox,
        })
    }

    pub fn key(&self) -> &RegionKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn parts(&self) -> &[Polygon] {
        &self.parts
    }

    /// Outer ring of the first part.
    pub fn outer_ring(&self) -> &Ring {
        self.parts[0].outer()
    }

    pub fn is_multi_part(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn centroid(&self) -> LatLng {
        self.centroid
    }

    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn contains(&self, p: LatLng) -> bool {
        self.bbox.contains(p) && self.parts.iter().any(|part| part.contains(p))
    }
}
