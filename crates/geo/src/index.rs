//! Immutable point → region lookup.

use std::collections::HashMap;

use tracing::debug;

use crate::{GeoError, LatLng, Polygon, Region, RegionKey, SynonymTable};

/// Default centroid distance accepted by the border fallback.
pub const DEFAULT_FALLBACK_RADIUS_KM: f64 = 50.0;

/// Outcome of geodetection.
///
/// `Undetermined` is a verdict category, not an error. Callers must treat it
/// as "cannot authorize".
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Located {
        region: RegionKey,
        /// `false` when resolved by the centroid-distance fallback.
        exact: bool,
    },
    Undetermined,
}

impl Location {
    pub fn region(&self) -> Option<&RegionKey> {
        match self {
            Location::Located { region, .. } => Some(region),
            Location::Undetermined => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Location::Located { exact: true, .. })
    }
}

/// Region index over a boundary dataset.
///
/// Evaluation order is insertion order, so overlapping or malformed boundary
/// data still resolves deterministically (first containing region wins).
#[derive(Debug, Clone)]
pub struct RegionIndex {
    regions: Vec<Region>,
    positions: HashMap<RegionKey, usize>,
    synonyms: SynonymTable,
    fallback_radius_km: f64,
}

impl RegionIndex {
    pub fn builder(synonyms: SynonymTable) -> RegionIndexBuilder {
        RegionIndexBuilder::new(synonyms)
    }

    /// An index with no regions. Every lookup is `Undetermined`.
    pub fn empty() -> Self {
        RegionIndexBuilder::new(SynonymTable::default()).build()
    }

    /// Locate the region containing `point`.
    ///
    /// Exact containment first; otherwise the region with the nearest centroid
    /// if it lies strictly within the fallback radius.
    pub fn locate(&self, point: LatLng) -> Location {
        if !point.is_valid() {
            return Location::Undetermined;
        }

        if let Some(region) = self.regions.iter().find(|r| r.contains(point)) {
            return Location::Located {
                region: region.key().clone(),
                exact: true,
            };
        }

        let nearest = self
            .regions
            .iter()
            .map(|r| (r, point.haversine_km(&r.centroid())))
            .fold(None::<(&Region, f64)>, |best, (r, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((r, d)),
            });

        match nearest {
            Some((region, distance_km)) if distance_km < self.fallback_radius_km => {
                debug!(
                    region = %region.key(),
                    distance_km,
                    "point resolved by centroid fallback"
                );
                Location::Located {
                    region: region.key().clone(),
                    exact: false,
                }
            }
            _ => Location::Undetermined,
        }
    }

    pub fn get(&self, key: &RegionKey) -> Option<&Region> {
        self.positions.get(key).map(|&i| &self.regions[i])
    }

    /// Look up a region by any spelling of its name.
    ///
    /// Exact key (after synonyms) first, then the first fuzzy match in
    /// insertion order.
    pub fn resolve_name(&self, name: &str) -> Option<&Region> {
        let key = self.synonyms.normalize(name);
        self.get(&key)
            .or_else(|| self.regions.iter().find(|r| r.key().fuzzy_matches(&key)))
    }

    /// Display name for a key, falling back to the key itself.
    pub fn display_name(&self, key: &RegionKey) -> String {
        self.get(key)
            .or_else(|| self.resolve_name(key.as_str()))
            .map(|r| r.display_name().to_string())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn synonyms(&self) -> &SynonymTable {
        &self.synonyms
    }

    pub fn fallback_radius_km(&self) -> f64 {
        self.fallback_radius_km
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Incremental builder; [`RegionIndexBuilder::build`] freezes the index.
#[derive(Debug)]
pub struct RegionIndexBuilder {
    regions: Vec<Region>,
    positions: HashMap<RegionKey, usize>,
    synonyms: SynonymTable,
    fallback_radius_km: f64,
}

impl RegionIndexBuilder {
    pub fn new(synonyms: SynonymTable) -> Self {
        Self {
            regions: Vec::new(),
            positions: HashMap::new(),
            synonyms,
            fallback_radius_km: DEFAULT_FALLBACK_RADIUS_KM,
        }
    }

    pub fn with_fallback_radius_km(mut self, radius_km: f64) -> Self {
        self.fallback_radius_km = radius_km;
        self
    }

    /// Add a region. Its key is the synonym-normalized display name.
    pub fn add(
        &mut self,
        display_name: impl Into<String>,
        parts: Vec<Polygon>,
    ) -> Result<&mut Self, GeoError> {
        let display_name = display_name.into();
        let key = self.synonyms.normalize(&display_name);
        if key.is_empty() {
            return Err(GeoError::Dataset(format!(
                "region name '{display_name}' normalizes to an empty key"
            )));
        }
        if self.positions.contains_key(&key) {
            return Err(GeoError::DuplicateRegion(key.to_string()));
        }

        let region = Region::new(key.clone(), display_name, parts)?;
        self.positions.insert(key, self.regions.len());
        self.regions.push(region);
        Ok(self)
    }

    pub fn build(self) -> RegionIndex {
        RegionIndex {
            regions: self.regions,
            positions: self.positions,
            synonyms: self.synonyms,
            fallback_radius_km: self.fallback_radius_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ring;
    use proptest::prelude::*;

    fn rect(min_lat: f64, min_lng: f64, max_lat: f64, max_lng: f64) -> Ring {
        Ring::from_pairs(&[
            (min_lat, min_lng),
            (min_lat, max_lng),
            (max_lat, max_lng),
            (max_lat, min_lng),
        ])
        .unwrap()
    }

    fn pt(lat: f64, lng: f64) -> LatLng {
        LatLng::new(lat, lng).unwrap()
    }

    /// Two adjacent boxes loosely shaped like western India.
    fn sample_index() -> RegionIndex {
        let mut b = RegionIndex::builder(SynonymTable::default());
        b.add("Gujarat", vec![Polygon::simple(rect(20.0, 68.0, 24.5, 74.5))])
            .unwrap();
        b.add("Maharashtra", vec![Polygon::simple(rect(15.6, 72.6, 20.0, 80.9))])
            .unwrap();
        b.add(
            "NCT of Delhi",
            vec![Polygon::simple(rect(28.40, 76.84, 28.88, 77.35))],
        )
        .unwrap();
        b.build()
    }

    #[test]
    fn exact_containment_wins() {
        let index = sample_index();
        let loc = index.locate(pt(19.07, 72.88));
        assert_eq!(
            loc,
            Location::Located {
                region: RegionKey::new("maharashtra"),
                exact: true
            }
        );
    }

    #[test]
    fn overlap_resolves_in_insertion_order() {
        let index = sample_index();
        // lat 20.0 is the shared edge; Gujarat was inserted first.
        let loc = index.locate(pt(20.0, 73.0));
        assert_eq!(loc.region(), Some(&RegionKey::new("gujarat")));
    }

    #[test]
    fn synonym_key_is_canonical() {
        let index = sample_index();
        let loc = index.locate(pt(28.61, 77.20));
        assert_eq!(loc.region(), Some(&RegionKey::new("delhi")));
        assert_eq!(index.display_name(&RegionKey::new("delhi")), "NCT of Delhi");
        assert!(index.resolve_name("New Delhi").is_some());
    }

    #[test]
    fn near_miss_uses_centroid_fallback() {
        let index = sample_index();
        // Just outside the Delhi box, ~30 km from its centroid.
        let loc = index.locate(pt(28.64, 76.80));
        assert_eq!(
            loc,
            Location::Located {
                region: RegionKey::new("delhi"),
                exact: false
            }
        );
    }

    #[test]
    fn far_point_is_undetermined() {
        let index = sample_index();
        assert_eq!(index.locate(pt(-33.86, 151.21)), Location::Undetermined);
    }

    #[test]
    fn empty_index_is_undetermined() {
        assert_eq!(RegionIndex::empty().locate(pt(19.0, 73.0)), Location::Undetermined);
    }

    #[test]
    fn invalid_point_is_undetermined() {
        let index = sample_index();
        let bogus = LatLng { lat: f64::NAN, lng: 73.0 };
        assert_eq!(index.locate(bogus), Location::Undetermined);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut b = RegionIndex::builder(SynonymTable::default());
        b.add("Delhi", vec![Polygon::simple(rect(0.0, 0.0, 1.0, 1.0))])
            .unwrap();
        let err = b
            .add("NCT of Delhi", vec![Polygon::simple(rect(2.0, 2.0, 3.0, 3.0))])
            .unwrap_err();
        assert!(matches!(err, GeoError::DuplicateRegion(_)));
    }

    #[test]
    fn multi_part_region_matches_any_part() {
        let mut b = RegionIndex::builder(SynonymTable::default());
        b.add(
            "Andaman & Nicobar",
            vec![
                Polygon::simple(rect(10.5, 92.2, 13.7, 93.1)),
                Polygon::simple(rect(6.7, 92.7, 9.3, 93.9)),
            ],
        )
        .unwrap();
        let index = b.build();
        let loc = index.locate(pt(7.0, 93.5));
        assert_eq!(
            loc.region(),
            Some(&RegionKey::new("andaman and nicobar islands"))
        );
        assert!(loc.is_exact());
    }

    proptest! {
        /// Points strictly inside the outer ring and outside the hole are exact hits.
        #[test]
        fn interior_points_locate_exactly(
            lat in 10.001f64..19.999,
            lng in 70.001f64..79.999,
        ) {
            prop_assume!(!(lat >= 14.0 && lat <= 16.0 && lng >= 74.0 && lng <= 76.0));

            let mut b = RegionIndex::builder(SynonymTable::empty());
            b.add(
                "Square",
                vec![Polygon::new(rect(10.0, 70.0, 20.0, 80.0), vec![rect(14.0, 74.0, 16.0, 76.0)])],
            )
            .unwrap();
            let index = b.build();

            prop_assert_eq!(
                index.locate(pt(lat, lng)),
                Location::Located { region: RegionKey::new("square"), exact: true }
            );
        }

        /// Points beyond the radius from every centroid are never attributed.
        #[test]
        fn distant_points_are_undetermined(
            lat in -80.0f64..-10.0,
            lng in -179.0f64..179.0,
            radius in 1.0f64..500.0,
        ) {
            let mut b = RegionIndex::builder(SynonymTable::empty()).with_fallback_radius_km(radius);
            b.add("North", vec![Polygon::simple(rect(20.0, 70.0, 21.0, 71.0))]).unwrap();
            let index = b.build();
            prop_assert_eq!(index.locate(pt(lat, lng)), Location::Undetermined);
        }
    }
}
