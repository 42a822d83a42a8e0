//! Boundary dataset parsing.
//!
//! Two encodings are accepted:
//!
//! - native: `{"regions": [{"name", "outer": [[lat, lng], ...], "holes", "parts"}]}`
//! - GeoJSON `FeatureCollection` of `Polygon`/`MultiPolygon` features
//!   (positions are `[lng, lat]`, the name comes from a feature property)

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::{GeoError, LatLng, Polygon, RegionIndex, RegionIndexBuilder, Ring};

/// One named region as read from a dataset, before indexing.
#[derive(Debug, Clone)]
pub struct BoundarySource {
    pub name: String,
    pub parts: Vec<Polygon>,
}

/// A parsed boundary dataset, in file order.
#[derive(Debug, Clone, Default)]
pub struct BoundaryDataset {
    pub sources: Vec<BoundarySource>,
}

#[derive(Debug, Deserialize)]
struct NativeDataset {
    regions: Vec<NativeRegion>,
}

#[derive(Debug, Deserialize)]
struct NativeRegion {
    name: String,
    outer: Vec<[f64; 2]>,
    #[serde(default)]
    holes: Vec<Vec<[f64; 2]>>,
    #[serde(default)]
    parts: Vec<NativePart>,
}

#[derive(Debug, Deserialize)]
struct NativePart {
    outer: Vec<[f64; 2]>,
    #[serde(default)]
    holes: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    geometry: Option<Geometry>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

impl BoundaryDataset {
    /// Parse either encoding, detected from the top-level shape.
    pub fn from_json_str(text: &str, name_property: &str) -> Result<Self, GeoError> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("type").and_then(Value::as_str) == Some("FeatureCollection") {
            Self::from_geojson(value, name_property)
        } else if value.get("regions").is_some() {
            Self::from_native(value)
        } else {
            Err(GeoError::Dataset(
                "expected a GeoJSON FeatureCollection or an object with 'regions'".to_string(),
            ))
        }
    }

    fn from_native(value: Value) -> Result<Self, GeoError> {
        let dataset: NativeDataset = serde_json::from_value(value)?;
        let mut sources = Vec::with_capacity(dataset.regions.len());

        for region in dataset.regions {
            let mut parts = vec![native_polygon(&region.outer, &region.holes)?];
            for part in &region.parts {
                parts.push(native_polygon(&part.outer, &part.holes)?);
            }
            sources.push(BoundarySource {
                name: region.name,
                parts,
            });
        }

        Ok(Self { sources })
    }

    fn from_geojson(value: Value, name_property: &str) -> Result<Self, GeoError> {
        let collection: FeatureCollection = serde_json::from_value(value)?;
        let mut sources = Vec::with_capacity(collection.features.len());

        for (i, feature) in collection.features.into_iter().enumerate() {
            let name = feature
                .properties
                .as_ref()
                .and_then(|p| p.get(name_property))
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    GeoError::Dataset(format!("feature {i} has no string '{name_property}' property"))
                })?
                .to_string();

            let parts = match feature.geometry {
                Some(Geometry::Polygon { coordinates }) => vec![geojson_polygon(&coordinates)?],
                Some(Geometry::MultiPolygon { coordinates }) => coordinates
                    .iter()
                    .map(|rings| geojson_polygon(rings))
                    .collect::<Result<Vec<_>, _>>()?,
                Some(Geometry::Unsupported) | None => {
                    warn!(feature = i, region = %name, "skipping feature without polygon geometry");
                    continue;
                }
            };

            sources.push(BoundarySource { name, parts });
        }

        Ok(Self { sources })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Add every source to `builder`, in dataset order, and freeze the index.
    pub fn into_index(self, mut builder: RegionIndexBuilder) -> Result<RegionIndex, GeoError> {
        for source in self.sources {
            builder.add(source.name, source.parts)?;
        }
        Ok(builder.build())
    }
}

fn native_ring(pairs: &[[f64; 2]]) -> Result<Ring, GeoError> {
    Ring::new(
        pairs
            .iter()
            .map(|&[lat, lng]| LatLng::new(lat, lng))
            .collect::<Result<Vec<_>, _>>()?,
    )
}

fn native_polygon(outer: &[[f64; 2]], holes: &[Vec<[f64; 2]>]) -> Result<Polygon, GeoError> {
    let holes = holes
        .iter()
        .map(|h| native_ring(h))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(native_ring(outer)?, holes))
}

fn geojson_ring(positions: &[Vec<f64>]) -> Result<Ring, GeoError> {
    let vertices = positions
        .iter()
        .map(|pos| match pos.as_slice() {
            [lng, lat, ..] => LatLng::new(*lat, *lng),
            _ => Err(GeoError::Dataset(format!(
                "position needs at least 2 values, got {}",
                pos.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ring::new(vertices)
}

fn geojson_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon, GeoError> {
    let Some((outer, holes)) = rings.split_first() else {
        return Err(GeoError::Dataset("polygon without rings".to_string()));
    };
    let holes = holes
        .iter()
        .map(|h| geojson_ring(h))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(geojson_ring(outer)?, holes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Location, RegionKey, SynonymTable};

    #[test]
    fn parses_native_dataset_with_hole_and_part() {
        let text = r#"{
            "regions": [{
                "name": "Telangana",
                "outer": [[16.0, 77.0], [16.0, 81.0], [19.9, 81.0], [19.9, 77.0]],
                "holes": [[[17.2, 78.2], [17.2, 78.7], [17.6, 78.7], [17.6, 78.2]]],
                "parts": [{"outer": [[10.0, 70.0], [10.0, 71.0], [11.0, 71.0]]}]
            }]
        }"#;
        let dataset = BoundaryDataset::from_json_str(text, "name").unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.sources[0].parts.len(), 2);
        assert_eq!(dataset.sources[0].parts[0].holes().len(), 1);
    }

    #[test]
    fn parses_geojson_with_lng_lat_order() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"st_nm": "Goa"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[73.6, 14.9], [74.3, 14.9], [74.3, 15.8], [73.6, 15.8], [73.6, 14.9]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"st_nm": "Somewhere"},
                    "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}
                }
            ]
        }"#;
        let dataset = BoundaryDataset::from_json_str(text, "st_nm").unwrap();
        assert_eq!(dataset.len(), 1);

        let index = dataset
            .into_index(RegionIndex::builder(SynonymTable::default()))
            .unwrap();
        assert_eq!(
            index.locate(LatLng::new(15.3, 74.0).unwrap()),
            Location::Located {
                region: RegionKey::new("goa"),
                exact: true
            }
        );
    }

    #[test]
    fn missing_name_property_is_an_error() {
        let text = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {}, "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1]]]}}
        ]}"#;
        let err = BoundaryDataset::from_json_str(text, "name").unwrap_err();
        assert!(matches!(err, GeoError::Dataset(_)));
    }

    #[test]
    fn unknown_shape_is_rejected() {
        assert!(matches!(
            BoundaryDataset::from_json_str("{\"foo\": 1}", "name"),
            Err(GeoError::Dataset(_))
        ));
        assert!(matches!(
            BoundaryDataset::from_json_str("not json", "name"),
            Err(GeoError::Json(_))
        ));
    }
}
