//! `regiongate-geo`: administrative regions and point geodetection.
//!
//! The [`RegionIndex`] is built once from a boundary dataset and never
//! mutated; reloads build a new index and swap it through
//! [`SharedRegionIndex`].

pub mod dataset;
pub mod error;
pub mod index;
pub mod name;
pub mod point;
pub mod polygon;
pub mod region;
pub mod shared;

pub use dataset::{BoundaryDataset, BoundarySource};
pub use error::GeoError;
pub use index::{DEFAULT_FALLBACK_RADIUS_KM, Location, RegionIndex, RegionIndexBuilder};
pub use name::{RegionKey, SynonymTable};
pub use point::LatLng;
pub use polygon::{BoundingBox, Containment, Polygon, Ring};
pub use region::Region;
pub use shared::SharedRegionIndex;
