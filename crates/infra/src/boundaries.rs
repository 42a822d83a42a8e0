//! Loading boundary datasets from disk.

use std::path::Path;

use anyhow::Context;
use tracing::info;

use regiongate_geo::{BoundaryDataset, RegionIndex, SynonymTable};

use crate::config::EngineConfig;

/// Parse a boundary dataset and build an index with the configured fallback
/// radius.
pub fn build_region_index(text: &str, config: &EngineConfig, synonyms: SynonymTable) -> anyhow::Result<RegionIndex> {
    let dataset = BoundaryDataset::from_json_str(text, &config.boundary_name_property)
        .context("failed to parse boundary dataset")?;
    let builder = RegionIndex::builder(synonyms).with_fallback_radius_km(config.fallback_radius_km);
    dataset.into_index(builder).context("failed to index boundary dataset")
}

/// Read and index the dataset at `path`.
pub fn load_region_index(path: &Path, config: &EngineConfig, synonyms: SynonymTable) -> anyhow::Result<RegionIndex> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read boundary dataset {}", path.display()))?;
    let index = build_region_index(&text, config, synonyms)
        .with_context(|| format!("invalid boundary dataset {}", path.display()))?;

    info!(path = %path.display(), regions = index.len(), "boundary dataset loaded");
    Ok(index)
}
