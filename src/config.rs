use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when the watershed identifier matches more than one feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MultiMatchPolicy {
    /// Copy every matching feature into the selection output.
    #[default]
    AcceptAll,
    /// Treat an ambiguous selection as a fatal error.
    Error,
}

/// Run configuration, resolved once before the pipeline starts.
///
/// Each stage receives this value explicitly; there is no ambient
/// workspace state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// National watershed polygon dataset (HUC8, HUC12, ...).
    pub watershed_dataset: PathBuf,
    /// Attribute field identifying each watershed, e.g. "huc12".
    pub watershed_id_field: String,
    /// Identifier of the watershed to select.
    pub watershed_id: String,
    /// Land-cover raster to clip.
    pub landcover_raster: PathBuf,
    /// Destination for the selected-watershed shapefile.
    pub selected_watershed: PathBuf,
    /// Destination for the clipped land-cover raster (GeoTIFF).
    pub clipped_raster: PathBuf,
    /// Destination for the land-use statistics CSV.
    pub statistics_csv: PathBuf,
    /// Overwrite existing destinations unconditionally.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default)]
    pub multi_match: MultiMatchPolicy,
}

fn default_overwrite() -> bool {
    true
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {:?}", path))?;
        let config: PipelineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse configuration file {:?}", path))?;
        Ok(config)
    }

    /// The three destination paths, in pipeline order.
    pub fn outputs(&self) -> [&Path; 3] {
        [
            &self.selected_watershed,
            &self.clipped_raster,
            &self.statistics_csv,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "watershed_dataset": "/data/wbd/huc12.shp",
            "watershed_id_field": "huc12",
            "watershed_id": "102701010207",
            "landcover_raster": "/data/nlcd/nlcd_2021.tif",
            "selected_watershed": "/out/watershed.shp",
            "clipped_raster": "/out/landuse.tif",
            "statistics_csv": "/out/landuse.csv"
        }"#
    }

    #[test]
    fn test_defaults_applied() {
        let config: PipelineConfig = serde_json::from_str(sample_json()).unwrap();
        assert!(config.overwrite);
        assert_eq!(config.multi_match, MultiMatchPolicy::AcceptAll);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(&path, sample_json()).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.watershed_id, "102701010207");
        assert_eq!(config.watershed_id_field, "huc12");
        assert_eq!(config.outputs()[2], Path::new("/out/landuse.csv"));
    }

    #[test]
    fn test_multi_match_round_trip() {
        let config: PipelineConfig = serde_json::from_str(sample_json()).unwrap();
        let mut config = config;
        config.multi_match = MultiMatchPolicy::Error;
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"error\""));
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.multi_match, MultiMatchPolicy::Error);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/run.json")).unwrap_err();
        assert!(err.to_string().contains("configuration file"));
    }
}
