use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::Error;
use crate::geometric::land_cover::LandCoverClip;
use crate::geometric::watershed::WatershedSelector;
use crate::statistics::LandUseStats;

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub shapefile: PathBuf,
    pub raster: PathBuf,
    pub csv: PathBuf,
    pub feature_count: usize,
    pub class_count: usize,
    pub total_pixels: u64,
}

/// Run the full pipeline: select the watershed, clip the land-cover
/// raster to it, and write the per-class statistics CSV.
///
/// Stages run strictly in order and any failure aborts the run; a later
/// stage never sees a stale or empty result from an earlier one.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineReport> {
    preflight_outputs(config)?;

    let selector = WatershedSelector::new(
        &config.watershed_dataset,
        &config.watershed_id_field,
        &config.watershed_id,
        &config.selected_watershed,
    )
    .with_multi_match(config.multi_match);
    let selected = selector.run()?;

    let clip = LandCoverClip::new(&config.landcover_raster, &config.clipped_raster);
    let clipped = clip.run(&selected)?;

    let stats = LandUseStats::from_catalog(&clipped.catalog)?;
    stats.write_csv(&config.statistics_csv)?;

    // Unreachable once the catalog is non-empty; kept as a typed error
    // rather than a panic.
    let raster = clipped.raster.ok_or(Error::NoClassifiedPixels)?;

    Ok(PipelineReport {
        shapefile: selected.path,
        raster,
        csv: config.statistics_csv.clone(),
        feature_count: selected.feature_count,
        class_count: stats.rows().len(),
        total_pixels: stats.total_pixels(),
    })
}

/// Check the three destinations against the overwrite policy and make
/// sure their parent directories exist, before any stage writes anything.
fn preflight_outputs(config: &PipelineConfig) -> Result<()> {
    for path in config.outputs() {
        if path.exists() && !config.overwrite {
            return Err(Error::OutputExists {
                path: path.to_path_buf(),
            }
            .into());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory {:?}", parent))?;
            }
        }
    }
    Ok(())
}
