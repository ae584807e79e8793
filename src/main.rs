use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use watershed_landuse::config::{MultiMatchPolicy, PipelineConfig};
use watershed_landuse::pipeline::run_pipeline;

/// Watershed land-use percentage calculator.
///
/// Selects a watershed polygon by identifier, clips a land-cover raster
/// to it, and writes a CSV with per-class pixel percentages.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON configuration file; individual flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// National watershed polygon dataset (HUC8, HUC12, ...)
    #[arg(long, required_unless_present = "config")]
    watershed_dataset: Option<PathBuf>,

    /// Attribute field identifying each watershed, e.g. huc12
    #[arg(long, required_unless_present = "config")]
    watershed_id_field: Option<String>,

    /// Identifier of the watershed to select
    #[arg(long, required_unless_present = "config")]
    watershed_id: Option<String>,

    /// Land-cover raster to clip
    #[arg(long, required_unless_present = "config")]
    landcover_raster: Option<PathBuf>,

    /// Destination for the selected-watershed shapefile
    #[arg(long, required_unless_present = "config")]
    selected_watershed: Option<PathBuf>,

    /// Destination for the clipped land-cover raster (GeoTIFF)
    #[arg(long, required_unless_present = "config")]
    clipped_raster: Option<PathBuf>,

    /// Destination for the land-use statistics CSV
    #[arg(long, required_unless_present = "config")]
    statistics_csv: Option<PathBuf>,

    /// Overwrite existing destinations
    #[arg(long)]
    overwrite: Option<bool>,

    /// Policy for identifiers matching more than one watershed
    #[arg(long, value_enum)]
    multi_match: Option<MultiMatchPolicy>,
}

fn build_config(args: Args) -> Result<PipelineConfig> {
    let base = match &args.config {
        Some(path) => Some(PipelineConfig::from_file(path)?),
        None => None,
    };

    // Flags win over config-file values; without a config file clap has
    // already enforced that every path flag is present.
    let require = |flag: Option<PathBuf>, from_file: Option<PathBuf>, name: &str| {
        flag.or(from_file)
            .with_context(|| format!("missing required input: {}", name))
    };

    Ok(PipelineConfig {
        watershed_dataset: require(
            args.watershed_dataset,
            base.as_ref().map(|c| c.watershed_dataset.clone()),
            "--watershed-dataset",
        )?,
        watershed_id_field: args
            .watershed_id_field
            .or(base.as_ref().map(|c| c.watershed_id_field.clone()))
            .context("missing required input: --watershed-id-field")?,
        watershed_id: args
            .watershed_id
            .or(base.as_ref().map(|c| c.watershed_id.clone()))
            .context("missing required input: --watershed-id")?,
        landcover_raster: require(
            args.landcover_raster,
            base.as_ref().map(|c| c.landcover_raster.clone()),
            "--landcover-raster",
        )?,
        selected_watershed: require(
            args.selected_watershed,
            base.as_ref().map(|c| c.selected_watershed.clone()),
            "--selected-watershed",
        )?,
        clipped_raster: require(
            args.clipped_raster,
            base.as_ref().map(|c| c.clipped_raster.clone()),
            "--clipped-raster",
        )?,
        statistics_csv: require(
            args.statistics_csv,
            base.as_ref().map(|c| c.statistics_csv.clone()),
            "--statistics-csv",
        )?,
        overwrite: args
            .overwrite
            .or(base.as_ref().map(|c| c.overwrite))
            .unwrap_or(true),
        multi_match: args
            .multi_match
            .or(base.as_ref().map(|c| c.multi_match))
            .unwrap_or_default(),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = build_config(args)?;

    println!(
        "Selecting watershed {} from {:?}",
        config.watershed_id, config.watershed_dataset
    );

    let report = run_pipeline(&config)?;

    println!("\nWatershed land-use summary:");
    println!("  Watershed features: {}", report.feature_count);
    println!("  Land-cover classes: {}", report.class_count);
    println!("  Classified pixels:  {}", report.total_pixels);
    println!("  Shapefile: {:?}", report.shapefile);
    println!("  Raster:    {:?}", report.raster);
    println!("  CSV:       {:?}", report.csv);

    Ok(())
}
