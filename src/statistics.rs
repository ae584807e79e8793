use anyhow::{Context, Result};
use std::path::Path;

use crate::error::Error;
use crate::geometric::land_cover::LandCoverCatalog;

/// Exact CSV header, fixed column order.
pub const CSV_HEADER: [&str; 4] = ["Land Use Type", "Land Use Name", "Pixel Count", "Percentage"];

/// One row of the land-use summary.
#[derive(Debug, Clone, PartialEq)]
pub struct LandUseRow {
    pub value: i32,
    pub name: String,
    pub count: u64,
    /// Percentage of all classified cells in the clipped raster, full
    /// f64 precision, never pre-rounded.
    pub percentage: f64,
}

/// Per-class land-use percentages over the clipped watershed.
///
/// Row order follows the catalog (ascending class code), so repeated runs
/// over identical inputs produce byte-identical CSV output.
pub struct LandUseStats {
    rows: Vec<LandUseRow>,
    total_pixels: u64,
}

impl LandUseStats {
    /// Compute percentages from the clipped raster's catalog.
    ///
    /// An empty catalog means the mask contained no classified cells;
    /// that is surfaced as an explicit error instead of a division by
    /// zero, and no CSV is written.
    pub fn from_catalog(catalog: &LandCoverCatalog) -> Result<Self, Error> {
        let total_pixels = catalog.total_pixels();
        if total_pixels == 0 {
            return Err(Error::NoClassifiedPixels);
        }

        let rows = catalog
            .entries()
            .iter()
            .map(|entry| LandUseRow {
                value: entry.value,
                name: entry.name.clone(),
                count: entry.count,
                percentage: entry.count as f64 * 100.0 / total_pixels as f64,
            })
            .collect();

        Ok(LandUseStats { rows, total_pixels })
    }

    pub fn rows(&self) -> &[LandUseRow] {
        &self.rows
    }

    pub fn total_pixels(&self) -> u64 {
        self.total_pixels
    }

    /// Write the summary CSV.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create statistics CSV at {:?}", path))?;

        writer
            .write_record(CSV_HEADER)
            .context("failed to write the CSV header")?;
        for row in &self.rows {
            writer
                .write_record([
                    row.value.to_string(),
                    row.name.clone(),
                    row.count.to_string(),
                    row.percentage.to_string(),
                ])
                .with_context(|| format!("failed to write the CSV row for class {}", row.value))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to flush statistics CSV at {:?}", path))?;

        println!("Land use statistics saved to: {:?}", path);
        Ok(())
    }
}
