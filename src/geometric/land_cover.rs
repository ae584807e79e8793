use anyhow::{Context, Result};
use gdal::raster::Buffer;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::geo_core::{BoundingBox, PixelWindow, RasterGrid};
use crate::geometric::watershed::SelectedWatershed;
use crate::nlcd;

/// NoData value written when the source raster declares none.
const CLIP_NODATA: i32 = -9999;

static LEASE_HELD: AtomicBool = AtomicBool::new(false);

/// Exclusive capability for raster analysis.
///
/// The clip operation depends on a shared, limited resource; holding it
/// across a crash or error would block subsequent runs. Acquisition is
/// scoped: the lease is released when the guard drops, on success and
/// failure paths alike. A second acquisition while the lease is held
/// fails rather than blocks.
pub struct AnalysisLease {
    _private: (),
}

impl AnalysisLease {
    pub fn acquire() -> Result<Self, Error> {
        if LEASE_HELD
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Ok(AnalysisLease { _private: () })
        } else {
            Err(Error::AnalysisLeaseHeld)
        }
    }
}

impl Drop for AnalysisLease {
    fn drop(&mut self) {
        LEASE_HELD.store(false, Ordering::Release);
    }
}

/// Per-class entry of the clipped raster's value/count/name catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub value: i32,
    pub count: u64,
    pub name: String,
}

/// Value/count/name catalog of a clipped raster.
///
/// Entries are sorted ascending by class code and reflect only cells
/// inside the mask; NoData cells are never counted.
#[derive(Debug, Clone, Default)]
pub struct LandCoverCatalog {
    entries: Vec<CatalogEntry>,
}

impl LandCoverCatalog {
    /// Build a catalog from per-value cell counts, resolving names through
    /// the NLCD legend. Unknown codes get the literal "Unknown" label.
    pub fn from_counts(counts: BTreeMap<i32, u64>) -> Self {
        let entries = counts
            .into_iter()
            .map(|(value, count)| CatalogEntry {
                value,
                count,
                name: nlcd::class_label(value).to_string(),
            })
            .collect();
        LandCoverCatalog { entries }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn total_pixels(&self) -> u64 {
        self.entries.iter().map(|e| e.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of the clip stage.
///
/// `raster` is `None` when the mask does not overlap the raster extent at
/// all; the catalog is empty in that case and the aggregation stage turns
/// it into an explicit error.
#[derive(Debug)]
pub struct ClippedLandCover {
    pub raster: Option<PathBuf>,
    pub catalog: LandCoverCatalog,
}

/// Clips a land-cover raster to the watershed selected upstream
/// ("INSIDE" semantics: cells outside the mask become NoData, and the
/// output extent shrinks to the overlap of raster and mask envelope).
pub struct LandCoverClip {
    raster_path: PathBuf,
    output_path: PathBuf,
}

impl LandCoverClip {
    pub fn new(raster_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        LandCoverClip {
            raster_path: raster_path.into(),
            output_path: output_path.into(),
        }
    }

    /// Run the clip against the mask shapefile produced by the selection
    /// stage. The mask path is taken from `mask` and never re-derived.
    pub fn run(&self, mask: &SelectedWatershed) -> Result<ClippedLandCover> {
        let _lease = AnalysisLease::acquire()?;

        let dataset = Dataset::open(&self.raster_path).map_err(|e| Error::DatasetNotFound {
            path: self.raster_path.clone(),
            source: e,
        })?;
        let band = dataset
            .rasterband(1)
            .context("failed to open band 1 of the land-cover raster")?;

        let (width, height) = dataset.raster_size();
        let transform = dataset
            .geo_transform()
            .context("failed to read the land-cover raster geotransform")?;
        let grid = RasterGrid {
            transform,
            width,
            height,
        };

        let mask_geometries = load_mask_geometries(&mask.path)?;

        let window = match grid.window(&mask.envelope) {
            Some(window) => window,
            None => {
                println!("Watershed mask does not overlap the land-cover raster; nothing to clip");
                return Ok(ClippedLandCover {
                    raster: None,
                    catalog: LandCoverCatalog::default(),
                });
            }
        };

        let src_nodata = band.no_data_value().map(|v| v as i32);
        let fill = src_nodata.unwrap_or(CLIP_NODATA);

        let buffer = band
            .read_as::<i32>(
                (window.col_off as isize, window.row_off as isize),
                (window.cols, window.rows),
                (window.cols, window.rows),
                None,
            )
            .context("failed to read the land-cover raster window")?;

        let progress = ProgressBar::new(window.rows as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rows")?
                .progress_chars("#>-"),
        );

        let (clipped, counts) = classify_window(
            &buffer.data,
            &grid,
            &window,
            &mask_geometries,
            src_nodata,
            fill,
            Some(&progress),
        )?;
        progress.finish_and_clear();

        self.write_raster(&dataset, &grid, &window, clipped, fill)?;
        println!(
            "Clipped land-cover raster saved to: {:?}",
            self.output_path
        );

        Ok(ClippedLandCover {
            raster: Some(self.output_path.clone()),
            catalog: LandCoverCatalog::from_counts(counts),
        })
    }

    fn write_raster(
        &self,
        source: &Dataset,
        grid: &RasterGrid,
        window: &PixelWindow,
        data: Vec<i32>,
        nodata: i32,
    ) -> Result<()> {
        if self.output_path.exists() {
            std::fs::remove_file(&self.output_path).with_context(|| {
                format!("failed to remove existing file {:?}", self.output_path)
            })?;
        }
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory {:?}", parent))?;
            }
        }

        let driver =
            DriverManager::get_driver_by_name("GTiff").context("failed to get GTiff driver")?;
        let mut out = driver
            .create_with_band_type::<i32, _>(
                &self.output_path,
                window.cols as isize,
                window.rows as isize,
                1,
            )
            .with_context(|| format!("failed to create GeoTIFF {:?}", self.output_path))?;

        out.set_geo_transform(&grid.window_transform(window))
            .context("failed to set the output geotransform")?;
        if let Ok(srs) = source.spatial_ref() {
            out.set_spatial_ref(&srs)
                .context("failed to set the output spatial reference")?;
        }

        let mut out_band = out.rasterband(1).context("failed to open output band 1")?;
        let out_buffer = Buffer::new((window.cols, window.rows), data);
        out_band
            .write((0, 0), (window.cols, window.rows), &out_buffer)
            .context("failed to write the clipped raster band")?;
        out_band
            .set_no_data_value(Some(nodata as f64))
            .context("failed to set the output NoData value")?;

        Ok(())
    }
}

fn load_mask_geometries(path: &Path) -> Result<Vec<(Geometry, BoundingBox)>> {
    let dataset = Dataset::open(path).map_err(|e| Error::DatasetNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut layer = dataset
        .layer(0)
        .context("failed to open the mask layer")?;

    let mut geometries = Vec::new();
    for feature in layer.features() {
        if let Some(geometry) = feature.geometry() {
            let env = geometry.envelope();
            geometries.push((
                geometry.clone(),
                BoundingBox::new(env.MinX, env.MinY, env.MaxX, env.MaxY),
            ));
        }
    }
    Ok(geometries)
}

/// Classify every cell of the window: cells whose center falls inside a
/// mask geometry keep their value and are counted; everything else
/// becomes `fill`. Cells carrying the source NoData value are excluded
/// from the counts even inside the mask.
fn classify_window(
    data: &[i32],
    grid: &RasterGrid,
    window: &PixelWindow,
    mask: &[(Geometry, BoundingBox)],
    src_nodata: Option<i32>,
    fill: i32,
    progress: Option<&ProgressBar>,
) -> Result<(Vec<i32>, BTreeMap<i32, u64>)> {
    let mut clipped = vec![fill; window.cols * window.rows];
    let mut counts: BTreeMap<i32, u64> = BTreeMap::new();

    let mut point = Geometry::from_wkt("POINT (0 0)")
        .context("failed to create the probe point geometry")?;

    for row in 0..window.rows {
        for col in 0..window.cols {
            let idx = row * window.cols + col;
            let value = data[idx];
            if Some(value) == src_nodata {
                continue;
            }

            let (x, y) = grid.cell_center(window.col_off + col, window.row_off + row);
            point.set_point_2d(0, (x, y));

            let inside = mask
                .iter()
                .any(|(geometry, bbox)| bbox.contains_point(x, y) && geometry.contains(&point));
            if inside {
                clipped[idx] = value;
                *counts.entry(value).or_insert(0) += 1;
            }
        }
        if let Some(progress) = progress {
            progress.inc(1);
        }
    }

    Ok((clipped, counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(width: usize, height: usize) -> RasterGrid {
        // 1-unit cells, origin top-left at (0, height)
        RasterGrid {
            transform: [0.0, 1.0, 0.0, height as f64, 0.0, -1.0],
            width,
            height,
        }
    }

    fn full_window(grid: &RasterGrid) -> PixelWindow {
        PixelWindow {
            col_off: 0,
            row_off: 0,
            cols: grid.width,
            rows: grid.height,
        }
    }

    fn square_mask(wkt: &str) -> Vec<(Geometry, BoundingBox)> {
        let geometry = Geometry::from_wkt(wkt).unwrap();
        let env = geometry.envelope();
        let bbox = BoundingBox::new(env.MinX, env.MinY, env.MaxX, env.MaxY);
        vec![(geometry, bbox)]
    }

    #[test]
    fn test_classify_window_counts_inside_only() {
        let grid = unit_grid(4, 4);
        let window = full_window(&grid);
        // Left half of the grid
        let mask = square_mask("POLYGON ((0 0, 2 0, 2 4, 0 4, 0 0))");
        let data = vec![11; 16];

        let (clipped, counts) =
            classify_window(&data, &grid, &window, &mask, None, CLIP_NODATA, None).unwrap();

        assert_eq!(counts.get(&11), Some(&8));
        // Cells left of x=2 survive, the rest are filled
        assert_eq!(clipped[0], 11);
        assert_eq!(clipped[1], 11);
        assert_eq!(clipped[2], CLIP_NODATA);
        assert_eq!(clipped[3], CLIP_NODATA);
    }

    #[test]
    fn test_classify_window_excludes_nodata() {
        let grid = unit_grid(2, 2);
        let window = full_window(&grid);
        let mask = square_mask("POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))");
        let data = vec![11, 0, 21, 0];

        let (_, counts) =
            classify_window(&data, &grid, &window, &mask, Some(0), 0, None).unwrap();

        assert_eq!(counts.get(&11), Some(&1));
        assert_eq!(counts.get(&21), Some(&1));
        assert_eq!(counts.get(&0), None);
    }

    #[test]
    fn test_classify_window_disjoint_mask_counts_nothing() {
        let grid = unit_grid(2, 2);
        let window = full_window(&grid);
        let mask = square_mask("POLYGON ((10 10, 12 10, 12 12, 10 12, 10 10))");
        let data = vec![11, 11, 11, 11];

        let (clipped, counts) =
            classify_window(&data, &grid, &window, &mask, None, CLIP_NODATA, None).unwrap();

        assert!(counts.is_empty());
        assert!(clipped.iter().all(|&v| v == CLIP_NODATA));
    }

    #[test]
    fn test_catalog_sorted_with_unknown_fallback() {
        let mut counts = BTreeMap::new();
        counts.insert(99, 2u64);
        counts.insert(11, 5u64);

        let catalog = LandCoverCatalog::from_counts(counts);
        let entries = catalog.entries();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, 11);
        assert_eq!(entries[0].name, "Open Water");
        assert_eq!(entries[1].value, 99);
        assert_eq!(entries[1].name, "Unknown");
        assert_eq!(catalog.total_pixels(), 7);
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = LandCoverCatalog::default();
        assert!(catalog.is_empty());
        assert_eq!(catalog.total_pixels(), 0);
    }

    #[test]
    fn test_analysis_lease_is_exclusive() {
        let lease = AnalysisLease::acquire().unwrap();
        match AnalysisLease::acquire() {
            Err(Error::AnalysisLeaseHeld) => {}
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("second acquisition should fail while the lease is held"),
        }
        drop(lease);
        // Released on drop, so a fresh acquisition succeeds
        let lease = AnalysisLease::acquire().unwrap();
        drop(lease);
    }
}
