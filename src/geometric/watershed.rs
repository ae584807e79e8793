use anyhow::{Context, Result};
use gdal::vector::{FieldValue, Geometry, LayerAccess, LayerOptions};
use gdal::{Dataset, DriverManager};
use std::path::{Path, PathBuf};

use crate::config::MultiMatchPolicy;
use crate::error::Error;
use crate::geo_core::BoundingBox;

/// Outcome of the selection stage, threaded into the clip stage.
///
/// `path` is the shapefile this run wrote; the clipper must use it as its
/// mask source rather than re-deriving a path of its own.
#[derive(Debug, Clone)]
pub struct SelectedWatershed {
    pub path: PathBuf,
    pub feature_count: usize,
    /// Union envelope of the selected geometries, in the dataset's CRS.
    pub envelope: BoundingBox,
}

/// Selects watershed feature(s) by identifier and persists them to a new
/// shapefile.
///
/// The selection is a case-sensitive attribute-equality filter pushed down
/// to the OGR layer. No geometry validation and no reprojection happen
/// here.
pub struct WatershedSelector {
    dataset_path: PathBuf,
    id_field: String,
    watershed_id: String,
    output_path: PathBuf,
    multi_match: MultiMatchPolicy,
}

struct SelectedFeature {
    geometry: Geometry,
    field_names: Vec<String>,
    field_values: Vec<FieldValue>,
}

impl WatershedSelector {
    pub fn new(
        dataset_path: impl Into<PathBuf>,
        id_field: impl Into<String>,
        watershed_id: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        WatershedSelector {
            dataset_path: dataset_path.into(),
            id_field: id_field.into(),
            watershed_id: watershed_id.into(),
            output_path: output_path.into(),
            multi_match: MultiMatchPolicy::default(),
        }
    }

    pub fn with_multi_match(mut self, policy: MultiMatchPolicy) -> Self {
        self.multi_match = policy;
        self
    }

    /// Attribute query pushed down to the source layer.
    pub fn query(&self) -> String {
        format!("{} = '{}'", self.id_field, self.watershed_id)
    }

    /// Run the selection and write the matching feature(s) to the output
    /// shapefile.
    pub fn run(&self) -> Result<SelectedWatershed> {
        let dataset = Dataset::open(&self.dataset_path).map_err(|e| Error::DatasetNotFound {
            path: self.dataset_path.clone(),
            source: e,
        })?;

        let mut layer = dataset
            .layer(0)
            .context("failed to open the first layer of the watershed dataset")?;

        // Field definitions are captured up front: the schema check replaces
        // guessing at runtime, and the output layer mirrors the source.
        let field_defs: Vec<(String, _)> = layer
            .defn()
            .fields()
            .map(|f| (f.name(), f.field_type()))
            .collect();

        if !field_defs.iter().any(|(name, _)| name == &self.id_field) {
            return Err(Error::FieldNotFound {
                field: self.id_field.clone(),
                available: field_defs.iter().map(|(name, _)| name.clone()).collect(),
            }
            .into());
        }

        let query = self.query();
        layer
            .set_attribute_filter(&query)
            .map_err(|e| Error::SelectionQuery {
                query: query.clone(),
                source: e,
            })?;

        let srs = layer.spatial_ref();

        let mut matches: Vec<SelectedFeature> = Vec::new();
        let mut envelope: Option<BoundingBox> = None;

        for feature in layer.features() {
            let geometry = match feature.geometry() {
                Some(g) => g.clone(),
                None => continue,
            };

            let env = geometry.envelope();
            let bbox = BoundingBox::new(env.MinX, env.MinY, env.MaxX, env.MaxY);
            envelope = Some(match envelope {
                Some(e) => e.union(&bbox),
                None => bbox,
            });

            let mut field_names = Vec::new();
            let mut field_values = Vec::new();
            for (name, value) in feature.fields() {
                if let Some(value) = value {
                    field_names.push(name);
                    field_values.push(value);
                }
            }

            matches.push(SelectedFeature {
                geometry,
                field_names,
                field_values,
            });
        }

        if matches.is_empty() {
            return Err(Error::NoMatchingWatershed {
                id: self.watershed_id.clone(),
            }
            .into());
        }
        if matches.len() > 1 && self.multi_match == MultiMatchPolicy::Error {
            return Err(Error::AmbiguousWatershed {
                id: self.watershed_id.clone(),
                count: matches.len(),
            }
            .into());
        }

        let envelope = envelope.context("selection produced no geometry envelope")?;
        let feature_count = matches.len();
        self.write_shapefile(matches, &field_defs, srs.as_ref())?;

        println!(
            "Selected {} watershed feature(s) saved to: {:?}",
            feature_count, self.output_path
        );

        Ok(SelectedWatershed {
            path: self.output_path.clone(),
            feature_count,
            envelope,
        })
    }

    fn write_shapefile(
        &self,
        features: Vec<SelectedFeature>,
        field_defs: &[(String, u32)],
        srs: Option<&gdal::spatial_ref::SpatialRef>,
    ) -> Result<()> {
        remove_stale_shapefile(&self.output_path)?;
        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create output directory {:?}", parent))?;
            }
        }

        let driver = DriverManager::get_driver_by_name("ESRI Shapefile")
            .context("failed to get the ESRI Shapefile driver")?;
        let mut out_dataset = driver
            .create_vector_only(&self.output_path)
            .with_context(|| format!("failed to create shapefile {:?}", self.output_path))?;

        let layer_name = self
            .output_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("watershed")
            .to_string();

        let mut out_layer = out_dataset
            .create_layer(LayerOptions {
                name: &layer_name,
                srs,
                ..Default::default()
            })
            .context("failed to create the output layer")?;

        let defs_ref: Vec<(&str, u32)> = field_defs
            .iter()
            .map(|(name, ty)| (name.as_str(), *ty))
            .collect();
        out_layer
            .create_defn_fields(&defs_ref)
            .context("failed to create output field definitions")?;

        for feature in features {
            let names_ref: Vec<&str> = feature.field_names.iter().map(String::as_str).collect();
            out_layer
                .create_feature_fields(feature.geometry, &names_ref, &feature.field_values)
                .context("failed to write a selected feature")?;
        }

        Ok(())
    }
}

/// All files making up a shapefile at `path`.
pub fn shapefile_components(path: &Path) -> [PathBuf; 4] {
    [
        path.with_extension("shp"),
        path.with_extension("shx"),
        path.with_extension("dbf"),
        path.with_extension("prj"),
    ]
}

fn remove_stale_shapefile(path: &Path) -> Result<()> {
    for component in shapefile_components(path) {
        if component.exists() {
            std::fs::remove_file(&component)
                .with_context(|| format!("failed to remove existing file {:?}", component))?;
        }
    }
    Ok(())
}
