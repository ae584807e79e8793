use gdal::errors::GdalError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for the watershed land-use pipeline.
///
/// Every variant is fatal: a stage that fails stops the run, and no
/// downstream stage sees a stale or empty selection.
#[derive(Debug, Error)]
pub enum Error {
    /// The input dataset is missing or unreadable. Raised before any
    /// output is written.
    #[error("input dataset does not exist or cannot be opened: {path:?}")]
    DatasetNotFound {
        path: PathBuf,
        #[source]
        source: GdalError,
    },

    /// The identifying attribute field is not part of the layer schema.
    #[error("field {field:?} not found in the watershed dataset; available fields: {}", available.join(", "))]
    FieldNotFound {
        field: String,
        available: Vec<String>,
    },

    /// The attribute query could not be executed against the layer.
    #[error("selection query {query:?} failed")]
    SelectionQuery {
        query: String,
        #[source]
        source: GdalError,
    },

    /// The identifier matched no feature in the watershed dataset.
    #[error("no watershed matches identifier {id:?}")]
    NoMatchingWatershed { id: String },

    /// The identifier matched more than one feature while the configured
    /// policy rejects ambiguous selections.
    #[error("identifier {id:?} matches {count} watershed features; ambiguous selections are rejected by configuration")]
    AmbiguousWatershed { id: String, count: usize },

    /// The exclusive raster-analysis lease is already held.
    #[error("the raster analysis lease is already held by another operation")]
    AnalysisLeaseHeld,

    /// The clipped raster contains no classified cells, so percentages
    /// cannot be computed.
    #[error("no classified pixels inside the clipped watershed")]
    NoClassifiedPixels,

    /// A destination path exists and the configuration forbids overwriting.
    #[error("output already exists and overwrite is disabled: {path:?}")]
    OutputExists { path: PathBuf },
}
