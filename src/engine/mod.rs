//! Geospatial engine: read, reproject, simplify and write vector datasets.
//!
//! The [`GeoEngine`] trait is the seam the converter talks to. All methods are
//! blocking and are meant to run on the blocking thread pool.

mod csv_file;
mod geojson_file;
mod reproject;
mod shp_file;
mod simplify;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::crs::CrsId;
use crate::dataset::FeatureSet;
use crate::format::Driver;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CRS definition error: {0}")]
    ProjCreate(#[from] proj::ProjCreateError),

    #[error("projection error: {0}")]
    Proj(#[from] proj::ProjError),

    /// The data is readable but cannot be represented as requested.
    #[error("{0}")]
    Geometry(String),
}

pub trait GeoEngine: Send + Sync {
    /// Read the file at `path` with `driver`. Sidecar files, when the driver
    /// has them, are expected next to `path` with the same stem.
    fn parse(&self, path: &Path, driver: Driver) -> Result<FeatureSet, EngineError>;

    fn reproject(
        &self,
        dataset: FeatureSet,
        from: &CrsId,
        to: &CrsId,
    ) -> Result<FeatureSet, EngineError>;

    fn simplify(&self, dataset: FeatureSet, tolerance: f64) -> Result<FeatureSet, EngineError>;

    /// Write `dataset` into `dir` as `{stem}.{ext}`. Returns every file
    /// written, primary file first.
    fn serialize(
        &self,
        dataset: &FeatureSet,
        driver: Driver,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, EngineError>;
}

/// Engine backed by geo, geojson, proj, shapefile and csv.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorEngine;

impl VectorEngine {
    pub fn new() -> Self {
        Self
    }
}

impl GeoEngine for VectorEngine {
    fn parse(&self, path: &Path, driver: Driver) -> Result<FeatureSet, EngineError> {
        debug!(path = %path.display(), %driver, "parsing dataset");
        let dataset = match driver {
            Driver::GeoJson => geojson_file::read(path)?,
            Driver::Shapefile => shp_file::read(path)?,
            Driver::Csv => csv_file::read(path)?,
        };
        info!(features = dataset.len(), extent = ?dataset.extent(), "parsed dataset");
        Ok(dataset)
    }

    fn reproject(
        &self,
        dataset: FeatureSet,
        from: &CrsId,
        to: &CrsId,
    ) -> Result<FeatureSet, EngineError> {
        let dataset = reproject::reproject(dataset, from, to)?;
        info!(%from, %to, extent = ?dataset.extent(), "reprojected dataset");
        Ok(dataset)
    }

    fn simplify(&self, dataset: FeatureSet, tolerance: f64) -> Result<FeatureSet, EngineError> {
        let before = dataset.vertex_count();
        let dataset = simplify::simplify(dataset, tolerance)?;
        info!(tolerance, before, after = dataset.vertex_count(), "simplified geometries");
        Ok(dataset)
    }

    fn serialize(
        &self,
        dataset: &FeatureSet,
        driver: Driver,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, EngineError> {
        let primary = dir.join(format!("{stem}.{}", driver.extension()));
        match driver {
            Driver::GeoJson => geojson_file::write(dataset, &primary)?,
            Driver::Shapefile => shp_file::write(dataset, &primary)?,
            Driver::Csv => csv_file::write(dataset, &primary)?,
        }

        let mut files = vec![primary];
        files.extend(
            driver
                .sidecar_extensions()
                .iter()
                .map(|ext| dir.join(format!("{stem}.{ext}")))
                .filter(|path| path.exists()),
        );
        info!(%driver, files = files.len(), features = dataset.len(), "wrote dataset");
        Ok(files)
    }
}
