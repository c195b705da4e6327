use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use geo::Geometry;
use geojson::{Feature as GeoJsonFeature, FeatureCollection, GeoJson, Geometry as GeoJsonGeometry};
use serde_json::Map;
use tracing::debug;

use super::EngineError;
use crate::dataset::{Feature, FeatureSet};

/// Load a FeatureCollection, a single Feature or a bare Geometry.
pub fn read(path: &Path) -> Result<FeatureSet, EngineError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let features = match GeoJson::from_reader(reader)? {
        GeoJson::FeatureCollection(fc) => {
            debug!("Found {} features in file", fc.features.len());
            fc.features
                .into_iter()
                .map(from_geojson_feature)
                .collect::<Result<Vec<_>, _>>()?
        }
        GeoJson::Feature(feature) => vec![from_geojson_feature(feature)?],
        GeoJson::Geometry(geometry) => vec![Feature::new(Some(to_geo(geometry)?), Map::new())],
    };

    Ok(FeatureSet::new(features))
}

fn from_geojson_feature(feature: GeoJsonFeature) -> Result<Feature, EngineError> {
    let geometry = feature.geometry.map(to_geo).transpose()?;
    Ok(Feature::new(geometry, feature.properties.unwrap_or_default()))
}

fn to_geo(geometry: GeoJsonGeometry) -> Result<Geometry<f64>, EngineError> {
    Ok(Geometry::<f64>::try_from(geometry)?)
}

pub fn write(dataset: &FeatureSet, path: &Path) -> Result<(), EngineError> {
    let features: Vec<GeoJsonFeature> = dataset
        .features
        .iter()
        .map(|feature| GeoJsonFeature {
            bbox: None,
            geometry: feature
                .geometry
                .as_ref()
                .map(|g| GeoJsonGeometry::new(geojson::Value::from(g))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    let feature_collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &feature_collection)?;
    writer.flush()?;
    Ok(())
}
