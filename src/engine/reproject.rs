use geo::{Coord, MapCoords};
use proj::Proj;

use super::EngineError;
use crate::crs::CrsId;
use crate::dataset::FeatureSet;

/// Transform every coordinate from `from` to `to`.
///
/// `new_known_crs` normalizes axis order, so coordinates stay (lon, lat) /
/// (easting, northing) on both sides.
pub fn reproject(dataset: FeatureSet, from: &CrsId, to: &CrsId) -> Result<FeatureSet, EngineError> {
    let proj = Proj::new_known_crs(from.as_str(), to.as_str(), None)?;
    let convert = |coord: Coord<f64>| -> Result<Coord<f64>, EngineError> {
        let (x, y) = proj.convert((coord.x, coord.y))?;
        if !x.is_finite() || !y.is_finite() {
            return Err(EngineError::Geometry(format!(
                "({}, {}) has no position in {to}",
                coord.x, coord.y
            )));
        }
        Ok(Coord { x, y })
    };
    dataset.try_map_geometries(|geometry| geometry.try_map_coords(convert))
}
