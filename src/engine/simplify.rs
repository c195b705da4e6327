use geo::{Geometry, GeometryCollection, LineString, Simplify};

use super::EngineError;
use crate::dataset::FeatureSet;

/// Ramer–Douglas–Peucker simplification of every line and polygon.
/// Points are left as they are.
pub fn simplify(dataset: FeatureSet, tolerance: f64) -> Result<FeatureSet, EngineError> {
    dataset.try_map_geometries(|geometry| simplify_geometry(geometry, tolerance))
}

fn simplify_geometry(geometry: Geometry<f64>, tolerance: f64) -> Result<Geometry<f64>, EngineError> {
    // geo's RDP needs at least two vertices per line and four per ring.
    if !well_formed(&geometry) {
        return Err(EngineError::Geometry(
            "cannot simplify a line with one vertex or a ring with fewer than four".to_owned(),
        ));
    }
    let simplified = match geometry {
        Geometry::LineString(line) => Geometry::LineString(line.simplify(&tolerance)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(lines.simplify(&tolerance)),
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(&tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.simplify(&tolerance)),
        Geometry::GeometryCollection(collection) => {
            let members = collection
                .0
                .into_iter()
                .map(|member| simplify_geometry(member, tolerance))
                .collect::<Result<Vec<_>, _>>()?;
            Geometry::GeometryCollection(GeometryCollection(members))
        }
        other => other,
    };
    check_degenerate(&simplified)?;
    Ok(simplified)
}

/// Empty parts are allowed; anything else needs a usable vertex count.
fn well_formed(geometry: &Geometry<f64>) -> bool {
    let line_ok = |line: &LineString<f64>| line.0.len() != 1;
    let ring_ok = |ring: &LineString<f64>| ring.0.is_empty() || ring.0.len() >= 4;

    match geometry {
        Geometry::LineString(line) => line_ok(line),
        Geometry::MultiLineString(lines) => lines.iter().all(line_ok),
        Geometry::Polygon(polygon) => {
            ring_ok(polygon.exterior()) && polygon.interiors().iter().all(ring_ok)
        }
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .all(|p| ring_ok(p.exterior()) && p.interiors().iter().all(ring_ok)),
        Geometry::GeometryCollection(collection) => collection.iter().all(well_formed),
        _ => true,
    }
}

fn check_degenerate(geometry: &Geometry<f64>) -> Result<(), EngineError> {
    if well_formed(geometry) {
        Ok(())
    } else {
        Err(EngineError::Geometry(
            "tolerance collapses a geometry below its minimum vertex count".to_owned(),
        ))
    }
}
