//! ESRI Shapefile reading and writing.
//!
//! A shapefile is a `.shp` geometry file with an `.shx` index and a `.dbf`
//! attribute table next to it. All shapes in one file share a single shape
//! type, so writing requires the dataset to hold one geometry family.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::{Map, Number, Value};
use shapefile::dbase::{self, FieldName, FieldValue, TableWriterBuilder};
use shapefile::{PolygonRing, Shape};
use tracing::{debug, warn};

use super::EngineError;
use crate::dataset::{Feature, FeatureSet};

/// dBase limits field names to 10 characters and fields to 254 bytes.
const MAX_FIELD_NAME: usize = 10;
const MAX_FIELD_WIDTH: usize = 254;

/// Integer columns are numeric(18,0); readers hold them as doubles, so
/// magnitudes past 2^53 would not come back intact.
const INTEGER_WIDTH: u8 = 18;
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Real columns are numeric(24,15), widened when a value needs more room.
const REAL_WIDTH: usize = 24;
const REAL_DECIMALS: u8 = 15;

/// Field added when a dataset has no attributes, since a table needs a column.
const FALLBACK_FIELD: &str = "FID";

pub fn read(path: &Path) -> Result<FeatureSet, EngineError> {
    let mut features = Vec::new();

    let dbf = path.with_extension("dbf");
    if dbf.exists() {
        let decimals = numeric_decimals(&dbf)?;
        let mut reader = shapefile::Reader::from_path(path)?;
        for result in reader.iter_shapes_and_records() {
            let (shape, record) = result?;
            features.push(Feature::new(
                shape_to_geometry(shape)?,
                record_to_properties(record, &decimals),
            ));
        }
    } else {
        warn!(path = %path.display(), "no .dbf next to shapefile; reading geometry only");
        for shape in shapefile::read_shapes(path)? {
            features.push(Feature::new(shape_to_geometry(shape)?, Map::new()));
        }
    }

    debug!("Loaded {} shapes from file", features.len());
    Ok(FeatureSet::new(features))
}

macro_rules! coords {
    ($points:expr) => {
        $points
            .iter()
            .map(|p| Coord { x: p.x, y: p.y })
            .collect::<Vec<_>>()
    };
}

macro_rules! polyline_parts {
    ($line:expr) => {
        $line
            .parts()
            .iter()
            .map(|part| LineString::new(coords!(part)))
            .collect::<Vec<_>>()
    };
}

macro_rules! polygon_rings {
    ($polygon:expr) => {
        $polygon
            .rings()
            .iter()
            .map(|ring| match ring {
                PolygonRing::Outer(points) => (true, LineString::new(coords!(points))),
                PolygonRing::Inner(points) => (false, LineString::new(coords!(points))),
            })
            .collect::<Vec<_>>()
    };
}

fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry<f64>>, EngineError> {
    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::Multipoint(mp) => multipoint(coords!(mp.points())),
        Shape::MultipointM(mp) => multipoint(coords!(mp.points())),
        Shape::MultipointZ(mp) => multipoint(coords!(mp.points())),
        Shape::Polyline(line) => lines(polyline_parts!(line)),
        Shape::PolylineM(line) => lines(polyline_parts!(line)),
        Shape::PolylineZ(line) => lines(polyline_parts!(line)),
        Shape::Polygon(polygon) => polygons(polygon_rings!(polygon)),
        Shape::PolygonM(polygon) => polygons(polygon_rings!(polygon)),
        Shape::PolygonZ(polygon) => polygons(polygon_rings!(polygon)),
        Shape::Multipatch(_) => {
            return Err(EngineError::Geometry(
                "multipatch shapes are not supported".to_owned(),
            ))
        }
    };
    Ok(Some(geometry))
}

fn multipoint(coords: Vec<Coord<f64>>) -> Geometry<f64> {
    Geometry::MultiPoint(MultiPoint::new(coords.into_iter().map(Point::from).collect()))
}

fn lines(mut parts: Vec<LineString<f64>>) -> Geometry<f64> {
    if parts.len() == 1 {
        Geometry::LineString(parts.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString::new(parts))
    }
}

/// Each outer ring starts a polygon; inner rings attach to the last outer.
fn polygons(rings: Vec<(bool, LineString<f64>)>) -> Geometry<f64> {
    let mut built: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (outer, ring) in rings {
        if !outer {
            if let Some((_, holes)) = built.last_mut() {
                holes.push(ring);
                continue;
            }
        }
        built.push((ring, Vec::new()));
    }

    let mut polygons: Vec<Polygon<f64>> = built
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect();
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

/// Decimal count of every numeric field, taken from the `.dbf` header
/// since the dbase reader keeps it private.
fn numeric_decimals(dbf: &Path) -> Result<HashMap<String, u8>, EngineError> {
    let mut file = File::open(dbf)?;
    let mut prefix = [0u8; 32];
    file.read_exact(&mut prefix)?;
    let header_len = usize::from(u16::from_le_bytes([prefix[8], prefix[9]]));
    let mut descriptors = vec![0u8; header_len.saturating_sub(prefix.len())];
    file.read_exact(&mut descriptors)?;

    let mut decimals = HashMap::new();
    for field in descriptors.chunks_exact(32) {
        if field[0] == 0x0D {
            break;
        }
        let name_end = field[..11].iter().position(|b| *b == 0).unwrap_or(11);
        if matches!(field[11], b'N' | b'F') {
            let name = String::from_utf8_lossy(&field[..name_end]).into_owned();
            decimals.insert(name, field[17]);
        }
    }
    Ok(decimals)
}

fn record_to_properties(record: dbase::Record, decimals: &HashMap<String, u8>) -> Map<String, Value> {
    HashMap::<String, FieldValue>::from(record)
        .into_iter()
        .map(|(name, value)| {
            let scale = decimals.get(&name).copied();
            (name, field_to_value(value, scale))
        })
        .collect()
}

fn field_to_value(value: FieldValue, decimals: Option<u8>) -> Value {
    match value {
        FieldValue::Character(Some(s)) => Value::String(s.trim_end().to_owned()),
        FieldValue::Memo(s) => Value::String(s),
        FieldValue::Numeric(Some(n)) => numeric(n, decimals),
        FieldValue::Float(Some(n)) => numeric(f64::from(n), decimals),
        FieldValue::Double(n) | FieldValue::Currency(n) => real(n),
        FieldValue::Integer(n) => Value::from(n),
        FieldValue::Logical(Some(b)) => Value::Bool(b),
        FieldValue::Date(Some(d)) => {
            Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
        }
        _ => Value::Null,
    }
}

/// A numeric field declared without decimals holds integers; any other
/// numeric field holds reals, whole or not.
fn numeric(n: f64, decimals: Option<u8>) -> Value {
    if decimals == Some(0) && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        Value::from(n as i64)
    } else {
        real(n)
    }
}

fn real(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldKind {
    Integer,
    Real(usize),
    Logical,
    Character(u8),
}

#[derive(Debug)]
struct Column {
    key: String,
    name: String,
    kind: FieldKind,
}

fn columns(dataset: &FeatureSet) -> Result<Vec<Column>, EngineError> {
    let mut used = HashSet::new();
    let mut columns = Vec::new();

    for key in dataset.attribute_names() {
        let name: String = key.chars().take(MAX_FIELD_NAME).collect();
        if !used.insert(name.to_ascii_uppercase()) {
            return Err(EngineError::Geometry(format!(
                "attribute '{key}' collides with another attribute when shortened to '{name}'"
            )));
        }
        let kind = infer_kind(present(dataset, &key));
        match kind {
            FieldKind::Integer => {
                let inexact = present(dataset, &key).find(|v| v.as_f64().map_or(true, |n| n.abs() > MAX_EXACT_INTEGER));
                if let Some(n) = inexact {
                    return Err(EngineError::Geometry(format!(
                        "attribute '{key}' holds {n}, which a dBase numeric field cannot store exactly"
                    )));
                }
            }
            FieldKind::Real(width) if width > MAX_FIELD_WIDTH => {
                return Err(EngineError::Geometry(format!(
                    "attribute '{key}' needs a {width} character numeric field; dBase allows {MAX_FIELD_WIDTH}"
                )));
            }
            _ => {}
        }
        columns.push(Column { key, name, kind });
    }
    Ok(columns)
}

fn present<'a>(dataset: &'a FeatureSet, key: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    dataset
        .features
        .iter()
        .filter_map(move |f| f.properties.get(key))
        .filter(|v| !v.is_null())
}

fn infer_kind<'a>(values: impl Iterator<Item = &'a Value>) -> FieldKind {
    let mut any = false;
    let mut all_integer = true;
    let mut all_number = true;
    let mut all_bool = true;
    let mut width = 1;
    let mut real_width = REAL_WIDTH;

    for value in values {
        any = true;
        match value {
            Value::Number(n) => {
                all_bool = false;
                if !(n.is_i64() || n.is_u64()) {
                    all_integer = false;
                }
                if let Some(f) = n.as_f64() {
                    real_width = real_width.max(real_text(f).len());
                }
            }
            Value::Bool(_) => {
                all_integer = false;
                all_number = false;
            }
            _ => {
                all_integer = false;
                all_number = false;
                all_bool = false;
            }
        }
        width = width.max(text(value).len());
    }

    if !any {
        FieldKind::Character(1)
    } else if all_integer {
        FieldKind::Integer
    } else if all_number {
        FieldKind::Real(real_width)
    } else if all_bool {
        FieldKind::Logical
    } else {
        FieldKind::Character(width.min(MAX_FIELD_WIDTH) as u8)
    }
}

/// How dbase prints a value into a real column.
fn real_text(n: f64) -> String {
    format!("{n:.prec$}", prec = usize::from(REAL_DECIMALS))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

fn to_field(kind: FieldKind, value: Option<&Value>) -> FieldValue {
    let value = value.filter(|v| !v.is_null());
    match kind {
        FieldKind::Integer | FieldKind::Real(_) => FieldValue::Numeric(value.and_then(Value::as_f64)),
        FieldKind::Logical => FieldValue::Logical(value.and_then(Value::as_bool)),
        FieldKind::Character(width) => {
            FieldValue::Character(value.map(|v| truncate(text(v), usize::from(width))))
        }
    }
}

fn field_name(name: &str) -> Result<FieldName, EngineError> {
    FieldName::try_from(name)
        .map_err(|_| EngineError::Geometry(format!("'{name}' is not a valid dBase field name")))
}

fn table_builder(columns: &[Column]) -> Result<TableWriterBuilder, EngineError> {
    let mut table = TableWriterBuilder::new();
    if columns.is_empty() {
        return Ok(table.add_numeric_field(field_name(FALLBACK_FIELD)?, 10, 0));
    }
    for column in columns {
        let name = field_name(&column.name)?;
        table = match column.kind {
            FieldKind::Integer => table.add_numeric_field(name, INTEGER_WIDTH, 0),
            FieldKind::Real(width) => {
                let width = u8::try_from(width).map_err(|_| {
                    EngineError::Geometry(format!("field '{}' is too wide", column.name))
                })?;
                table.add_numeric_field(name, width, REAL_DECIMALS)
            }
            FieldKind::Logical => table.add_logical_field(name),
            FieldKind::Character(width) => table.add_character_field(name, width),
        };
    }
    Ok(table)
}

fn records(dataset: &FeatureSet, columns: &[Column]) -> Vec<dbase::Record> {
    dataset
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let mut record = dbase::Record::default();
            if columns.is_empty() {
                record.insert(FALLBACK_FIELD.to_owned(), FieldValue::Numeric(Some(index as f64)));
            }
            for column in columns {
                record.insert(
                    column.name.clone(),
                    to_field(column.kind, feature.properties.get(&column.key)),
                );
            }
            record
        })
        .collect()
}

/// The typed shapes for one file; a shapefile holds a single shape type.
/// `None` marks a feature without geometry.
enum Shapes {
    Points(Vec<Option<shapefile::Point>>),
    Multipoints(Vec<Option<shapefile::Multipoint>>),
    Polylines(Vec<Option<shapefile::Polyline>>),
    Polygons(Vec<Option<shapefile::Polygon>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Family {
    Point,
    MultiPoint,
    Line,
    Area,
}

fn family(geometry: &Geometry<f64>) -> Result<Family, EngineError> {
    match geometry {
        Geometry::Point(_) => Ok(Family::Point),
        Geometry::MultiPoint(_) => Ok(Family::MultiPoint),
        Geometry::Line(_) | Geometry::LineString(_) | Geometry::MultiLineString(_) => Ok(Family::Line),
        Geometry::Polygon(_)
        | Geometry::MultiPolygon(_)
        | Geometry::Rect(_)
        | Geometry::Triangle(_) => Ok(Family::Area),
        Geometry::GeometryCollection(_) => Err(EngineError::Geometry(
            "geometry collections cannot be stored in a shapefile".to_owned(),
        )),
    }
}

fn shp_point(c: Coord<f64>) -> shapefile::Point {
    shapefile::Point::new(c.x, c.y)
}

fn shp_part(line: &LineString<f64>) -> Result<Vec<shapefile::Point>, EngineError> {
    if line.0.len() < 2 {
        return Err(EngineError::Geometry(
            "line parts need at least two vertices".to_owned(),
        ));
    }
    Ok(line.0.iter().copied().map(shp_point).collect())
}

fn shp_ring(ring: &LineString<f64>) -> Result<Vec<shapefile::Point>, EngineError> {
    if ring.0.len() < 4 {
        return Err(EngineError::Geometry(
            "polygon rings need at least four vertices".to_owned(),
        ));
    }
    Ok(ring.0.iter().copied().map(shp_point).collect())
}

fn polygon_rings(polygon: &Polygon<f64>) -> Result<Vec<PolygonRing<shapefile::Point>>, EngineError> {
    let mut rings = vec![PolygonRing::Outer(shp_ring(polygon.exterior())?)];
    for hole in polygon.interiors() {
        rings.push(PolygonRing::Inner(shp_ring(hole)?));
    }
    Ok(rings)
}

fn to_shapes(dataset: &FeatureSet) -> Result<Shapes, EngineError> {
    let mut families = HashSet::new();
    for geometry in dataset.geometries() {
        families.insert(family(geometry)?);
    }

    let geometries = dataset.features.iter().map(|f| f.geometry.as_ref());
    let only = |allowed: &[Family]| families.iter().all(|f| allowed.contains(f));

    if only(&[Family::Point]) {
        let points = geometries
            .map(|g| match g {
                Some(Geometry::Point(p)) => Some(shp_point(p.0)),
                _ => None,
            })
            .collect();
        Ok(Shapes::Points(points))
    } else if only(&[Family::Point, Family::MultiPoint]) {
        let multipoints = geometries
            .map(|g| {
                g.map(|g| {
                    let points = match g {
                        Geometry::Point(p) => vec![shp_point(p.0)],
                        Geometry::MultiPoint(mp) => mp.iter().map(|p| shp_point(p.0)).collect(),
                        _ => Vec::new(),
                    };
                    shapefile::Multipoint::new(points)
                })
            })
            .collect();
        Ok(Shapes::Multipoints(multipoints))
    } else if only(&[Family::Line]) {
        let polylines = geometries
            .map(|g| {
                g.map(|g| -> Result<shapefile::Polyline, EngineError> {
                    let parts = match g {
                        Geometry::Line(line) => vec![shp_part(&LineString::from(*line))?],
                        Geometry::LineString(line) => vec![shp_part(line)?],
                        Geometry::MultiLineString(lines) => {
                            lines.iter().map(shp_part).collect::<Result<Vec<_>, _>>()?
                        }
                        _ => Vec::new(),
                    };
                    Ok(shapefile::Polyline::with_parts(parts))
                })
                .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shapes::Polylines(polylines))
    } else if only(&[Family::Area]) {
        let polygons = geometries
            .map(|g| {
                g.map(|g| -> Result<shapefile::Polygon, EngineError> {
                    let rings = match g {
                        Geometry::Polygon(polygon) => polygon_rings(polygon)?,
                        Geometry::MultiPolygon(polygons) => {
                            let mut rings = Vec::new();
                            for polygon in polygons {
                                rings.extend(polygon_rings(polygon)?);
                            }
                            rings
                        }
                        Geometry::Rect(rect) => polygon_rings(&rect.to_polygon())?,
                        Geometry::Triangle(triangle) => polygon_rings(&triangle.to_polygon())?,
                        _ => Vec::new(),
                    };
                    Ok(shapefile::Polygon::with_rings(rings))
                })
                .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Shapes::Polygons(polygons))
    } else {
        Err(EngineError::Geometry(
            "a shapefile holds one geometry type; the dataset mixes points, lines and polygons"
                .to_owned(),
        ))
    }
}

/// The shapefile writer only emits shapes of the file's own type, so a
/// feature without geometry is written as a copy of another shape and
/// turned into a null record afterwards by `null_out_records`.
macro_rules! write_shapes {
    ($path:expr, $table:expr, $shapes:expr, $records:expr, $fallback:expr) => {{
        let stand_in = match $shapes.iter().flatten().next().cloned().or($fallback) {
            Some(shape) => shape,
            None => {
                return Err(EngineError::Geometry(
                    "no shape to hold the place of a null geometry".to_owned(),
                ))
            }
        };
        let mut writer = shapefile::Writer::from_path($path, $table)?;
        for (shape, record) in $shapes.iter().zip($records.iter()) {
            writer.write_shape_and_record(shape.as_ref().unwrap_or(&stand_in), record)?;
        }
    }};
}

pub fn write(dataset: &FeatureSet, path: &Path) -> Result<(), EngineError> {
    let shapes = to_shapes(dataset)?;
    let columns = columns(dataset)?;
    let table = table_builder(&columns)?;
    let records = records(dataset, &columns);

    match shapes {
        Shapes::Points(shapes) => {
            write_shapes!(path, table, shapes, records, Some(shapefile::Point::default()))
        }
        Shapes::Multipoints(shapes) => write_shapes!(path, table, shapes, records, None),
        Shapes::Polylines(shapes) => write_shapes!(path, table, shapes, records, None),
        Shapes::Polygons(shapes) => write_shapes!(path, table, shapes, records, None),
    }

    let nulls: HashSet<usize> = dataset
        .features
        .iter()
        .enumerate()
        .filter(|(_, f)| f.geometry.is_none())
        .map(|(index, _)| index)
        .collect();
    null_out_records(path, &nulls)
}

const FILE_HEADER_LEN: usize = 100;
const FILE_LENGTH_AT: usize = 24;
/// Content of a null record: shape type 0, little endian.
const NULL_SHAPE: [u8; 4] = [0; 4];

/// Replace the listed records of a written `.shp` with null shapes and
/// rebuild the `.shx` offsets. Lengths and offsets count 16-bit words.
fn null_out_records(shp_path: &Path, nulls: &HashSet<usize>) -> Result<(), EngineError> {
    if nulls.is_empty() {
        return Ok(());
    }
    let shx_path = shp_path.with_extension("shx");
    let mut source = Bytes::from(std::fs::read(shp_path)?);
    let index_header = std::fs::read(&shx_path)?;
    if source.len() < FILE_HEADER_LEN || index_header.len() < FILE_HEADER_LEN {
        return Err(truncated());
    }

    let mut shp = BytesMut::from(&source.split_to(FILE_HEADER_LEN)[..]);
    let mut shx = BytesMut::from(&index_header[..FILE_HEADER_LEN]);
    let mut index = 0;
    while source.has_remaining() {
        if source.remaining() < 8 {
            return Err(truncated());
        }
        let number = source.get_i32();
        let words = source.get_i32();
        let len = usize::try_from(words).map_err(|_| truncated())? * 2;
        if source.remaining() < len {
            return Err(truncated());
        }
        let content = source.split_to(len);
        let (words, content): (i32, &[u8]) = if nulls.contains(&index) {
            (2, &NULL_SHAPE[..])
        } else {
            (words, &content[..])
        };

        shx.put_i32(words_of(shp.len())?);
        shx.put_i32(words);
        shp.put_i32(number);
        shp.put_i32(words);
        shp.put_slice(content);
        index += 1;
    }

    let length = words_of(shp.len())?;
    shp[FILE_LENGTH_AT..FILE_LENGTH_AT + 4].copy_from_slice(&length.to_be_bytes());
    std::fs::write(shp_path, &shp)?;
    std::fs::write(&shx_path, &shx)?;
    debug!(nulls = nulls.len(), "wrote null shape records");
    Ok(())
}

fn words_of(bytes: usize) -> Result<i32, EngineError> {
    i32::try_from(bytes / 2)
        .map_err(|_| EngineError::Geometry("shapefile exceeds the 2 GB format limit".to_owned()))
}

fn truncated() -> EngineError {
    EngineError::Geometry("written shapefile is truncated".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon};
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn points_and_attributes_survive_a_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.shp");
        let set = FeatureSet::new(vec![
            Feature::new(Some(point!(x: 10.0, y: 59.9).into()), props(json!({"name": "Oslo", "pop": 709000, "capital": true}))),
            Feature::new(Some(point!(x: 5.3, y: 60.4).into()), props(json!({"name": "Bergen", "pop": 286000, "capital": false}))),
        ]);

        write(&set, &path).unwrap();
        assert!(path.with_extension("shx").exists());
        assert!(path.with_extension("dbf").exists());

        let back = read(&path).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn polygons_with_holes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.shp");
        let exterior = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)];
        let hole = line_string![(x: 2.0, y: 2.0), (x: 2.0, y: 4.0), (x: 4.0, y: 4.0), (x: 4.0, y: 2.0), (x: 2.0, y: 2.0)];
        let set = FeatureSet::new(vec![Feature::new(
            Some(Polygon::new(exterior, vec![hole]).into()),
            props(json!({"id": 1})),
        )]);

        write(&set, &path).unwrap();
        let back = read(&path).unwrap();
        assert_eq!(back.len(), 1);
        match back.features[0].geometry.as_ref().unwrap() {
            Geometry::Polygon(p) => {
                assert_eq!(p.interiors().len(), 1);
                assert_eq!(p.exterior().0.len(), 5);
            }
            other => panic!("expected polygon, got {other:?}"),
        }
    }

    #[test]
    fn mixed_families_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let set = FeatureSet::new(vec![
            Feature::new(Some(point!(x: 0.0, y: 0.0).into()), Map::new()),
            Feature::new(
                Some(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)].into()),
                Map::new(),
            ),
        ]);
        let err = write(&set, &dir.path().join("mixed.shp")).unwrap_err();
        assert!(err.to_string().contains("one geometry type"));
    }

    #[test]
    fn long_attribute_names_that_collide_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 0.0, y: 0.0).into()),
            props(json!({"population_2020": 1, "population_2021": 2})),
        )]);
        assert!(write(&set, &dir.path().join("p.shp")).is_err());
    }

    #[test]
    fn whole_reals_stay_reals_and_integers_stay_integers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratios.shp");
        let set = FeatureSet::new(vec![
            Feature::new(Some(point!(x: 0.0, y: 0.0).into()), props(json!({"ratio": 3.0, "id": -9_007_199_254_740_991_i64}))),
            Feature::new(Some(point!(x: 1.0, y: 1.0).into()), props(json!({"ratio": 2.5, "id": 7}))),
        ]);

        write(&set, &path).unwrap();
        let back = read(&path).unwrap();

        assert_eq!(back.features[0].properties["ratio"], json!(3.0));
        assert!(back.features[0].properties["ratio"].is_f64());
        assert_eq!(back.features[0].properties["id"], json!(-9_007_199_254_740_991_i64));
        assert_eq!(back.features[1].properties["id"], json!(7));
        assert_eq!(back, set);
    }

    #[test]
    fn integers_beyond_double_precision_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 0.0, y: 0.0).into()),
            props(json!({"big": -1_234_567_890_123_456_789_i64})),
        )]);
        let err = write(&set, &dir.path().join("big.shp")).unwrap_err();
        assert!(err.to_string().contains("'big'"), "{err}");
    }

    #[test]
    fn real_columns_widen_for_large_values() {
        assert_eq!(infer_kind([json!(1e20), json!(0.5)].iter()), FieldKind::Real(37));
    }

    #[test]
    fn features_without_geometry_become_null_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparse.shp");
        let set = FeatureSet::new(vec![
            Feature::new(Some(point!(x: 10.0, y: 59.9).into()), props(json!({"name": "Oslo"}))),
            Feature::new(None, props(json!({"name": "unplaced"}))),
            Feature::new(Some(point!(x: 5.3, y: 60.4).into()), props(json!({"name": "Bergen"}))),
        ]);

        write(&set, &path).unwrap();
        let back = read(&path).unwrap();
        assert_eq!(back, set);

        let lines = FeatureSet::new(vec![
            Feature::new(None, props(json!({"id": 1}))),
            Feature::new(Some(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into()), props(json!({"id": 2}))),
        ]);
        let path = dir.path().join("lines.shp");
        write(&lines, &path).unwrap();
        assert_eq!(read(&path).unwrap(), lines);
    }

    #[test]
    fn all_null_geometries_still_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.shp");
        let set = FeatureSet::new(vec![Feature::new(None, props(json!({"id": 1})))]);

        write(&set, &path).unwrap();
        assert_eq!(read(&path).unwrap(), set);
    }

    #[test]
    fn infers_field_kinds() {
        assert_eq!(infer_kind([json!(1), json!(2)].iter()), FieldKind::Integer);
        assert_eq!(infer_kind([json!(1), json!(2.5)].iter()), FieldKind::Real(REAL_WIDTH));
        assert_eq!(infer_kind([json!(true)].iter()), FieldKind::Logical);
        assert_eq!(infer_kind([json!("abc"), json!(1)].iter()), FieldKind::Character(3));
        assert_eq!(infer_kind(std::iter::empty()), FieldKind::Character(1));
    }
}
