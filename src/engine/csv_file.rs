//! Delimited text with a WKT or x/y geometry.
//!
//! Column types travel in a one-line `.csvt` file next to the `.csv`, using
//! GDAL's type names. Without it, attribute cells are typed by inference.

use std::path::Path;

use csv::StringRecord;
use geo::{Geometry, Point};
use serde_json::{Map, Value};
use tracing::warn;
use wkt::{ToWkt, TryFromWkt};

use super::EngineError;
use crate::dataset::{Feature, FeatureSet};

const WKT_COLUMNS: &[&str] = &["wkt", "geometry", "geom", "the_geom"];
const POINT_COLUMNS: &[(&str, &str)] = &[("x", "y"), ("lon", "lat"), ("longitude", "latitude")];

/// Column types as spelled in a `.csvt` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Wkt,
    String,
    Json,
    Integer,
    Real,
    Boolean,
}

impl ColumnType {
    fn csvt_name(self) -> &'static str {
        match self {
            ColumnType::Wkt => "WKT",
            ColumnType::String => "String",
            ColumnType::Json => "String(JSON)",
            ColumnType::Integer => "Integer64",
            ColumnType::Real => "Real",
            ColumnType::Boolean => "Integer(Boolean)",
        }
    }

    /// Parse a `.csvt` entry such as `Integer64`, `Real(10.2)` or
    /// `Integer(Boolean)`. Unknown names fall back to inference.
    fn from_csvt(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        let (base, detail) = match entry.split_once('(') {
            Some((base, rest)) => (base, rest.trim_end_matches(')')),
            None => (entry, ""),
        };
        let kind = match base.to_ascii_lowercase().as_str() {
            "wkt" => ColumnType::Wkt,
            "integer" | "integer64" if detail.eq_ignore_ascii_case("boolean") => ColumnType::Boolean,
            "integer" | "integer64" => ColumnType::Integer,
            "real" | "coordx" | "coordy" => ColumnType::Real,
            "string" if detail.eq_ignore_ascii_case("json") => ColumnType::Json,
            "string" | "date" | "time" | "datetime" => ColumnType::String,
            _ => return None,
        };
        Some(kind)
    }

    /// Narrowest type that holds every non-null value of a column.
    fn of_values<'a>(values: impl Iterator<Item = &'a Value>) -> Self {
        let mut kind = None;
        for value in values {
            let this = match value {
                Value::Null => continue,
                Value::Bool(_) => ColumnType::Boolean,
                Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
                Value::Number(_) => ColumnType::Real,
                Value::String(_) => ColumnType::String,
                Value::Array(_) | Value::Object(_) => ColumnType::Json,
            };
            kind = Some(match (kind, this) {
                (None, this) => this,
                (Some(a), b) if a == b => a,
                (Some(ColumnType::Integer), ColumnType::Real)
                | (Some(ColumnType::Real), ColumnType::Integer) => ColumnType::Real,
                _ => ColumnType::Json,
            });
        }
        kind.unwrap_or(ColumnType::String)
    }

    fn read(self, column: &str, cell: &str) -> Result<Value, EngineError> {
        if cell.is_empty() {
            return Ok(Value::Null);
        }
        let invalid = || {
            EngineError::Geometry(format!(
                "column '{column}': '{cell}' is not a valid {}",
                self.csvt_name()
            ))
        };
        match self {
            ColumnType::Wkt | ColumnType::String => Ok(Value::String(cell.to_owned())),
            ColumnType::Json => serde_json::from_str(cell).map_err(|_| invalid()),
            ColumnType::Integer => cell
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| cell.parse::<u64>().map(Value::from))
                .map_err(|_| invalid()),
            ColumnType::Real => real(cell).ok_or_else(invalid),
            ColumnType::Boolean => match cell.to_ascii_lowercase().as_str() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
        }
    }

    fn write(self, value: Option<&Value>) -> String {
        match (self, value) {
            (_, None | Some(Value::Null)) => String::new(),
            (ColumnType::Boolean, Some(Value::Bool(b))) => String::from(if *b { "1" } else { "0" }),
            (ColumnType::Json, Some(value)) => value.to_string(),
            (_, Some(Value::String(s))) => s.clone(),
            (_, Some(other)) => other.to_string(),
        }
    }
}

/// A real cell written without a fraction or exponent stays an integer.
fn real(cell: &str) -> Option<Value> {
    if !cell.contains(['.', 'e', 'E']) {
        if let Ok(n) = cell.parse::<i64>() {
            return Some(Value::from(n));
        }
    }
    cell.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeometryColumns {
    Wkt(usize),
    Point { x: usize, y: usize },
}

impl GeometryColumns {
    fn detect(headers: &StringRecord, types: Option<&[Option<ColumnType>]>) -> Result<Self, EngineError> {
        if let Some(index) = types.and_then(|t| t.iter().position(|t| *t == Some(ColumnType::Wkt))) {
            return Ok(Self::Wkt(index));
        }

        let find = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

        if let Some(index) = WKT_COLUMNS.iter().find_map(|name| find(*name)) {
            return Ok(Self::Wkt(index));
        }
        POINT_COLUMNS
            .iter()
            .find_map(|(x, y)| Some(Self::Point { x: find(*x)?, y: find(*y)? }))
            .ok_or_else(|| {
                EngineError::Geometry(
                    "CSV has no WKT column and no x/y, lon/lat or longitude/latitude columns"
                        .to_owned(),
                )
            })
    }

    fn is_geometry(&self, index: usize) -> bool {
        match *self {
            Self::Wkt(column) => column == index,
            Self::Point { x, y } => x == index || y == index,
        }
    }

    fn read(&self, row: usize, record: &StringRecord) -> Result<Option<Geometry<f64>>, EngineError> {
        match *self {
            Self::Wkt(column) => {
                let text = record.get(column).unwrap_or("").trim();
                if text.is_empty() {
                    return Ok(None);
                }
                Geometry::<f64>::try_from_wkt_str(text)
                    .map(Some)
                    .map_err(|e| EngineError::Geometry(format!("row {row}: invalid WKT: {e}")))
            }
            Self::Point { x, y } => {
                let (Some(x), Some(y)) = (coordinate(record.get(x)), coordinate(record.get(y))) else {
                    return Ok(None);
                };
                Ok(Some(Geometry::Point(Point::new(x?, y?))))
            }
        }
    }
}

fn coordinate(cell: Option<&str>) -> Option<Result<f64, EngineError>> {
    let cell = cell?.trim();
    if cell.is_empty() {
        return None;
    }
    Some(
        cell.parse::<f64>()
            .map_err(|_| EngineError::Geometry(format!("'{cell}' is not a coordinate"))),
    )
}

/// Attribute cells without a declared type are typed as integer, float,
/// boolean or string, in that order.
fn infer_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = cell.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = cell.parse::<f64>() {
        if n.is_finite() {
            return Value::from(n);
        }
    }
    if cell.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    Value::String(cell.to_owned())
}

/// Column types from the `.csvt` next to `path`, if there is a usable one.
fn read_types(path: &Path, columns: usize) -> Result<Option<Vec<Option<ColumnType>>>, EngineError> {
    let csvt = path.with_extension("csvt");
    if !csvt.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(&csvt)?;
    let Some(record) = reader.records().next().transpose()? else {
        return Ok(None);
    };
    if record.len() != columns {
        warn!(
            path = %csvt.display(),
            expected = columns,
            found = record.len(),
            "ignoring .csvt whose column count does not match the CSV"
        );
        return Ok(None);
    }
    Ok(Some(record.iter().map(ColumnType::from_csvt).collect()))
}

pub fn read(path: &Path) -> Result<FeatureSet, EngineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let types = read_types(path, headers.len())?;
    let layout = GeometryColumns::detect(&headers, types.as_deref())?;

    let mut features = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let geometry = layout.read(row + 1, &record)?;
        let mut properties = Map::new();
        for (index, name) in headers.iter().enumerate() {
            if layout.is_geometry(index) {
                continue;
            }
            let cell = record.get(index).unwrap_or("");
            let value = match types.as_ref().and_then(|t| t[index]) {
                Some(kind) => kind.read(name, cell)?,
                None => infer_value(cell),
            };
            properties.insert(name.to_owned(), value);
        }
        features.push(Feature::new(geometry, properties));
    }
    Ok(FeatureSet::new(features))
}

pub fn write(dataset: &FeatureSet, path: &Path) -> Result<(), EngineError> {
    let columns = dataset.attribute_names();
    if let Some(clash) = columns
        .iter()
        .find(|c| WKT_COLUMNS.iter().any(|w| w.eq_ignore_ascii_case(c.trim())))
    {
        return Err(EngineError::Geometry(format!(
            "attribute '{clash}' would be read back as the geometry column; rename it first"
        )));
    }

    let types: Vec<ColumnType> = columns
        .iter()
        .map(|c| ColumnType::of_values(dataset.features.iter().filter_map(|f| f.properties.get(c))))
        .collect();

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["WKT".to_owned()];
    header.extend(columns.iter().cloned());
    writer.write_record(&header)?;

    for feature in &dataset.features {
        let mut row = vec![feature
            .geometry
            .as_ref()
            .map(|g| g.wkt_string())
            .unwrap_or_default()];
        row.extend(
            columns
                .iter()
                .zip(&types)
                .map(|(c, kind)| kind.write(feature.properties.get(c))),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;

    let mut csvt = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_path(path.with_extension("csvt"))?;
    csvt.write_record(
        std::iter::once(ColumnType::Wkt)
            .chain(types.iter().copied())
            .map(ColumnType::csvt_name),
    )?;
    csvt.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn reads_point_columns_and_types_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.csv");
        std::fs::write(&path, "name,Lon,Lat,visits,open\nharbour,10.75,59.91,12,true\npier,5.32,60.39,,false\n").unwrap();

        let set = read(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.features[0].geometry, Some(point!(x: 10.75, y: 59.91).into()));
        assert_eq!(set.features[0].properties["visits"], json!(12));
        assert_eq!(set.features[0].properties["open"], json!(true));
        assert_eq!(set.features[1].properties["visits"], Value::Null);
        assert!(!set.features[0].properties.contains_key("Lon"));
    }

    #[test]
    fn reads_wkt_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.csv");
        std::fs::write(&path, "id,WKT\n1,\"LINESTRING (0 0, 1 1, 2 0)\"\n2,\n").unwrap();

        let set = read(&path).unwrap();
        assert!(matches!(set.features[0].geometry, Some(Geometry::LineString(_))));
        assert!(set.features[1].geometry.is_none());
    }

    #[test]
    fn missing_geometry_columns_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(read(&path).is_err());
    }

    #[test]
    fn written_rows_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 1.5, y: -2.0).into()),
            props(json!({"name": "harbour", "visits": 12})),
        )]);

        write(&set, &path).unwrap();
        assert_eq!(read(&path).unwrap(), set);
    }

    #[test]
    fn declared_types_keep_strings_that_look_like_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.csv");
        let set = FeatureSet::new(vec![
            Feature::new(
                Some(point!(x: 0.0, y: 0.0).into()),
                props(json!({"zip": "01234", "flag": "true", "ratio": 3.0, "open": true, "tags": ["a", 1]})),
            ),
            Feature::new(
                Some(point!(x: 1.0, y: 1.0).into()),
                props(json!({"zip": "0050", "flag": "no", "ratio": 2, "open": false, "tags": null})),
            ),
        ]);

        write(&set, &path).unwrap();
        let csvt = std::fs::read_to_string(path.with_extension("csvt")).unwrap();
        assert_eq!(
            csvt.trim_end(),
            r#""WKT","String","Integer(Boolean)","Real","String(JSON)","String""#
        );
        assert_eq!(read(&path).unwrap(), set);
    }

    #[test]
    fn without_csvt_cells_are_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.csv");
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 0.0, y: 0.0).into()),
            props(json!({"zip": "01234"})),
        )]);

        write(&set, &path).unwrap();
        std::fs::remove_file(path.with_extension("csvt")).unwrap();
        assert_eq!(read(&path).unwrap().features[0].properties["zip"], json!(1234));
    }

    #[test]
    fn csvt_with_wrong_column_count_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.csv");
        std::fs::write(&path, "WKT,code\n\"POINT (1 2)\",007\n").unwrap();
        std::fs::write(path.with_extension("csvt"), "\"WKT\"\n").unwrap();
        assert_eq!(read(&path).unwrap().features[0].properties["code"], json!(7));

        std::fs::write(path.with_extension("csvt"), "\"WKT\",\"String(8)\"\n").unwrap();
        assert_eq!(read(&path).unwrap().features[0].properties["code"], json!("007"));
    }

    #[test]
    fn attribute_named_like_a_geometry_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let set = FeatureSet::new(vec![Feature::new(
            Some(point!(x: 0.0, y: 0.0).into()),
            props(json!({"Geometry": "POINT (9 9)"})),
        )]);
        let err = write(&set, &dir.path().join("out.csv")).unwrap_err();
        assert!(err.to_string().contains("'Geometry'"));
    }

    #[test]
    fn column_types_widen_across_values() {
        let kind = |values: Value| ColumnType::of_values(values.as_array().unwrap().iter());
        assert_eq!(kind(json!([1, 2])), ColumnType::Integer);
        assert_eq!(kind(json!([1, 2.5, null])), ColumnType::Real);
        assert_eq!(kind(json!(["a", 1])), ColumnType::Json);
        assert_eq!(kind(json!([null])), ColumnType::String);
        assert_eq!(ColumnType::from_csvt("Integer(Boolean)"), Some(ColumnType::Boolean));
        assert_eq!(ColumnType::from_csvt("Real(10.2)"), Some(ColumnType::Real));
        assert_eq!(ColumnType::from_csvt("Blob"), None);
    }
}
