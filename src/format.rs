use std::fmt;

/// Codec the engine reads or writes a dataset with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    GeoJson,
    Shapefile,
    Csv,
}

/// Wire names accepted for each driver, matched case-insensitively.
/// Format: `(wire_name, driver)`
const FORMAT_ALIASES: &[(&str, Driver)] = &[
    ("geojson", Driver::GeoJson),
    ("json", Driver::GeoJson),
    ("shp", Driver::Shapefile),
    ("shapefile", Driver::Shapefile),
    ("esri shapefile", Driver::Shapefile),
    ("csv", Driver::Csv),
];

/// Formats clients may name that this service deliberately does not handle.
/// Format: `(wire_name, reason)`
const UNSUPPORTED_FORMATS: &[(&str, &str)] = &[
    ("parquet", "Parquet output needs an Arrow stack this service does not carry"),
    ("geoparquet", "GeoParquet needs an Arrow stack this service does not carry"),
    ("geodatabase", "Esri File Geodatabase needs GDAL"),
    ("filegdb", "Esri File Geodatabase needs GDAL"),
    ("gdb", "Esri File Geodatabase needs GDAL"),
];

impl Driver {
    /// Resolve a format name from a request to a driver.
    pub fn from_wire_name(name: &str) -> Option<Self> {
        let name = name.trim();
        FORMAT_ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, driver)| *driver)
    }

    /// Like [`Driver::from_wire_name`], with a message saying why a name
    /// does not resolve.
    pub fn resolve(name: &str) -> Result<Self, String> {
        if let Some(driver) = Self::from_wire_name(name) {
            return Ok(driver);
        }
        let trimmed = name.trim();
        match UNSUPPORTED_FORMATS
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(trimmed))
        {
            Some((_, reason)) => Err(format!("'{trimmed}' is not supported: {reason}")),
            None => Err(format!("unknown format '{name}'")),
        }
    }

    /// Extension of the primary file, also used to name the output artifact.
    pub fn extension(self) -> &'static str {
        match self {
            Driver::GeoJson => "geojson",
            Driver::Shapefile => "shp",
            Driver::Csv => "csv",
        }
    }

    /// Extra files that travel with the primary file.
    pub fn sidecar_extensions(self) -> &'static [&'static str] {
        match self {
            Driver::Shapefile => &["shx", "dbf"],
            Driver::Csv => &["csvt"],
            Driver::GeoJson => &[],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Driver::GeoJson => "GeoJSON",
            Driver::Shapefile => "ESRI Shapefile",
            Driver::Csv => "CSV",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
