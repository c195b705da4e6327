use std::fmt;

/// A coordinate reference system identifier of the form `AUTHORITY:CODE`,
/// e.g. `EPSG:4326`.
///
/// The request text is kept as sent for [`CrsMatch::Exact`]; surrounding
/// whitespace is dropped from the identifier handed to proj.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrsId {
    raw: String,
    id: String,
}

impl CrsId {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let (authority, code) = trimmed
            .split_once(':')
            .ok_or_else(|| format!("'{raw}' is not an AUTHORITY:CODE identifier"))?;

        let authority_ok = authority
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && authority
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        let code_ok = !code.is_empty()
            && code
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

        if !authority_ok || !code_ok {
            return Err(format!("'{raw}' is not an AUTHORITY:CODE identifier"));
        }
        Ok(Self {
            raw: raw.to_owned(),
            id: trimmed.to_owned(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The identifier exactly as it appeared in the request.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for CrsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// How the input and output CRS identifiers are compared when deciding
/// whether to reproject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum CrsMatch {
    /// Literal string equality: `EPSG:4326` and `epsg:4326` differ.
    #[default]
    Exact,
    /// Trimmed and case-insensitive: `EPSG:4326` and ` epsg:4326` are the
    /// same CRS.
    Normalized,
}

impl CrsMatch {
    pub fn same(self, a: &CrsId, b: &CrsId) -> bool {
        match self {
            CrsMatch::Exact => a.raw() == b.raw(),
            CrsMatch::Normalized => a.as_str().eq_ignore_ascii_case(b.as_str()),
        }
    }
}
