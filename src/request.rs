//! Request and response bodies of the conversion endpoint.

use serde::{Deserialize, Serialize};

use crate::crs::CrsId;
use crate::error::{ConversionError, ErrorKind};
use crate::format::Driver;

/// Body of `POST /`. All fields are required.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    pub file_id: String,
    pub file_name: String,
    pub input_format: String,
    pub output_format: String,
    #[serde(rename = "inputCRS")]
    pub input_crs: String,
    #[serde(rename = "outputCRS")]
    pub output_crs: String,
    pub simplification: f64,
}

/// A validated request with every name resolved.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub file_id: String,
    pub source_key: String,
    pub input: Driver,
    pub output: Driver,
    pub input_crs: CrsId,
    pub output_crs: CrsId,
    /// `None` when no simplification was asked for.
    pub tolerance: Option<f64>,
}

impl ConversionRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, ConversionError> {
        serde_json::from_slice(body).map_err(|e| ConversionError::BadRequest(e.to_string()))
    }

    pub fn validate(&self) -> Result<ConversionJob, ConversionError> {
        let file_id = self.file_id.trim();
        if file_id.is_empty() {
            return Err(bad("fileId must not be empty"));
        }
        if file_id.contains(['/', '\\']) || file_id.contains("..") || file_id.chars().any(char::is_control) {
            return Err(bad(format!("fileId '{file_id}' cannot be used as an object name")));
        }
        if self.file_name.trim().is_empty() {
            return Err(bad("fileName must not be empty"));
        }

        let input = Driver::resolve(&self.input_format).map_err(|e| bad(format!("inputFormat: {e}")))?;
        let output = Driver::resolve(&self.output_format).map_err(|e| bad(format!("outputFormat: {e}")))?;

        let input_crs = CrsId::parse(&self.input_crs).map_err(|e| bad(format!("inputCRS: {e}")))?;
        let output_crs = CrsId::parse(&self.output_crs).map_err(|e| bad(format!("outputCRS: {e}")))?;

        if !self.simplification.is_finite() || self.simplification < 0.0 {
            return Err(bad("simplification must be a finite number >= 0"));
        }

        Ok(ConversionJob {
            file_id: file_id.to_owned(),
            source_key: self.file_name.trim().to_owned(),
            input,
            output,
            input_crs,
            output_crs,
            tolerance: (self.simplification > 0.0).then_some(self.simplification),
        })
    }
}

impl ConversionJob {
    /// Object key of the primary output artifact, `{fileId}.{extension}`.
    pub fn output_key(&self) -> String {
        format!("{}.{}", self.file_id, self.output.extension())
    }
}

fn bad(message: impl Into<String>) -> ConversionError {
    ConversionError::BadRequest(message.into())
}

/// Body returned for every request, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ConversionResult {
    Success {
        #[serde(rename = "downloadUrl")]
        download_url: String,
    },
    Error {
        message: String,
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
    },
}

impl ConversionResult {
    pub fn success(download_url: impl Into<String>) -> Self {
        Self::Success {
            download_url: download_url.into(),
        }
    }

    pub fn error(message: impl Into<String>, error_kind: ErrorKind) -> Self {
        Self::Error {
            message: message.into(),
            error_kind,
        }
    }
}
