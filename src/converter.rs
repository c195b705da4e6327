//! The conversion pipeline.
//!
//! download → parse → reproject → simplify → serialize → upload → sign.
//! Each step either succeeds or ends the request with the error kind of that
//! step. Engine work runs on the blocking pool; the staging directory lives
//! exactly as long as one call to [`Converter::convert`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::crs::CrsMatch;
use crate::engine::{EngineError, GeoEngine};
use crate::error::ConversionError;
use crate::request::{ConversionJob, ConversionRequest};
use crate::staging::Staging;
use crate::store::{ObjectStore, StoreError, TransferPolicy};

#[derive(Debug, Clone)]
pub struct ConverterSettings {
    /// Lifetime of the returned download url.
    pub signed_url_ttl: Duration,
    pub transfer: TransferPolicy,
    pub crs_match: CrsMatch,
    /// Parent directory for staging areas; system temp dir when `None`.
    pub staging_root: Option<PathBuf>,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            signed_url_ttl: Duration::from_secs(15 * 60),
            transfer: TransferPolicy::default(),
            crs_match: CrsMatch::default(),
            staging_root: None,
        }
    }
}

pub struct Converter {
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn GeoEngine>,
    settings: ConverterSettings,
}

impl Converter {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn GeoEngine>,
        settings: ConverterSettings,
    ) -> Self {
        Self {
            store,
            engine,
            settings,
        }
    }

    /// Decode and validate a JSON request body, then convert it.
    pub async fn handle(&self, body: &[u8]) -> Result<String, ConversionError> {
        let job = ConversionRequest::from_json(body)?.validate()?;
        self.convert(&job).await
    }

    /// Run the pipeline for one job and return the signed download url.
    #[instrument(skip_all, fields(file_id = %job.file_id, source = %job.source_key))]
    pub async fn convert(&self, job: &ConversionJob) -> Result<String, ConversionError> {
        let staging = Staging::open(self.settings.staging_root.clone())
            .await
            .map_err(|e| ConversionError::Internal(format!("could not create staging area: {e}")))?;

        let result = self.run(job, &staging).await;
        staging.release().await;
        result
    }

    async fn run(&self, job: &ConversionJob, staging: &Staging) -> Result<String, ConversionError> {
        let source = self.fetch_source(job, staging).await?;

        let input = job.input;
        let mut dataset = self
            .blocking(move |engine| engine.parse(&source, input))
            .await?
            .map_err(|e| ConversionError::ParseFailure(format!("{input}: {e}")))?;

        if self.settings.crs_match.same(&job.input_crs, &job.output_crs) {
            debug!(crs = %job.input_crs, "input and output CRS match; skipping reprojection");
        } else {
            let (from, to) = (job.input_crs.clone(), job.output_crs.clone());
            dataset = self
                .blocking(move |engine| engine.reproject(dataset, &from, &to))
                .await?
                .map_err(|e| {
                    ConversionError::TransformFailure(format!(
                        "{} -> {}: {e}",
                        job.input_crs, job.output_crs
                    ))
                })?;
        }

        if let Some(tolerance) = job.tolerance {
            dataset = self
                .blocking(move |engine| engine.simplify(dataset, tolerance))
                .await?
                .map_err(|e| ConversionError::SimplifyFailure(e.to_string()))?;
        }

        let output = job.output;
        let out_dir = staging.output_dir().to_path_buf();
        let stem = job.file_id.clone();
        let features = dataset.len();
        let files = self
            .blocking(move |engine| engine.serialize(&dataset, output, &out_dir, &stem))
            .await?
            .map_err(|e| ConversionError::SerializeFailure(format!("{output}: {e}")))?;

        let primary = self.publish(&files).await?;
        let url = self
            .settings
            .transfer
            .run("sign", &primary, || {
                self.store.sign(&primary, self.settings.signed_url_ttl)
            })
            .await
            .map_err(|source| ConversionError::SigningFailure {
                key: primary.clone(),
                source,
            })?;

        info!(output = %primary, features, "conversion finished");
        Ok(url)
    }

    /// Download the source object (and sidecars, if the input driver has
    /// them) into the staging area. Returns the path of the primary file.
    async fn fetch_source(
        &self,
        job: &ConversionJob,
        staging: &Staging,
    ) -> Result<PathBuf, ConversionError> {
        let key = job.source_key.as_str();
        let bytes = self.download(key).await.map_err(|source| {
            ConversionError::SourceUnavailable {
                key: key.to_owned(),
                source,
            }
        })?;
        let path = staging.input_file(job.input.extension());
        stage(&path, bytes).await?;

        for extension in job.input.sidecar_extensions() {
            let sidecar = sibling_key(key, extension);
            match self.download(&sidecar).await {
                Ok(bytes) => stage(&staging.input_file(extension), bytes).await?,
                Err(StoreError::NotFound(_)) => {
                    debug!(key = %sidecar, "optional sidecar not present");
                }
                Err(source) => {
                    return Err(ConversionError::SourceUnavailable {
                        key: sidecar,
                        source,
                    })
                }
            }
        }
        Ok(path)
    }

    async fn download(&self, key: &str) -> Result<Bytes, StoreError> {
        let store = &self.store;
        self.settings
            .transfer
            .run("download", key, || store.download(key))
            .await
    }

    /// Upload every serialized file under its file name. Returns the key of
    /// the primary file. Files uploaded before a failure stay in the bucket.
    async fn publish(&self, files: &[PathBuf]) -> Result<String, ConversionError> {
        let mut published: Vec<String> = Vec::new();
        for path in files {
            let key = object_key(path)?;
            let body = Bytes::from(tokio::fs::read(path).await.map_err(|e| {
                ConversionError::Internal(format!("could not read {}: {e}", path.display()))
            })?);

            let store = &self.store;
            self.settings
                .transfer
                .run("upload", &key, || store.upload(&key, body.clone()))
                .await
                .map_err(|source| {
                    if !published.is_empty() {
                        warn!(
                            failed = %key,
                            published = ?published,
                            "upload failed after part of the output was stored; those objects are left in the bucket"
                        );
                    }
                    ConversionError::SinkUnavailable {
                        key: key.clone(),
                        source,
                    }
                })?;
            published.push(key);
        }
        published
            .into_iter()
            .next()
            .ok_or_else(|| ConversionError::Internal("engine produced no output file".to_owned()))
    }

    async fn blocking<T, F>(&self, work: F) -> Result<Result<T, EngineError>, ConversionError>
    where
        F: FnOnce(&dyn GeoEngine) -> Result<T, EngineError> + Send + 'static,
        T: Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || work(engine.as_ref()))
            .await
            .map_err(|e| ConversionError::Internal(format!("engine task failed: {e}")))
    }
}

async fn stage(path: &Path, bytes: Bytes) -> Result<(), ConversionError> {
    tokio::fs::write(path, &bytes)
        .await
        .map_err(|e| ConversionError::Internal(format!("could not stage {}: {e}", path.display())))
}

fn object_key(path: &Path) -> Result<String, ConversionError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or_else(|| ConversionError::Internal(format!("unusable output path {}", path.display())))
}

/// Key of a file next to `key` with a different extension:
/// `data/roads.shp` → `data/roads.dbf`.
fn sibling_key(key: &str, extension: &str) -> String {
    let name_start = key.rfind('/').map_or(0, |i| i + 1);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{extension}", &key[..name_start + dot]),
        _ => format!("{key}.{extension}"),
    }
}
