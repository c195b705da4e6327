//! Object storage collaborator.
//!
//! [`ObjectStore`] is the seam the converter depends on; [`GcsStore`] is the
//! production implementation on top of Google Cloud Storage. Tests substitute
//! an in-memory store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{ObjectStore as _, PutPayload};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object '{0}' does not exist")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StoreError::NotFound(_))
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound(path),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn download(&self, key: &str) -> Result<Bytes, StoreError>;

    async fn upload(&self, key: &str, body: Bytes) -> Result<(), StoreError>;

    /// Pre-authenticated GET url for `key`, valid for `expires_in`.
    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String, StoreError>;
}

/// A single bucket on Google Cloud Storage.
///
/// Credentials come from the usual `GOOGLE_*` environment variables or the
/// metadata server.
#[derive(Debug)]
pub struct GcsStore {
    bucket: String,
    inner: GoogleCloudStorage,
}

impl GcsStore {
    pub fn new(bucket: &str) -> Result<Self, StoreError> {
        let inner = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()?;
        Ok(Self {
            bucket: bucket.to_owned(),
            inner,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn download(&self, key: &str) -> Result<Bytes, StoreError> {
        let result = self.inner.get(&ObjectPath::from(key)).await?;
        let bytes = result.bytes().await?;
        debug!(bucket = %self.bucket, key, size = bytes.len(), "downloaded object");
        Ok(bytes)
    }

    async fn upload(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        let size = body.len();
        self.inner
            .put(&ObjectPath::from(key), PutPayload::from(body))
            .await?;
        debug!(bucket = %self.bucket, key, size, "uploaded object");
        Ok(())
    }

    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        let url = self
            .inner
            .signed_url(Method::GET, &ObjectPath::from(key), expires_in)
            .await?;
        Ok(url.to_string())
    }
}

/// Timeout and retry policy wrapped around every store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub timeout: Duration,
    /// Extra attempts after a transient failure. Zero means one attempt.
    pub retries: u32,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            retries: 0,
        }
    }
}

const BASE_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

impl TransferPolicy {
    pub async fn run<T, F, Fut>(&self, operation: &str, key: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StoreError::Timeout(self.timeout)),
            };
            match outcome {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    let delay = BASE_BACKOFF
                        .saturating_mul(1 << (attempt - 1).min(5))
                        .min(MAX_BACKOFF);
                    warn!(operation, key, attempt, error = %err, ?delay, "retrying store call");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
