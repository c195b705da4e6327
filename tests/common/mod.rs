#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use gis_converter::crs::CrsId;
use gis_converter::dataset::FeatureSet;
use gis_converter::engine::EngineError;
use gis_converter::format::Driver;
use gis_converter::{Converter, ConverterSettings, GeoEngine, ObjectStore, StoreError, VectorEngine};
use serde_json::{json, Value};

/// In-memory bucket that counts every call made to it.
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Bytes>>,
    pub downloads: AtomicUsize,
    pub uploads: AtomicUsize,
    pub signs: AtomicUsize,
    pub fail_uploads: AtomicBool,
    pub fail_signs: AtomicBool,
    /// Reject the upload of this one key only.
    fail_upload_of: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put(&self, key: &str, body: impl Into<Bytes>) {
        self.objects.lock().unwrap().insert(key.to_owned(), body.into());
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn fail_upload_of(&self, key: &str) {
        *self.fail_upload_of.lock().unwrap() = Some(key.to_owned());
    }

    pub fn calls(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
            + self.uploads.load(Ordering::SeqCst)
            + self.signs.load(Ordering::SeqCst)
    }

    /// Copy the stored objects named `keys` into `dir` and return their paths.
    pub fn export(&self, dir: &Path, keys: &[&str]) -> Vec<PathBuf> {
        keys.iter()
            .map(|key| {
                let path = dir.join(key);
                std::fs::write(&path, self.get(key).expect("object stored")).unwrap();
                path
            })
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn download(&self, key: &str) -> Result<Bytes, StoreError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        self.get(key).ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    async fn upload(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let rejected = self.fail_upload_of.lock().unwrap().as_deref() == Some(key);
        if self.fail_uploads.load(Ordering::SeqCst) || rejected {
            return Err(StoreError::Backend("bucket is read-only".to_owned()));
        }
        self.put(key, body);
        Ok(())
    }

    async fn sign(&self, key: &str, expires_in: Duration) -> Result<String, StoreError> {
        self.signs.fetch_add(1, Ordering::SeqCst);
        if self.fail_signs.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("no signing credentials".to_owned()));
        }
        Ok(format!(
            "https://storage.test/bucket/{key}?expires={}",
            expires_in.as_secs()
        ))
    }
}

/// Delegates to [`VectorEngine`] and counts calls per operation.
#[derive(Default)]
pub struct CountingEngine {
    inner: VectorEngine,
    pub parses: AtomicUsize,
    pub reprojections: AtomicUsize,
    pub simplifications: AtomicUsize,
    pub serializations: AtomicUsize,
}

impl CountingEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl GeoEngine for CountingEngine {
    fn parse(&self, path: &Path, driver: Driver) -> Result<FeatureSet, EngineError> {
        self.parses.fetch_add(1, Ordering::SeqCst);
        self.inner.parse(path, driver)
    }

    fn reproject(&self, dataset: FeatureSet, from: &CrsId, to: &CrsId) -> Result<FeatureSet, EngineError> {
        self.reprojections.fetch_add(1, Ordering::SeqCst);
        self.inner.reproject(dataset, from, to)
    }

    fn simplify(&self, dataset: FeatureSet, tolerance: f64) -> Result<FeatureSet, EngineError> {
        self.simplifications.fetch_add(1, Ordering::SeqCst);
        self.inner.simplify(dataset, tolerance)
    }

    fn serialize(
        &self,
        dataset: &FeatureSet,
        driver: Driver,
        dir: &Path,
        stem: &str,
    ) -> Result<Vec<PathBuf>, EngineError> {
        self.serializations.fetch_add(1, Ordering::SeqCst);
        self.inner.serialize(dataset, driver, dir, stem)
    }
}

pub fn converter(store: &Arc<MemoryStore>, engine: &Arc<CountingEngine>) -> Converter {
    converter_with(store, engine, ConverterSettings::default())
}

pub fn converter_with(
    store: &Arc<MemoryStore>,
    engine: &Arc<CountingEngine>,
    settings: ConverterSettings,
) -> Converter {
    Converter::new(store.clone(), engine.clone(), settings)
}

/// Three named cities as a GeoJSON FeatureCollection.
pub fn cities_geojson() -> String {
    json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.75, 59.91]}, "properties": {"name": "Oslo", "pop": 709000}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [5.32, 60.39]}, "properties": {"name": "Bergen", "pop": 286000}},
            {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.4, 63.43]}, "properties": {"name": "Trondheim", "pop": 212000}}
        ]
    })
    .to_string()
}

/// Two wiggly lines with many near-collinear vertices.
pub fn rivers_geojson() -> String {
    let wiggle = |offset: f64| -> Vec<Value> {
        (0..50)
            .map(|i| {
                let x = f64::from(i) * 0.1;
                let y = offset + if i % 2 == 0 { 0.001 } else { -0.001 };
                json!([x, y])
            })
            .collect()
    };
    json!({
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": wiggle(0.0)}, "properties": {"name": "a"}},
            {"type": "Feature", "geometry": {"type": "LineString", "coordinates": wiggle(1.0)}, "properties": {"name": "b"}}
        ]
    })
    .to_string()
}

pub fn request(overrides: Value) -> Value {
    let mut body = json!({
        "fileId": "abc",
        "fileName": "in.geojson",
        "inputFormat": "GeoJSON",
        "outputFormat": "shp",
        "inputCRS": "EPSG:4326",
        "outputCRS": "EPSG:4326",
        "simplification": 0
    });
    if let (Some(body), Some(overrides)) = (body.as_object_mut(), overrides.as_object()) {
        for (key, value) in overrides {
            body.insert(key.clone(), value.clone());
        }
    }
    body
}
