//! Vector file conversion service.
//!
//! A request names a source object in cloud storage, the format and CRS it is
//! written in, and the format and CRS it should be converted to. The
//! [`converter::Converter`] downloads the object into a scoped staging area,
//! runs it through the [`engine::GeoEngine`], uploads the result and hands
//! back a time-limited download URL.

pub mod config;
pub mod converter;
pub mod crs;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod format;
pub mod request;
pub mod server;
pub mod staging;
pub mod store;

pub use converter::{Converter, ConverterSettings};
pub use engine::{GeoEngine, VectorEngine};
pub use error::{ConversionError, ErrorKind};
pub use request::{ConversionJob, ConversionRequest, ConversionResult};
pub use store::{GcsStore, ObjectStore, StoreError, TransferPolicy};
