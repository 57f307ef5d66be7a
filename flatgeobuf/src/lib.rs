//! Read FlatGeobuf — a binary, seekable geospatial vector format — from a
//! local file or over HTTP, fetching only the byte ranges a query actually
//! needs.
//!
//! The packed Hilbert R-tree layout and streaming search live in
//! [`packed_rtree`], which this crate treats as a transport-agnostic
//! dependency. This crate owns everything transport-specific: the range
//! transports themselves ([`transport`]), the buffered range client that
//! amortizes them ([`buffered_client`], internal), the FlatBuffers
//! header/feature decoders ([`fb`]), and the reader orchestrators
//! ([`Reader`], [`AsyncReader`]) that tie it all together.

mod buffered_client;
pub mod config;
mod error;
pub mod fb;
pub mod filter;
pub mod geojson;
pub mod geometry;
#[cfg(feature = "http")]
mod http_reader;
mod reader;
#[cfg(test)]
mod test_support;
pub mod transport;

use std::collections::BTreeMap;

pub use config::Config;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use packed_rtree::Rect;
pub use reader::{FeatureIter, Reader};

#[cfg(feature = "http")]
pub use http_reader::{AsyncFeatureIter, AsyncReader};

/// A single decoded row: an optional geometry (features may be geometryless)
/// and a sparse map of decoded column values.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry>,
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
}

/// Open a FlatGeobuf file from any seekable source (typically
/// `std::fs::File`), using the default [`Config`].
pub fn open_file<S: std::io::Read + std::io::Seek>(source: S) -> Result<Reader<S>> {
    Reader::open(source)
}

/// Open a FlatGeobuf file from any seekable source with an explicit
/// [`Config`].
pub fn open_file_with_config<S: std::io::Read + std::io::Seek>(
    source: S,
    config: Config,
) -> Result<Reader<S>> {
    Reader::open_with_config(source, config)
}

/// Open a FlatGeobuf resource served over HTTP, using the default
/// [`Config`].
#[cfg(feature = "http")]
pub async fn open_http(url: impl Into<String>) -> Result<AsyncReader> {
    AsyncReader::open(url.into(), Config::default()).await
}

/// Open a FlatGeobuf resource served over HTTP with an explicit [`Config`].
#[cfg(feature = "http")]
pub async fn open_http_with_config(url: impl Into<String>, config: Config) -> Result<AsyncReader> {
    AsyncReader::open(url.into(), config).await
}
