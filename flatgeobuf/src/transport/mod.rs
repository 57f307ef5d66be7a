//! Component A: a raw range-read transport, one request at a time, no
//! caching. The buffered range client (component B, [`crate::buffered_client`])
//! is the layer that amortizes these.

mod file;
#[cfg(feature = "http")]
mod http;

pub use file::FileRangeTransport;
#[cfg(feature = "http")]
pub use http::HttpRangeTransport;

use crate::error::Result;

/// Counters kept by a transport for the `log_usage` telemetry in component B.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransportStats {
    pub requests_ever_made: u64,
    pub bytes_ever_requested: u64,
}

impl TransportStats {
    fn record(&mut self, length: usize) {
        self.requests_ever_made += 1;
        self.bytes_ever_requested += length as u64;
    }
}

/// A synchronous range-read source: a local seekable file.
pub trait RangeTransport {
    /// Read exactly `length` bytes starting at `begin`, unless the source is
    /// shorter, in which case the short remainder is returned (the caller
    /// — the buffered client — treats an unexpectedly short result as
    /// corruption).
    fn read_range(&mut self, begin: u64, length: usize) -> Result<Vec<u8>>;

    fn stats(&self) -> TransportStats;
}

/// An asynchronous range-read source: an HTTP resource supporting byte-range
/// requests.
#[async_trait::async_trait]
pub trait AsyncRangeTransport: Send + Sync {
    async fn read_range(&mut self, begin: u64, length: usize) -> Result<Vec<u8>>;

    fn stats(&self) -> TransportStats;
}
