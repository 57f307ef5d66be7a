//! Component B: a single-window buffered range client.
//!
//! This is the spec's "explicit single-window cache, not a multi-segment
//! cache" — a direct port of `BufferedHttpRangeClient`/
//! `BufferedFileRangeClient` in the Python reference implementation this
//! crate is derived from.

use crate::error::Result;
use crate::transport::{AsyncRangeTransport, RangeTransport};

/// Synchronous buffered range client, for the local-file path.
pub struct BufferedRangeClient<T> {
    transport: T,
    buffer: Vec<u8>,
    head: u64,
    bytes_ever_used: u64,
    bytes_ever_fetched: u64,
}

impl<T: RangeTransport> BufferedRangeClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            head: 0,
            bytes_ever_used: 0,
            bytes_ever_fetched: 0,
        }
    }

    /// Spec §4.B `get_range`. `min_req_length` is the caller's hint of how
    /// many contiguous bytes it will likely need soon; on a miss, we
    /// over-fetch to that size to amortize future calls.
    ///
    /// The returned slice is only valid until the next call on this same
    /// client — a subsequent miss replaces `buffer` wholesale.
    pub fn get_range(
        &mut self,
        start: u64,
        length: usize,
        min_req_length: usize,
        purpose: &str,
    ) -> Result<&[u8]> {
        self.bytes_ever_used += length as u64;

        let covered = start >= self.head
            && (start - self.head) as usize + length <= self.buffer.len();

        if !covered {
            let length_to_fetch = length.max(min_req_length);
            tracing::debug!(
                purpose,
                start,
                length,
                min_req_length,
                length_to_fetch,
                "buffered range client miss, fetching"
            );
            self.bytes_ever_fetched += length_to_fetch as u64;
            self.buffer = self.transport.read_range(start, length_to_fetch)?;
            self.head = start;
        }

        let start_i = (start - self.head) as usize;
        let end_i = start_i + length;
        if end_i > self.buffer.len() {
            return Err(crate::error::Error::Transport(format!(
                "short read: wanted {length} bytes at {start}, source only had {}",
                self.buffer.len().saturating_sub(start_i)
            )));
        }
        Ok(&self.buffer[start_i..end_i])
    }

    pub fn log_usage(&self, purpose: &str) {
        let category = purpose.split(' ').next().unwrap_or(purpose);
        let efficiency = if self.bytes_ever_fetched == 0 {
            0.0
        } else {
            100.0 * self.bytes_ever_used as f64 / self.bytes_ever_fetched as f64
        };
        tracing::info!(
            category,
            used = self.bytes_ever_used,
            fetched = self.bytes_ever_fetched,
            efficiency_pct = efficiency,
            "range client usage"
        );
    }

    pub fn bytes_ever_used(&self) -> u64 {
        self.bytes_ever_used
    }

    pub fn bytes_ever_fetched(&self) -> u64 {
        self.bytes_ever_fetched
    }
}

/// Asynchronous buffered range client, for the HTTP path. Identical
/// single-window semantics to [`BufferedRangeClient`].
pub struct AsyncBufferedRangeClient<T> {
    transport: T,
    buffer: Vec<u8>,
    head: u64,
    bytes_ever_used: u64,
    bytes_ever_fetched: u64,
}

impl<T: AsyncRangeTransport> AsyncBufferedRangeClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: Vec::new(),
            head: 0,
            bytes_ever_used: 0,
            bytes_ever_fetched: 0,
        }
    }

    pub async fn get_range(
        &mut self,
        start: u64,
        length: usize,
        min_req_length: usize,
        purpose: &str,
    ) -> Result<&[u8]> {
        self.bytes_ever_used += length as u64;

        let covered = start >= self.head
            && (start - self.head) as usize + length <= self.buffer.len();

        if !covered {
            let length_to_fetch = length.max(min_req_length);
            tracing::debug!(
                purpose,
                start,
                length,
                min_req_length,
                length_to_fetch,
                "buffered range client miss, fetching"
            );
            self.bytes_ever_fetched += length_to_fetch as u64;
            self.buffer = self.transport.read_range(start, length_to_fetch).await?;
            self.head = start;
        }

        let start_i = (start - self.head) as usize;
        let end_i = start_i + length;
        if end_i > self.buffer.len() {
            return Err(crate::error::Error::Transport(format!(
                "short read: wanted {length} bytes at {start}, source only had {}",
                self.buffer.len().saturating_sub(start_i)
            )));
        }
        Ok(&self.buffer[start_i..end_i])
    }

    pub fn log_usage(&self, purpose: &str) {
        let category = purpose.split(' ').next().unwrap_or(purpose);
        let efficiency = if self.bytes_ever_fetched == 0 {
            0.0
        } else {
            100.0 * self.bytes_ever_used as f64 / self.bytes_ever_fetched as f64
        };
        tracing::info!(
            category,
            used = self.bytes_ever_used,
            fetched = self.bytes_ever_fetched,
            efficiency_pct = efficiency,
            "range client usage"
        );
    }

    pub fn bytes_ever_used(&self) -> u64 {
        self.bytes_ever_used
    }

    pub fn bytes_ever_fetched(&self) -> u64 {
        self.bytes_ever_fetched
    }

    /// Unwraps back to the bare transport, discarding the window. Used once,
    /// right after the opening header read, to hand the transport off to
    /// per-batch buffered clients instead of keeping this one alive.
    pub fn into_transport(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FileRangeTransport;
    use std::io::Cursor;

    struct MockAsyncTransport {
        data: Vec<u8>,
        fetch_count: u32,
    }

    #[async_trait::async_trait]
    impl AsyncRangeTransport for MockAsyncTransport {
        async fn read_range(&mut self, begin: u64, length: usize) -> Result<Vec<u8>> {
            self.fetch_count += 1;
            let begin = begin as usize;
            let end = (begin + length).min(self.data.len());
            Ok(self.data[begin.min(self.data.len())..end].to_vec())
        }

        fn stats(&self) -> crate::transport::TransportStats {
            crate::transport::TransportStats {
                requests_ever_made: self.fetch_count as u64,
                bytes_ever_requested: 0,
            }
        }
    }

    #[tokio::test]
    async fn async_client_serves_small_reads_from_warm_window() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = AsyncBufferedRangeClient::new(MockAsyncTransport {
            data: data.clone(),
            fetch_count: 0,
        });

        let first = c.get_range(0, 4, 64, "header").await.unwrap().to_vec();
        assert_eq!(first, &data[0..4]);
        assert_eq!(c.bytes_ever_fetched(), 64);

        let second = c.get_range(10, 4, 0, "header").await.unwrap().to_vec();
        assert_eq!(second, &data[10..14]);
        assert_eq!(c.bytes_ever_fetched(), 64);
        assert_eq!(c.bytes_ever_used(), 8);
    }

    #[tokio::test]
    async fn async_client_window_is_replaced_wholesale_on_miss() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = AsyncBufferedRangeClient::new(MockAsyncTransport {
            data: data.clone(),
            fetch_count: 0,
        });
        c.get_range(0, 4, 8, "a").await.unwrap();
        let out = c.get_range(100, 4, 0, "b").await.unwrap().to_vec();
        assert_eq!(out, &data[100..104]);
        assert_eq!(c.bytes_ever_fetched(), 12);
    }

    #[tokio::test]
    async fn async_client_into_transport_roundtrips() {
        let data: Vec<u8> = (0u8..=15).collect();
        let mut c = AsyncBufferedRangeClient::new(MockAsyncTransport {
            data: data.clone(),
            fetch_count: 0,
        });
        c.get_range(0, 4, 4, "a").await.unwrap();
        let transport = c.into_transport();
        assert_eq!(transport.data, data);
    }

    fn client_over(data: Vec<u8>) -> BufferedRangeClient<FileRangeTransport<Cursor<Vec<u8>>>> {
        BufferedRangeClient::new(FileRangeTransport::new(Cursor::new(data)))
    }

    #[test]
    fn serves_small_reads_from_warm_window() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = client_over(data.clone());

        let first = c.get_range(0, 4, 64, "header").unwrap().to_vec();
        assert_eq!(first, &data[0..4]);
        assert_eq!(c.bytes_ever_fetched(), 64);

        // Covered by the warm window: only "used" increments.
        let second = c.get_range(10, 4, 0, "header").unwrap().to_vec();
        assert_eq!(second, &data[10..14]);
        assert_eq!(c.bytes_ever_fetched(), 64);
        assert_eq!(c.bytes_ever_used(), 8);
    }

    #[test]
    fn window_is_replaced_wholesale_on_miss() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = client_over(data.clone());
        c.get_range(0, 4, 8, "a").unwrap();
        // This miss: start 100 is well outside [0, 8).
        let out = c.get_range(100, 4, 0, "b").unwrap().to_vec();
        assert_eq!(out, &data[100..104]);
        assert_eq!(c.bytes_ever_fetched(), 12);
    }

    #[test]
    fn window_invariant_bytes_match_source() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = client_over(data.clone());
        for (start, len) in [(0usize, 10usize), (50, 20), (5, 3)] {
            let got = c.get_range(start as u64, len, len, "x").unwrap().to_vec();
            assert_eq!(got, data[start..start + len]);
        }
    }

    #[test]
    fn used_never_exceeds_fetched() {
        let data: Vec<u8> = (0u8..=255).collect();
        let mut c = client_over(data);
        for (start, len) in [(0usize, 10usize), (5, 3), (100, 4), (102, 2)] {
            c.get_range(start as u64, len, 16, "x").unwrap();
        }
        assert!(c.bytes_ever_used() <= c.bytes_ever_fetched());
    }
}
