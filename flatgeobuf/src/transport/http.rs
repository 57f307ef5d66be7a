use crate::error::{Error, Result};

use super::{AsyncRangeTransport, TransportStats};

/// Range reads against an HTTP(S) resource. Sets `Range: bytes=begin-end`
/// and accepts either a `206 Partial Content` response or (for servers that
/// ignore the header and echo the whole resource back with `200 OK`) a
/// `200` whose body we slice down to `[begin, begin+length)` ourselves —
/// the same tolerance the ecosystem's `http-range-client` crate documents,
/// since plenty of static-file hosts behave this way.
#[derive(Clone)]
pub struct HttpRangeTransport {
    client: reqwest::Client,
    url: String,
    stats: TransportStats,
}

impl HttpRangeTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            stats: TransportStats::default(),
        }
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            stats: TransportStats::default(),
        }
    }

    /// A fresh handle onto the same connection (the underlying
    /// `reqwest::Client` is reference-counted, so this shares the pool
    /// without sharing request/byte counters) for a new buffered client's
    /// single-window cache (spec §4.E: each batch gets its own buffered
    /// client over the shared transport).
    pub fn shared_handle(&self) -> Self {
        Self {
            client: self.client.clone(),
            url: self.url.clone(),
            stats: TransportStats::default(),
        }
    }
}

#[async_trait::async_trait]
impl AsyncRangeTransport for HttpRangeTransport {
    async fn read_range(&mut self, begin: u64, length: usize) -> Result<Vec<u8>> {
        if length == 0 {
            self.stats.record(0);
            return Ok(Vec::new());
        }
        let end = begin + length as u64 - 1;
        let range_header = format!("bytes={begin}-{end}");
        tracing::trace!(url = %self.url, range = %range_header, "issuing range request");

        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, range_header)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::PARTIAL_CONTENT && status != reqwest::StatusCode::OK {
            return Err(Error::Transport(format!(
                "unexpected HTTP status {status} for range request"
            )));
        }

        let bytes = response.bytes().await?.to_vec();
        let bytes = if status == reqwest::StatusCode::OK {
            // Server ignored our Range header and sent the whole resource
            // from offset 0; slice out the window we actually asked for.
            let begin = begin as usize;
            let end = (begin + length).min(bytes.len());
            bytes[begin.min(bytes.len())..end].to_vec()
        } else {
            bytes
        };

        self.stats.record(length);
        Ok(bytes)
    }

    fn stats(&self) -> TransportStats {
        self.stats
    }
}
