//! Component E + F, asynchronous HTTP path: open a FlatGeobuf resource over
//! HTTP, plan a bbox query against its packed r-tree (or fall back to a
//! linear scan), and fetch matching features as a lazy async sequence,
//! batching adjacent hits into as few range requests as possible.

use std::collections::VecDeque;

use packed_rtree::{calc_tree_size, stream_search_async, Rect, SearchResult};

use crate::buffered_client::AsyncBufferedRangeClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fb::{decode_feature, decode_header, decode_properties, ColumnMeta, HeaderMeta};
use crate::geometry::from_raw as geometry_from_raw;
use crate::reader::raw_geometry_bbox;
use crate::transport::{AsyncRangeTransport, HttpRangeTransport};
use crate::Feature;

const MAGIC_PREFIX: [u8; 3] = [0x66, 0x67, 0x62];

/// Asynchronous FlatGeobuf reader, generic over its range transport so the
/// HTTP path (the default, [`AsyncReader`]) and tests (an in-memory mock)
/// share one implementation — the same relationship [`crate::reader::Reader`]
/// has to any `Read + Seek` source.
///
/// Holds a bare transport handle (cheaply cloned per query) and the decoded
/// header; every [`GenericAsyncReader::select`] call builds its own
/// buffered client(s) so a single window is never shared between
/// concurrent consumers.
pub struct GenericAsyncReader<T> {
    transport: T,
    header: HeaderMeta,
    config: Config,
    length_before_tree: u64,
    length_before_features: u64,
    index_length: u64,
}

/// The reader type callers actually use: HTTP over `reqwest`.
pub type AsyncReader = GenericAsyncReader<HttpRangeTransport>;

impl AsyncReader {
    pub async fn open(url: String, config: Config) -> Result<Self> {
        Self::open_with_transport(HttpRangeTransport::new(url), config).await
    }
}

impl<T: AsyncRangeTransport + Clone> GenericAsyncReader<T> {
    pub async fn open_with_transport(transport: T, config: Config) -> Result<Self> {
        let mut client = AsyncBufferedRangeClient::new(transport);

        // Same generous opening window as the sync reader (spec §4.E.Open):
        // ~2KB plus three assumed levels of a 16-ary index tree, so the
        // header (and often the first tree levels) are warm by the time
        // traversal starts, at the cost of one over-fetch on open.
        let assumed_index_bytes: usize = (0..3u32).map(|i| 40usize * 16usize.pow(i)).sum();
        let initial_window = 2048 + assumed_index_bytes;

        let magic = client.get_range(0, 8, initial_window, "open").await?;
        if magic[0] != MAGIC_PREFIX[0] || magic[1] != MAGIC_PREFIX[1] || magic[2] != MAGIC_PREFIX[2]
        {
            return Err(Error::NotAFlatGeobuf);
        }

        let header_length = {
            let bytes = client.get_range(8, 4, 0, "open").await?;
            u32::from_le_bytes(bytes.try_into().expect("4-byte slice")) as usize
        };
        if !(8..=10_485_760).contains(&header_length) {
            return Err(Error::InvalidHeaderSize(header_length));
        }

        let header = {
            let bytes = client.get_range(12, header_length, 0, "open").await?;
            decode_header(bytes)?
        };

        let index_length = if header.index_node_size == 0 {
            0u64
        } else {
            calc_tree_size(header.features_count as usize, header.index_node_size) as u64
        };

        let length_before_tree = 12u64 + header_length as u64;
        let length_before_features = length_before_tree + index_length;

        client.log_usage("open");

        // The opening client's window dies with it; traversal and feature
        // batches each get a fresh client over a cloned transport handle
        // (spec §5: one window owner at a time).
        let transport = client.into_transport();

        Ok(Self {
            transport,
            header,
            config,
            length_before_tree,
            length_before_features,
            index_length,
        })
    }

    pub fn header(&self) -> &HeaderMeta {
        &self.header
    }

    /// Select features intersecting `rect`, or every feature if `rect` is
    /// `None`. Mirrors [`crate::reader::Reader::select`]: an unfiltered
    /// query always linear-scans, since the r-tree's BFS yield order
    /// doesn't preserve file order.
    pub async fn select(&mut self, rect: Option<Rect>) -> Result<AsyncFeatureIter<'_, T>> {
        match rect {
            None => Ok(AsyncFeatureIter::linear_scan(self, None)),
            Some(r) if self.index_length == 0 => Ok(AsyncFeatureIter::linear_scan(self, Some(r))),
            Some(r) => self.select_indexed(r).await,
        }
    }

    async fn select_indexed(&mut self, rect: Rect) -> Result<AsyncFeatureIter<'_, T>> {
        let num_items = self.header.features_count as usize;
        let node_size = self.header.index_node_size;
        let threshold = self.config.extra_request_threshold;
        let length_before_tree = self.length_before_tree;

        let mut index_client = AsyncBufferedRangeClient::new(self.transport.clone());

        let hits: Vec<SearchResult> = stream_search_async(
            num_items,
            node_size,
            rect,
            threshold,
            |byte_offset, length| {
                let client = &mut index_client;
                async move {
                    client
                        .get_range(length_before_tree + byte_offset as u64, length, 0, "index")
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|e| packed_rtree::Error::ReadNode(e.to_string()))
                }
            },
        )
        .await?;
        index_client.log_usage("index");

        let batches = FeatureBatch::plan(hits, threshold as u64);
        Ok(AsyncFeatureIter {
            reader: self,
            rect_filter: None,
            state: IterState::Indexed {
                batches: batches.into(),
            },
            current: None,
        })
    }
}

struct PlannedHit {
    offset: u64,
    length_hint: Option<u64>,
}

/// A contiguous run of feature hits fetched with a single range request,
/// each with its own buffered client so its window can be dropped once the
/// batch is exhausted (spec §4.E Feature stream).
struct FeatureBatch {
    hits: Vec<PlannedHit>,
}

impl FeatureBatch {
    fn plan(hits: Vec<SearchResult>, threshold: u64) -> Vec<FeatureBatch> {
        let mut batches = Vec::new();
        let mut current: Vec<PlannedHit> = Vec::new();
        for hit in hits {
            let planned = PlannedHit {
                offset: hit.feature_offset,
                length_hint: hit.feature_length,
            };
            if let Some(prev) = current.last() {
                let prev_len = prev.length_hint.unwrap_or(4);
                let gap = planned.offset.saturating_sub(prev.offset + prev_len);
                if gap > threshold {
                    batches.push(FeatureBatch {
                        hits: std::mem::take(&mut current),
                    });
                }
            }
            current.push(planned);
        }
        if !current.is_empty() {
            batches.push(FeatureBatch { hits: current });
        }
        batches
    }
}

enum IterState {
    LinearScan { cursor: u64, remaining: u64 },
    Indexed { batches: VecDeque<FeatureBatch> },
    Done,
}

/// The buffered client currently serving reads, plus the per-batch state
/// needed to warm its window on the first feature (spec §4.F step 1).
struct ActiveClient<T> {
    client: AsyncBufferedRangeClient<T>,
    hits: std::vec::IntoIter<PlannedHit>,
    size_hint: usize,
    first: bool,
}

/// Lazy async sequence of [`Feature`] returned by
/// [`GenericAsyncReader::select`]. Single pass; dropping it mid-iteration
/// releases its in-flight batch client without issuing further requests.
pub struct AsyncFeatureIter<'r, T> {
    reader: &'r mut GenericAsyncReader<T>,
    rect_filter: Option<Rect>,
    state: IterState,
    current: Option<ActiveClient<T>>,
}

impl<'r, T: AsyncRangeTransport + Clone> AsyncFeatureIter<'r, T> {
    fn linear_scan(reader: &'r mut GenericAsyncReader<T>, rect_filter: Option<Rect>) -> Self {
        let cursor = reader.length_before_features;
        let remaining = reader.header.features_count;
        Self {
            reader,
            rect_filter,
            state: IterState::LinearScan { cursor, remaining },
            current: None,
        }
    }

    fn decode_feature_bytes(&self, body: &[u8]) -> Result<Option<Feature>> {
        let raw = decode_feature(body)?;

        if let Some(rect) = self.rect_filter {
            let passes = match &raw.geometry {
                Some(g) => raw_geometry_bbox(g)
                    .map(|bbox| bbox.intersects(&rect))
                    .unwrap_or(false),
                None => false,
            };
            if !passes {
                return Ok(None);
            }
        }

        let geometry = match &raw.geometry {
            Some(g) => Some(geometry_from_raw(self.reader.header.geometry_type, g)?),
            None => None,
        };

        let columns: &[ColumnMeta] = raw
            .columns
            .as_deref()
            .unwrap_or(&self.reader.header.columns);
        let properties = match &raw.properties {
            Some(bytes) => Some(decode_properties(bytes, columns)?),
            None => None,
        };

        Ok(Some(Feature {
            geometry,
            properties,
        }))
    }

    /// Advance the async sequence, returning the next decoded feature, or
    /// `None` once the source is exhausted. Suspension only happens inside
    /// the underlying `get_range` calls (spec §5).
    pub async fn next(&mut self) -> Option<Result<Feature>> {
        match self.state {
            IterState::LinearScan { .. } => self.next_linear_scan().await,
            IterState::Indexed { .. } => self.next_indexed().await,
            IterState::Done => None,
        }
    }

    async fn next_linear_scan(&mut self) -> Option<Result<Feature>> {
        loop {
            let (cursor, remaining) = match self.state {
                IterState::LinearScan { cursor, remaining } => (cursor, remaining),
                _ => return None,
            };
            if remaining == 0 {
                self.state = IterState::Done;
                return None;
            }

            if self.current.is_none() {
                self.current = Some(ActiveClient {
                    client: AsyncBufferedRangeClient::new(self.reader.transport.clone()),
                    hits: Vec::new().into_iter(),
                    size_hint: 0,
                    first: true,
                });
            }
            let client = &mut self.current.as_mut().expect("just set").client;

            let feat_len = match client.get_range(cursor, 4, 0, "feature length").await {
                Ok(b) => u32::from_le_bytes(b.try_into().expect("4-byte slice")) as u64,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            let body = match client
                .get_range(cursor + 4, feat_len as usize, 0, "feature data")
                .await
            {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            self.state = IterState::LinearScan {
                cursor: cursor + 4 + feat_len,
                remaining: remaining - 1,
            };

            match self.decode_feature_bytes(&body) {
                Ok(Some(feature)) => return Some(Ok(feature)),
                Ok(None) => continue,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            }
        }
    }

    async fn next_indexed(&mut self) -> Option<Result<Feature>> {
        loop {
            if self.current.is_none() {
                let next_batch = match &mut self.state {
                    IterState::Indexed { batches } => batches.pop_front(),
                    _ => None,
                };
                match next_batch {
                    Some(batch) => {
                        let size_hint = match (batch.hits.first(), batch.hits.last()) {
                            (Some(first), Some(last)) => (last.offset
                                + last.length_hint.unwrap_or(4))
                            .saturating_sub(first.offset)
                                as usize,
                            _ => 0,
                        };
                        self.current = Some(ActiveClient {
                            client: AsyncBufferedRangeClient::new(self.reader.transport.clone()),
                            hits: batch.hits.into_iter(),
                            size_hint,
                            first: true,
                        });
                    }
                    None => {
                        self.state = IterState::Done;
                        return None;
                    }
                }
            }

            let hit = {
                let active = self.current.as_mut().expect("just populated");
                active.hits.next()
            };
            let hit = match hit {
                Some(h) => h,
                None => {
                    self.current = None;
                    continue;
                }
            };

            let min_req = {
                let active = self.current.as_mut().expect("just populated");
                let was_first = active.first;
                active.first = false;
                if was_first {
                    active.size_hint
                } else {
                    0
                }
            };

            let base = self.reader.length_before_features + hit.offset;
            let client = &mut self.current.as_mut().expect("just populated").client;

            let feat_len = match client.get_range(base, 4, min_req, "feature length").await {
                Ok(b) => u32::from_le_bytes(b.try_into().expect("4-byte slice")) as usize,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            let body = match client.get_range(base + 4, feat_len, 0, "feature data").await {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };

            match self.decode_feature_bytes(&body) {
                Ok(Some(feature)) => return Some(Ok(feature)),
                Ok(None) => continue,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            }
        }
    }
}
