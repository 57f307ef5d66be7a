//! Component E + F, synchronous file path: open a FlatGeobuf file, plan a
//! bbox query against its packed r-tree (or fall back to a linear scan),
//! and fetch matching features lazily.

use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};

use packed_rtree::{calc_tree_size, Rect, SearchResult, StreamSearch};

use crate::buffered_client::BufferedRangeClient;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fb::{decode_feature, decode_header, decode_properties, ColumnMeta, HeaderMeta, RawGeometry};
use crate::geometry::from_raw as geometry_from_raw;
use crate::transport::FileRangeTransport;
use crate::Feature;

/// First three bytes of every FlatGeobuf file. The fourth magic byte is a
/// version marker this crate doesn't special-case (spec §9 open question:
/// behavior is only defined for files matching the published prefix).
const MAGIC_PREFIX: [u8; 3] = [0x66, 0x67, 0x62];

pub struct Reader<S: Read + Seek> {
    client: BufferedRangeClient<FileRangeTransport<S>>,
    header: HeaderMeta,
    config: Config,
    total_len: u64,
    length_before_tree: u64,
    length_before_features: u64,
    index_length: u64,
}

impl<S: Read + Seek> Reader<S> {
    pub fn open(source: S) -> Result<Self> {
        Self::open_with_config(source, Config::default())
    }

    pub fn open_with_config(mut source: S, config: Config) -> Result<Self> {
        let total_len = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(0))?;

        let mut client = BufferedRangeClient::new(FileRangeTransport::new(source));

        // A generous first window: ~2KB plus three assumed levels of a
        // 16-ary index tree, so the header and the first couple of tree
        // levels are usually already warm by the time traversal starts.
        let assumed_index_bytes: usize = (0..3u32).map(|i| 40usize * 16usize.pow(i)).sum();
        let initial_window = 2048 + assumed_index_bytes;

        let magic = client.get_range(0, 8, initial_window, "open")?;
        if magic[0] != MAGIC_PREFIX[0] || magic[1] != MAGIC_PREFIX[1] || magic[2] != MAGIC_PREFIX[2]
        {
            return Err(Error::NotAFlatGeobuf);
        }

        let header_length = {
            let bytes = client.get_range(8, 4, 0, "open")?;
            u32::from_le_bytes(bytes.try_into().expect("4-byte slice")) as usize
        };
        if !(8..=10_485_760).contains(&header_length) {
            return Err(Error::InvalidHeaderSize(header_length));
        }

        let header = {
            let bytes = client.get_range(12, header_length, 0, "open")?;
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

        Ok(Self {
            client,
            header,
            config,
            total_len,
            length_before_tree,
            length_before_features,
            index_length,
        })
    }

    pub fn header(&self) -> &HeaderMeta {
        &self.header
    }

    /// Select features intersecting `rect`, or every feature if `rect` is
    /// `None`. An unfiltered query always does a linear scan — the packed
    /// r-tree's breadth-first yield order doesn't match file order, so
    /// using it here would break the "unfiltered query equals file order"
    /// property for no benefit.
    pub fn select(&mut self, rect: Option<Rect>) -> Result<FeatureIter<'_, S>> {
        match rect {
            None => Ok(FeatureIter::linear_scan(self, None)),
            Some(r) if self.index_length == 0 => Ok(FeatureIter::linear_scan(self, Some(r))),
            Some(r) => FeatureIter::indexed(self, r),
        }
    }
}

struct PlannedHit {
    offset: u64,
    length_hint: Option<u64>,
}

fn plan_batches(hits: Vec<SearchResult>, threshold: u64) -> Vec<Vec<PlannedHit>> {
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
                batches.push(std::mem::take(&mut current));
            }
        }
        current.push(planned);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

enum IterState {
    LinearScan { cursor: u64 },
    Indexed { batches: VecDeque<Vec<PlannedHit>> },
    Done,
}

struct CurrentBatch {
    hits: std::vec::IntoIter<PlannedHit>,
    size_hint: usize,
    first: bool,
}

/// The lazy sequence of [`Feature`] returned by [`Reader::select`]. A single
/// pass; dropping it mid-iteration simply drops the borrow on the reader —
/// no background work survives it to clean up.
pub struct FeatureIter<'r, S: Read + Seek> {
    reader: &'r mut Reader<S>,
    rect_filter: Option<Rect>,
    state: IterState,
    current_batch: Option<CurrentBatch>,
}

impl<'r, S: Read + Seek> FeatureIter<'r, S> {
    fn linear_scan(reader: &'r mut Reader<S>, rect_filter: Option<Rect>) -> Self {
        let cursor = reader.length_before_features;
        Self {
            reader,
            rect_filter,
            state: IterState::LinearScan { cursor },
            current_batch: None,
        }
    }

    fn indexed(reader: &'r mut Reader<S>, rect: Rect) -> Result<Self> {
        let num_items = reader.header.features_count as usize;
        let node_size = reader.header.index_node_size;
        let threshold = reader.config.extra_request_threshold;
        let length_before_tree = reader.length_before_tree;

        let mut hits = Vec::new();
        {
            let client = &mut reader.client;
            let search = StreamSearch::new(num_items, node_size, rect, threshold, |byte_offset, length| {
                client
                    .get_range(length_before_tree + byte_offset as u64, length, 0, "index")
                    .map(|b| b.to_vec())
                    .map_err(|e| packed_rtree::Error::ReadNode(e.to_string()))
            })?;
            for result in search {
                hits.push(result?);
            }
        }
        reader.client.log_usage("index");

        let batches = plan_batches(hits, threshold as u64);
        Ok(Self {
            reader,
            rect_filter: None,
            state: IterState::Indexed {
                batches: batches.into(),
            },
            current_batch: None,
        })
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

    fn next_linear_scan(&mut self) -> Option<Result<Feature>> {
        loop {
            let cursor = match self.state {
                IterState::LinearScan { cursor } => cursor,
                _ => return None,
            };
            if cursor >= self.reader.total_len {
                self.state = IterState::Done;
                return None;
            }

            let feat_len = match self.reader.client.get_range(cursor, 4, 0, "feature length") {
                Ok(b) => u32::from_le_bytes(b.try_into().expect("4-byte slice")) as u64,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            let body = match self
                .reader
                .client
                .get_range(cursor + 4, feat_len as usize, 0, "feature data")
            {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            self.state = IterState::LinearScan {
                cursor: cursor + 4 + feat_len,
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

    fn next_indexed(&mut self) -> Option<Result<Feature>> {
        loop {
            if self.current_batch.is_none() {
                let next_batch = match &mut self.state {
                    IterState::Indexed { batches } => batches.pop_front(),
                    _ => None,
                };
                match next_batch {
                    Some(entries) => {
                        let size_hint = match (entries.first(), entries.last()) {
                            (Some(first), Some(last)) => (last.offset
                                + last.length_hint.unwrap_or(4))
                            .saturating_sub(first.offset)
                                as usize,
                            _ => 0,
                        };
                        self.current_batch = Some(CurrentBatch {
                            hits: entries.into_iter(),
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
                let batch = self.current_batch.as_mut().expect("just populated");
                batch.hits.next()
            };
            let hit = match hit {
                Some(h) => h,
                None => {
                    self.current_batch = None;
                    continue;
                }
            };

            let min_req = {
                let batch = self.current_batch.as_mut().expect("just populated");
                let was_first = batch.first;
                batch.first = false;
                if was_first {
                    batch.size_hint
                } else {
                    0
                }
            };

            let base = self.reader.length_before_features + hit.offset;
            let feat_len = match self.reader.client.get_range(base, 4, min_req, "feature length") {
                Ok(b) => u32::from_le_bytes(b.try_into().expect("4-byte slice")) as usize,
                Err(e) => {
                    self.state = IterState::Done;
                    return Some(Err(e));
                }
            };
            let body = match self.reader.client.get_range(base + 4, feat_len, 0, "feature data") {
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

impl<'r, S: Read + Seek> Iterator for FeatureIter<'r, S> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            IterState::LinearScan { .. } => self.next_linear_scan(),
            IterState::Indexed { .. } => self.next_indexed(),
            IterState::Done => None,
        }
    }
}

pub(crate) fn raw_geometry_bbox(raw: &RawGeometry) -> Option<Rect> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    fn visit(raw: &RawGeometry, min_x: &mut f64, min_y: &mut f64, max_x: &mut f64, max_y: &mut f64) {
        for chunk in raw.xy.chunks(2) {
            if chunk.len() == 2 {
                *min_x = min_x.min(chunk[0]);
                *max_x = max_x.max(chunk[0]);
                *min_y = min_y.min(chunk[1]);
                *max_y = max_y.max(chunk[1]);
            }
        }
        if let Some(parts) = &raw.parts {
            for part in parts {
                visit(part, min_x, min_y, max_x, max_y);
            }
        }
    }

    visit(raw, &mut min_x, &mut min_y, &mut max_x, &mut max_y);
    if min_x.is_finite() {
        Some(Rect::new(min_x, min_y, max_x, max_y))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    use flatbuffers::FlatBufferBuilder;

    /// FlatBuffers vtable slot byte offset for field `i`, matching the
    /// convention `fb::slot` uses on the decode side.
    fn slot(field_index: usize) -> flatbuffers::VOffsetT {
        (4 + 2 * field_index) as flatbuffers::VOffsetT
    }

    /// Builds a tiny, real, valid FlatGeobuf file in memory: a header with
    /// no index (`index_node_size = 0`) and a handful of point features,
    /// exercising the linear-scan path end to end.
    fn build_fgb_no_index(points: &[(f64, f64)]) -> Vec<u8> {
        let mut header_fbb = FlatBufferBuilder::new();

        // Header: geometry_type = Point(1), features_count, index_node_size
        // left at its default (0, absent from the vtable).
        let header_start = header_fbb.start_table();
        header_fbb.push_slot::<u8>(slot(2), 1, 0);
        header_fbb.push_slot::<u64>(slot(8), points.len() as u64, 0);
        let header_end = header_fbb.end_table(header_start);
        header_fbb.finish_minimal(header_end);
        let header_bytes = header_fbb.finished_data().to_vec();

        let mut buf = Vec::new();
        buf.extend_from_slice(&[0x66, 0x67, 0x62, 0x03]);
        buf.extend_from_slice(&[0u8; 4]); // bytes 4..8, ignored
        buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&header_bytes);

        for &(x, y) in points {
            let mut feat_fbb = FlatBufferBuilder::new();
            let xy = feat_fbb.create_vector(&[x, y]);
            let geom_start = feat_fbb.start_table();
            feat_fbb.push_slot_always(slot(1), xy);
            let geom_end = feat_fbb.end_table(geom_start);

            let feature_start = feat_fbb.start_table();
            feat_fbb.push_slot_always(slot(0), geom_end);
            let feature_end = feat_fbb.end_table(feature_start);
            feat_fbb.finish_minimal(feature_end);
            let feature_bytes = feat_fbb.finished_data().to_vec();

            buf.extend_from_slice(&(feature_bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&feature_bytes);
        }
        buf
    }

    #[test]
    fn reads_header_and_scans_all_points() {
        let points = [(1.0, 2.0), (3.0, 4.0), (5.0, 6.0)];
        let bytes = build_fgb_no_index(&points);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().features_count, 3);

        let got: Vec<_> = reader
            .select(None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(got.len(), 3);
        for (feature, &(x, y)) in got.iter().zip(points.iter()) {
            match feature.geometry.as_ref().unwrap() {
                crate::geometry::Geometry::Point(c) => {
                    assert_eq!((c.x, c.y), (x, y));
                }
                other => panic!("expected point, got {other:?}"),
            }
        }
    }

    #[test]
    fn bbox_filter_on_unindexed_file_drops_outside_points() {
        let points = [(0.0, 0.0), (10.0, 10.0), (20.0, 20.0)];
        let bytes = build_fgb_no_index(&points);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();

        let got: Vec<_> = reader
            .select(Some(Rect::new(-1.0, -1.0, 11.0, 11.0)))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8; 20];
        let err = Reader::open(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::NotAFlatGeobuf));
    }

    #[test]
    fn rejects_header_length_out_of_range() {
        let mut bytes = vec![0x66, 0x67, 0x62, 0x03, 0, 0, 0, 0];
        bytes.extend_from_slice(&3u32.to_le_bytes()); // too small, must be >= 8
        let err = Reader::open(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::InvalidHeaderSize(3)));
    }

    fn random_points(n: usize, seed: u64) -> Vec<(f64, f64)> {
        // A small xorshift so this module doesn't need a `rand` dependency
        // just for test fixtures.
        let mut state = seed.wrapping_add(0x9E3779B97F4A7C15);
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64 / u64::MAX as f64) * 1000.0
        };
        (0..n).map(|_| (next(), next())).collect()
    }

    #[test]
    fn unfiltered_select_over_indexed_file_matches_linear_order() {
        let points = random_points(50, 1);
        let bytes = crate::test_support::build_fgb_with_index(&points, 8);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().index_node_size, 8);

        let got: Vec<_> = reader
            .select(None)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(got.len(), points.len());
        for (feature, &(x, y)) in got.iter().zip(points.iter()) {
            match feature.geometry.as_ref().unwrap() {
                crate::geometry::Geometry::Point(c) => assert_eq!((c.x, c.y), (x, y)),
                other => panic!("expected point, got {other:?}"),
            }
        }
    }

    #[test]
    fn indexed_bbox_query_is_sound_and_complete() {
        let points = random_points(300, 2);
        let bytes = crate::test_support::build_fgb_with_index(&points, 16);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();

        let query = Rect::new(200.0, 200.0, 600.0, 600.0);
        let got: Vec<_> = reader
            .select(Some(query))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        let mut got_points: Vec<(f64, f64)> = got
            .iter()
            .map(|f| match f.geometry.as_ref().unwrap() {
                crate::geometry::Geometry::Point(c) => (c.x, c.y),
                other => panic!("expected point, got {other:?}"),
            })
            .collect();
        got_points.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let mut expected: Vec<(f64, f64)> = points
            .iter()
            .copied()
            .filter(|&(x, y)| Rect::new(x, y, x, y).intersects(&query))
            .collect();
        expected.sort_by(|a, b| a.partial_cmp(b).unwrap());

        assert_eq!(got_points, expected);
    }

    #[test]
    fn final_feature_with_unknown_length_is_still_fetched_when_it_matches() {
        // Last point is the one under query; its length can only be learned
        // via the extra length-prefix read (spec §4.F / §8 "Final-feature
        // handling").
        let points = vec![(0.0, 0.0), (500.0, 500.0), (999.0, 999.0)];
        let bytes = crate::test_support::build_fgb_with_index(&points, 4);
        let mut reader = Reader::open(Cursor::new(bytes)).unwrap();

        let query = Rect::new(998.0, 998.0, 999.5, 999.5);
        let got: Vec<_> = reader
            .select(Some(query))
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(got.len(), 1);
        match got[0].geometry.as_ref().unwrap() {
            crate::geometry::Geometry::Point(c) => assert_eq!((c.x, c.y), (999.0, 999.0)),
            other => panic!("expected point, got {other:?}"),
        }
    }
}
