//! Shared fixture builder for the sync and async reader test suites: a
//! real, valid, in-memory FlatGeobuf file with an actual packed r-tree
//! index, assembled the same way the seed tests in spec §8 describe
//! (countries.fgb-shaped, just synthetic). Only compiled for tests.

use flatbuffers::FlatBufferBuilder;

use packed_rtree::{calc_tree_size, generate_level_bounds, NodeItem, Rect, NODE_ITEM_LEN};

fn slot(field_index: usize) -> flatbuffers::VOffsetT {
    (4 + 2 * field_index) as flatbuffers::VOffsetT
}

fn build_point_feature(x: f64, y: f64) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();
    let xy = fbb.create_vector(&[x, y]);
    let geom_start = fbb.start_table();
    fbb.push_slot_always(slot(1), xy);
    let geom_end = fbb.end_table(geom_start);

    let feature_start = fbb.start_table();
    fbb.push_slot_always(slot(0), geom_end);
    let feature_end = fbb.end_table(feature_start);
    fbb.finish_minimal(feature_end);
    fbb.finished_data().to_vec()
}

fn build_header(features_count: u64, index_node_size: u16) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();
    let header_start = fbb.start_table();
    fbb.push_slot::<u8>(slot(2), 1, 0); // geometry_type = Point
    fbb.push_slot::<u64>(slot(8), features_count, 0);
    fbb.push_slot::<u16>(slot(9), index_node_size, 0);
    let header_end = fbb.end_table(header_start);
    fbb.finish_minimal(header_end);
    fbb.finished_data().to_vec()
}

/// Bottom-up packed r-tree over point leaves, root-first on disk, matching
/// the layout `packed_rtree::generate_level_bounds` describes.
fn build_tree_bytes(leaf_rects: &[Rect], leaf_offsets: &[i64], node_size: u16) -> Vec<u8> {
    let num_items = leaf_rects.len();
    let level_bounds = generate_level_bounds(num_items, node_size).unwrap();
    let total_nodes = calc_tree_size(num_items, node_size) / NODE_ITEM_LEN;

    let mut nodes = vec![
        NodeItem {
            rect: Rect::new(0.0, 0.0, 0.0, 0.0),
            offset: 0,
        };
        total_nodes
    ];

    let (leaf_start, _leaf_end) = level_bounds[0];
    for (i, rect) in leaf_rects.iter().enumerate() {
        nodes[leaf_start + i] = NodeItem {
            rect: *rect,
            offset: leaf_offsets[i],
        };
    }

    for level in 1..level_bounds.len() {
        let (start, end) = level_bounds[level];
        let (child_start, child_end) = level_bounds[level - 1];
        let mut child_idx = child_start;
        for idx in start..end {
            let first_child = child_idx;
            let chunk_end = (child_idx + node_size as usize).min(child_end);
            let mut rect = nodes[first_child].rect;
            for c in first_child..chunk_end {
                let r = nodes[c].rect;
                rect = Rect::new(
                    rect.min_x.min(r.min_x),
                    rect.min_y.min(r.min_y),
                    rect.max_x.max(r.max_x),
                    rect.max_y.max(r.max_y),
                );
            }
            nodes[idx] = NodeItem {
                rect,
                offset: first_child as i64,
            };
            child_idx = chunk_end;
        }
    }

    let mut buf = Vec::with_capacity(total_nodes * NODE_ITEM_LEN);
    for node in &nodes {
        buf.extend_from_slice(&node.to_bytes());
    }
    buf
}

/// A complete in-memory FlatGeobuf file over point features, with a real
/// packed r-tree index built at `node_size`. Each point's envelope is
/// degenerate (min == max == the point itself), which is enough to
/// exercise bbox soundness/completeness and batching.
pub fn build_fgb_with_index(points: &[(f64, f64)], node_size: u16) -> Vec<u8> {
    let header_bytes = build_header(points.len() as u64, node_size);

    let mut feature_blobs = Vec::with_capacity(points.len());
    let mut offsets = Vec::with_capacity(points.len());
    let mut cursor = 0i64;
    for &(x, y) in points {
        let blob = build_point_feature(x, y);
        offsets.push(cursor);
        cursor += 4 + blob.len() as i64;
        feature_blobs.push(blob);
    }

    let leaf_rects: Vec<Rect> = points
        .iter()
        .map(|&(x, y)| Rect::new(x, y, x, y))
        .collect();
    let tree_bytes = build_tree_bytes(&leaf_rects, &offsets, node_size);

    let mut buf = Vec::new();
    buf.extend_from_slice(&[0x66, 0x67, 0x62, 0x03]);
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&header_bytes);
    buf.extend_from_slice(&tree_bytes);
    for blob in &feature_blobs {
        buf.extend_from_slice(&(blob.len() as u32).to_le_bytes());
        buf.extend_from_slice(blob);
    }
    buf
}
