use std::collections::VecDeque;
use std::future::Future;

use crate::error::Result;
use crate::levels::generate_level_bounds;
use crate::node::{NodeItem, Rect, NODE_ITEM_LEN};
use crate::search::SearchResult;

#[derive(Debug, Clone, Copy)]
struct NodeRange {
    start: usize,
    end: usize,
    level: usize,
}

impl NodeRange {
    fn extend_end(&mut self, new_end: usize) {
        assert!(new_end > self.end, "NodeRange end must only grow");
        self.end = new_end;
    }
}

/// Async counterpart of [`crate::search::StreamSearch`], for sources (HTTP)
/// where each `read_node` call is a suspension point.
///
/// Unlike the sync traversal this does not expose a lazy `Iterator` —
/// driving a true async generator over a trait-object callback needs extra
/// machinery this crate doesn't pull in, and the hits themselves are cheap,
/// fixed-size tuples rather than feature payloads, so collecting them into
/// a `Vec` before returning costs little. The expensive, truly lazy part of
/// a query — streaming feature bytes — happens one layer up, in the feature
/// fetch stage, which *is* a lazy async sequence.
pub async fn stream_search_async<F, Fut>(
    num_items: usize,
    node_size: u16,
    rect: Rect,
    extra_request_threshold: usize,
    mut read_node: F,
) -> Result<Vec<SearchResult>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    let level_bounds = generate_level_bounds(num_items, node_size)?;
    let first_leaf_node_idx = level_bounds[0].0;
    let root_level = level_bounds.len() - 1;
    let node_size_usize = node_size.clamp(2, 65535) as usize;
    let extra_request_threshold_nodes = extra_request_threshold / NODE_ITEM_LEN;

    let mut queue = VecDeque::new();
    queue.push_back(NodeRange {
        start: 0,
        end: 1,
        level: root_level,
    });

    let mut results = Vec::new();

    while let Some(node_range) = queue.pop_front() {
        let is_leaf = node_range.start >= first_leaf_node_idx;
        let level_end = level_bounds[node_range.level].1;

        let tentative_end = (node_range.end + node_size_usize).min(level_end);
        let expanded_end = if is_leaf && tentative_end < level_end {
            tentative_end + 1
        } else {
            tentative_end
        };

        let num_nodes = expanded_end - node_range.start;
        let buf = read_node(
            node_range.start * NODE_ITEM_LEN,
            num_nodes * NODE_ITEM_LEN,
        )
        .await?;

        for node_idx in node_range.start..expanded_end {
            let local = node_idx - node_range.start;
            let byte_start = local * NODE_ITEM_LEN;
            let node = NodeItem::from_bytes(&buf[byte_start..byte_start + NODE_ITEM_LEN])?;

            if !node.rect.intersects(&rect) {
                continue;
            }

            if is_leaf {
                // The successor node needed to derive this leaf's length may
                // be the one-extra-leaf fetched past `tentative_end` — but
                // for the last node actually read into `buf`, there is no
                // successor in the buffer at all. Treat that the same as the
                // true last leaf: length unknown.
                let next_byte_start = (local + 1) * NODE_ITEM_LEN;
                let feature_length = if node_idx < num_items - 1
                    && next_byte_start + NODE_ITEM_LEN <= buf.len()
                {
                    let next = NodeItem::from_bytes(
                        &buf[next_byte_start..next_byte_start + NODE_ITEM_LEN],
                    )?;
                    Some((next.offset - node.offset) as u64)
                } else {
                    None
                };
                results.push(SearchResult {
                    feature_offset: node.offset as u64,
                    feature_index: node_idx - first_leaf_node_idx,
                    feature_length,
                });
                continue;
            }

            let child = node.offset as usize;
            match queue.back_mut() {
                Some(peer)
                    if peer.level == node_range.level - 1
                        && child < peer.end + extra_request_threshold_nodes =>
                {
                    peer.extend_end(child + 1);
                }
                _ => {
                    queue.push_back(NodeRange {
                        start: child,
                        end: child + 1,
                        level: node_range.level - 1,
                    });
                }
            }
        }
    }

    Ok(results)
}
