use crate::error::{Error, Result};
use crate::node::NODE_ITEM_LEN;

/// Default branching factor used by FlatGeobuf writers, and the value this
/// crate assumes when speculatively prefetching index bytes before the
/// header is known.
pub const DEFAULT_NODE_SIZE: u16 = 16;

fn clamp_node_size(node_size: u16) -> u16 {
    node_size.clamp(2, 65535)
}

/// Total byte length of a packed r-tree over `num_items` leaves with the
/// given branching factor, clamped into `[2, 65535]`.
///
/// Mirrors the reference `calc_tree_size`: accumulate `ceil(n / node_size)`
/// per level until a single root remains, then multiply by the per-node
/// byte length.
pub fn calc_tree_size(num_items: usize, node_size: u16) -> usize {
    if num_items == 0 {
        return 0;
    }
    let node_size = clamp_node_size(node_size) as usize;
    let mut n = num_items;
    let mut num_nodes = n;
    while n != 1 {
        n = n.div_ceil(node_size);
        num_nodes += n;
    }
    num_nodes * NODE_ITEM_LEN
}

/// Half-open `[start, end)` node-index bounds for every level, ordered from
/// the leaves (index 0) to the root (the last element).
///
/// The root occupies global index 0 in the on-disk layout (root-first),
/// which is why `level_bounds.last()` is always `(0, 1)` while
/// `level_bounds[0].0` is `total_nodes - num_items`, i.e. leaves are laid
/// out last.
pub fn generate_level_bounds(num_items: usize, node_size: u16) -> Result<Vec<(usize, usize)>> {
    if node_size < 2 {
        return Err(Error::NodeSizeTooSmall(node_size));
    }
    if num_items == 0 {
        return Err(Error::EmptyTree);
    }
    let node_size = node_size as usize;

    let mut n = num_items;
    let mut num_nodes = n;
    let mut level_num_nodes = vec![n];
    while n != 1 {
        n = n.div_ceil(node_size);
        num_nodes += n;
        level_num_nodes.push(n);
    }

    let mut level_offsets = Vec::with_capacity(level_num_nodes.len());
    let mut n = num_nodes;
    for &size in &level_num_nodes {
        level_offsets.push(n - size);
        n -= size;
    }

    Ok(level_offsets
        .iter()
        .zip(level_num_nodes.iter())
        .map(|(&start, &size)| (start, start + size))
        .collect())
}
