//! Packed Hilbert R-tree layout and streaming search, as used by
//! FlatGeobuf: level-bounds arithmetic, node decoding, and a breadth-first
//! traversal that reads only the node ranges a query actually touches.
//!
//! This crate owns no I/O. Callers supply a `read_node(byte_offset, length)`
//! closure (sync or async) that fetches raw node bytes from wherever the
//! tree actually lives — a local file, an HTTP range client, memory.

mod error;
mod levels;
mod node;
mod search;
mod search_async;

pub use error::{Error, Result};
pub use levels::{calc_tree_size, generate_level_bounds, DEFAULT_NODE_SIZE};
pub use node::{NodeItem, Rect, NODE_ITEM_LEN};
pub use search::{SearchResult, StreamSearch};
pub use search_async::stream_search_async;
