use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Size in bytes of a single packed r-tree node on disk: four `f64` envelope
/// coordinates plus one `i64` offset/child-index.
pub const NODE_ITEM_LEN: usize = 8 * 4 + 8;

/// An axis-aligned bounding rectangle in the file's native CRS.
///
/// No normalization is performed; an inverted or `NaN` rect simply never
/// intersects anything, since every comparison below is a `<`/`>` test that
/// is false whenever either side is `NaN`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// `true` iff `self` and `other` overlap (touching edges count).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.max_x >= other.min_x
            && self.max_y >= other.min_y
            && self.min_x <= other.max_x
            && self.min_y <= other.max_y
    }
}

/// A decoded 40-byte packed r-tree node.
///
/// For a leaf node, `offset` is the byte position of the feature relative to
/// the start of the features section. For an inner node, `offset` is the
/// global index of the node's first child in the packed node array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeItem {
    pub rect: Rect,
    pub offset: i64,
}

impl NodeItem {
    /// Decode a single node from a `NODE_ITEM_LEN`-byte little-endian slice.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < NODE_ITEM_LEN {
            return Err(Error::ShortRead {
                expected: NODE_ITEM_LEN,
                actual: buf.len(),
            });
        }
        let min_x = LittleEndian::read_f64(&buf[0..8]);
        let min_y = LittleEndian::read_f64(&buf[8..16]);
        let max_x = LittleEndian::read_f64(&buf[16..24]);
        let max_y = LittleEndian::read_f64(&buf[24..32]);
        let offset = LittleEndian::read_i64(&buf[32..40]);
        Ok(Self {
            rect: Rect::new(min_x, min_y, max_x, max_y),
            offset,
        })
    }

    /// Encode this node to exactly `NODE_ITEM_LEN` little-endian bytes.
    /// Not used by the reader, kept for round-trip tests and for callers
    /// that build synthetic trees in-memory.
    pub fn to_bytes(&self) -> [u8; NODE_ITEM_LEN] {
        let mut buf = [0u8; NODE_ITEM_LEN];
        LittleEndian::write_f64(&mut buf[0..8], self.rect.min_x);
        LittleEndian::write_f64(&mut buf[8..16], self.rect.min_y);
        LittleEndian::write_f64(&mut buf[16..24], self.rect.max_x);
        LittleEndian::write_f64(&mut buf[24..32], self.rect.max_y);
        LittleEndian::write_i64(&mut buf[32..40], self.offset);
        buf
    }
}
