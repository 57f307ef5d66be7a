use super::geometry::{decode_geometry, RawGeometry};
use super::header::{decode_column, ColumnMeta};
use super::{get_scalar_vec, get_table, get_table_vec, root_table};
use crate::error::Result;

/// Decoded `Feature` table. `properties` is the raw column-encoded byte
/// blob described in the FlatGeobuf spec (tag/value pairs keyed by column
/// index into the header's column list); this crate doesn't interpret it
/// any further than exposing the bytes, since doing so requires the
/// header's column schema, which [`crate::reader`]/[`crate::http_reader`]
/// already have in hand.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub geometry: Option<RawGeometry>,
    pub properties: Option<Vec<u8>>,
    /// Per-feature column schema override. Rare in practice — almost every
    /// FlatGeobuf file relies solely on the header's columns — but the
    /// field exists on the wire, so we decode it rather than ignore it.
    pub columns: Option<Vec<ColumnMeta>>,
}

pub fn decode_feature(bytes: &[u8]) -> Result<RawFeature> {
    let table = root_table(bytes)?;

    let geometry = match get_table(&table, 0) {
        Some(t) => Some(decode_geometry(&t)?),
        None => None,
    };

    let properties = get_scalar_vec::<u8>(&table, 1);

    let columns = match get_table_vec(&table, 2) {
        Some(tables) => {
            let mut decoded = Vec::with_capacity(tables.len());
            for t in &tables {
                decoded.push(decode_column(t)?);
            }
            Some(decoded)
        }
        None => None,
    };

    Ok(RawFeature {
        geometry,
        properties,
        columns,
    })
}
