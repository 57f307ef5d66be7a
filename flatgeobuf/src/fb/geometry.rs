use flatbuffers::Table;

use super::{get_scalar, get_scalar_vec, get_table_vec, GeometryType};
use crate::error::Result;

/// The `Geometry` table, decoded but not yet interpreted: flat coordinate
/// arrays plus the part boundaries needed to regroup them into rings,
/// linestrings, or collection members. [`crate::geometry::Geometry`] turns
/// this into the duck-typed shape the rest of the crate works with.
#[derive(Debug, Clone)]
pub struct RawGeometry {
    /// Cumulative vertex-count boundaries, one per ring/part. Absent for
    /// geometries with a single part (e.g. a `LineString`).
    pub ends: Option<Vec<u32>>,
    /// Interleaved x,y pairs: `[x0, y0, x1, y1, ...]`.
    pub xy: Vec<f64>,
    pub z: Option<Vec<f64>>,
    pub m: Option<Vec<f64>>,
    pub t: Option<Vec<f64>>,
    pub tm: Option<Vec<u64>>,
    pub geometry_type: GeometryType,
    /// Present only for `GeometryCollection` (and, in principle, nested
    /// multi-curve/-surface types the core doesn't specially interpret).
    pub parts: Option<Vec<RawGeometry>>,
}

pub fn decode_geometry(table: &Table<'_>) -> Result<RawGeometry> {
    let ends = get_scalar_vec::<u32>(table, 0);
    let xy = get_scalar_vec::<f64>(table, 1).unwrap_or_default();
    let z = get_scalar_vec::<f64>(table, 2);
    let m = get_scalar_vec::<f64>(table, 3);
    let t = get_scalar_vec::<f64>(table, 4);
    let tm = get_scalar_vec::<u64>(table, 5);
    let geometry_type = GeometryType::from_u8(get_scalar::<u8>(table, 6, 0))?;

    let parts = match get_table_vec(table, 7) {
        Some(tables) => {
            let mut decoded = Vec::with_capacity(tables.len());
            for t in &tables {
                decoded.push(decode_geometry(t)?);
            }
            Some(decoded)
        }
        None => None,
    };

    Ok(RawGeometry {
        ends,
        xy,
        z,
        m,
        t,
        tm,
        geometry_type,
        parts,
    })
}
