//! Hand-written decoders for the two FlatBuffers tables FlatGeobuf actually
//! uses on the wire: `Header` and `Feature` (and the `Geometry`/`Column`
//! tables nested inside them).
//!
//! There is no `flatc`-generated code here — no `.fbs` schema is compiled at
//! build time. Instead we walk the tables directly with the low-level
//! `flatbuffers::Table` API, using the field order of the published
//! FlatGeobuf schema as the contract. This is a thin, read-only collaborator:
//! spec §6 treats `decode_header`/`decode_feature` as an external interface,
//! and that's the only thing this module provides.

mod feature;
mod geometry;
mod header;
mod properties;

pub use feature::{decode_feature, RawFeature};
pub use geometry::{decode_geometry, RawGeometry};
pub use header::{decode_header, ColumnMeta, CrsMeta, HeaderMeta};
pub use properties::decode_properties;

use flatbuffers::{Follow, ForwardsUOffset, Table, Vector, VOffsetT};

use crate::error::{Error, Result};

/// FlatBuffers vtable slots start at field index 0; byte offset of field `i`
/// within the vtable is `4 + 2*i` (slots 0 and 1 are the vtable's own
/// metadata).
fn slot(field_index: usize) -> VOffsetT {
    (4 + 2 * field_index) as VOffsetT
}

pub(crate) fn root_table(buf: &[u8]) -> Result<Table<'_>> {
    if buf.len() < 4 {
        return Err(Error::InvalidFlatbuffer(
            "buffer too short to contain a root offset".into(),
        ));
    }
    let root_offset = flatbuffers::read_scalar::<u32>(&buf[0..4]) as usize;
    if root_offset >= buf.len() {
        return Err(Error::InvalidFlatbuffer("root offset out of bounds".into()));
    }
    Ok(unsafe { Table::new(buf, root_offset) })
}

pub(crate) fn get_scalar<'a, T>(table: &Table<'a>, field_index: usize, default: T) -> T
where
    T: Follow<'a, Inner = T> + Copy + 'a,
{
    unsafe { table.get::<T>(slot(field_index), Some(default)) }.unwrap_or(default)
}

pub(crate) fn get_str<'a>(table: &Table<'a>, field_index: usize) -> Option<&'a str> {
    unsafe { table.get::<ForwardsUOffset<&'a str>>(slot(field_index), None) }
}

pub(crate) fn get_string(table: &Table<'_>, field_index: usize) -> Option<String> {
    get_str(table, field_index).map(str::to_owned)
}

pub(crate) fn get_scalar_vec<'a, T>(table: &Table<'a>, field_index: usize) -> Option<Vec<T>>
where
    T: Follow<'a, Inner = T> + Copy + 'a,
{
    let v = unsafe { table.get::<ForwardsUOffset<Vector<'a, T>>>(slot(field_index), None) }?;
    Some(v.iter().collect())
}

pub(crate) fn get_table<'a>(table: &Table<'a>, field_index: usize) -> Option<Table<'a>> {
    unsafe { table.get::<ForwardsUOffset<Table<'a>>>(slot(field_index), None) }
}

pub(crate) fn get_table_vec<'a>(table: &Table<'a>, field_index: usize) -> Option<Vec<Table<'a>>> {
    let v = unsafe {
        table.get::<ForwardsUOffset<Vector<'a, ForwardsUOffset<Table<'a>>>>>(
            slot(field_index),
            None,
        )
    }?;
    Some((0..v.len()).map(|i| v.get(i)).collect())
}

/// `geometry_type` discriminant, shared by `Header.geometry_type` and
/// `Geometry.type`. Curve and surface variants are accepted on decode (so a
/// well-formed file round-trips) but nothing in this crate interprets them
/// beyond the flat coordinate arrays they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryType {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
    GeometryCollection = 7,
    CircularString = 8,
    CompoundCurve = 9,
    CurvePolygon = 10,
    MultiCurve = 11,
    MultiSurface = 12,
    Curve = 13,
    Surface = 14,
    PolyhedralSurface = 15,
    Tin = 16,
    Triangle = 17,
}

// Discriminants above mirror the published FlatGeobuf `GeometryType` enum
// order exactly; `from_u8` below must stay in lockstep with it.

impl GeometryType {
    fn from_u8(v: u8) -> Result<Self> {
        use GeometryType::*;
        Ok(match v {
            0 => Unknown,
            1 => Point,
            2 => LineString,
            3 => Polygon,
            4 => MultiPoint,
            5 => MultiLineString,
            6 => MultiPolygon,
            7 => GeometryCollection,
            8 => CircularString,
            9 => CompoundCurve,
            10 => CurvePolygon,
            11 => MultiCurve,
            12 => MultiSurface,
            13 => Curve,
            14 => Surface,
            15 => PolyhedralSurface,
            16 => Tin,
            17 => Triangle,
            other => {
                return Err(Error::InvalidFlatbuffer(format!(
                    "unknown geometry_type discriminant {other}"
                )))
            }
        })
    }
}

/// `Column.type` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Byte,
    UByte,
    Bool,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    String,
    Json,
    DateTime,
    Binary,
}

impl ColumnType {
    fn from_u8(v: u8) -> Result<Self> {
        use ColumnType::*;
        Ok(match v {
            0 => Byte,
            1 => UByte,
            2 => Bool,
            3 => Short,
            4 => UShort,
            5 => Int,
            6 => UInt,
            7 => Long,
            8 => ULong,
            9 => Float,
            10 => Double,
            11 => String,
            12 => Json,
            13 => DateTime,
            14 => Binary,
            other => {
                return Err(Error::UnsupportedColumnType(format!(
                    "unknown column type discriminant {other}"
                )))
            }
        })
    }
}
