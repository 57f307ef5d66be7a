use flatbuffers::Table;

use super::{get_scalar, get_scalar_vec, get_string, get_table, get_table_vec, root_table};
use super::{ColumnType, GeometryType};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub width: i32,
    pub precision: i32,
    pub scale: i32,
    pub nullable: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub metadata: Option<String>,
}

pub(crate) fn decode_column(table: &Table<'_>) -> Result<ColumnMeta> {
    Ok(ColumnMeta {
        name: get_string(table, 0).unwrap_or_default(),
        column_type: ColumnType::from_u8(get_scalar::<u8>(table, 1, 0))?,
        title: get_string(table, 2),
        description: get_string(table, 3),
        width: get_scalar::<i32>(table, 4, -1),
        precision: get_scalar::<i32>(table, 5, -1),
        scale: get_scalar::<i32>(table, 6, -1),
        nullable: get_scalar::<bool>(table, 7, true),
        unique: get_scalar::<bool>(table, 8, false),
        primary_key: get_scalar::<bool>(table, 9, false),
        metadata: get_string(table, 10),
    })
}

#[derive(Debug, Clone)]
pub struct CrsMeta {
    pub org: Option<String>,
    pub code: i32,
    pub name: Option<String>,
    pub description: Option<String>,
    pub wkt: Option<String>,
    pub code_string: Option<String>,
}

fn decode_crs(table: &Table<'_>) -> CrsMeta {
    CrsMeta {
        org: get_string(table, 0),
        code: get_scalar::<i32>(table, 1, 0),
        name: get_string(table, 2),
        description: get_string(table, 3),
        wkt: get_string(table, 4),
        code_string: get_string(table, 5),
    }
}

/// Decoded `Header` table: everything the reader needs to locate the index
/// and feature stream, plus the metadata GeoJSON conversion needs (column
/// schema, CRS, free-text title/description).
#[derive(Debug, Clone)]
pub struct HeaderMeta {
    pub name: Option<String>,
    pub envelope: Option<Vec<f64>>,
    pub geometry_type: GeometryType,
    pub has_z: bool,
    pub has_m: bool,
    pub has_t: bool,
    pub has_tm: bool,
    pub columns: Vec<ColumnMeta>,
    pub features_count: u64,
    pub index_node_size: u16,
    pub crs: Option<CrsMeta>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<String>,
}

/// Decode the `Header` table from the header bytes handed over by the
/// reader (the `header_length` slice immediately following the magic and
/// length prefix). Infallible for well-formed input; raises
/// [`crate::error::Error::InvalidFlatbuffer`] or
/// [`crate::error::Error::UnsupportedColumnType`] only when the bytes
/// violate the FlatBuffers encoding itself.
pub fn decode_header(bytes: &[u8]) -> Result<HeaderMeta> {
    let table = root_table(bytes)?;

    let mut columns = Vec::new();
    if let Some(tables) = get_table_vec(&table, 7) {
        for col in &tables {
            columns.push(decode_column(col)?);
        }
    }

    let crs = get_table(&table, 10).map(|t| decode_crs(&t));

    Ok(HeaderMeta {
        name: get_string(&table, 0),
        envelope: get_scalar_vec::<f64>(&table, 1),
        geometry_type: GeometryType::from_u8(get_scalar::<u8>(&table, 2, 0))?,
        has_z: get_scalar::<bool>(&table, 3, false),
        has_m: get_scalar::<bool>(&table, 4, false),
        has_t: get_scalar::<bool>(&table, 5, false),
        has_tm: get_scalar::<bool>(&table, 6, false),
        columns,
        features_count: get_scalar::<u64>(&table, 8, 0),
        index_node_size: get_scalar::<u16>(&table, 9, 0),
        crs,
        title: get_string(&table, 11),
        description: get_string(&table, 12),
        metadata: get_string(&table, 13),
    })
}
