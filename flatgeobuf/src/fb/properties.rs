use std::collections::BTreeMap;

use super::{ColumnMeta, ColumnType};
use crate::error::{Error, Result};

/// Decode a feature's raw property blob into a name -> value map, using the
/// column schema (normally the header's, occasionally a feature-level
/// override) to know each column's type and position.
///
/// Wire format: a sequence of `(column_index: u16 LE, value)` pairs,
/// back to back, one entry per column actually present on this feature
/// (FlatGeobuf property sets are sparse — a feature may omit any column).
/// Fixed-width types are stored inline; `String`/`Json`/`DateTime`/`Binary`
/// are length-prefixed (`u32 LE` byte length, then the bytes).
pub fn decode_properties(
    bytes: &[u8],
    columns: &[ColumnMeta],
) -> Result<BTreeMap<String, serde_json::Value>> {
    let mut map = BTreeMap::new();
    let mut cursor = 0usize;
    while cursor < bytes.len() {
        if cursor + 2 > bytes.len() {
            return Err(Error::CorruptFeature(
                "property blob truncated mid column-index".into(),
            ));
        }
        let col_idx = u16::from_le_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
        cursor += 2;
        let column = columns.get(col_idx).ok_or_else(|| {
            Error::CorruptFeature(format!("property column index {col_idx} out of range"))
        })?;
        let (value, consumed) = decode_value(&bytes[cursor..], column.column_type)?;
        cursor += consumed;
        map.insert(column.name.clone(), value);
    }
    Ok(map)
}

fn need(bytes: &[u8], n: usize) -> Result<()> {
    if bytes.len() < n {
        Err(Error::CorruptFeature("property value truncated".into()))
    } else {
        Ok(())
    }
}

fn decode_value(bytes: &[u8], column_type: ColumnType) -> Result<(serde_json::Value, usize)> {
    use ColumnType::*;
    Ok(match column_type {
        Bool => {
            need(bytes, 1)?;
            (serde_json::Value::Bool(bytes[0] != 0), 1)
        }
        Byte => {
            need(bytes, 1)?;
            (serde_json::json!(bytes[0] as i8), 1)
        }
        UByte => {
            need(bytes, 1)?;
            (serde_json::json!(bytes[0]), 1)
        }
        Short => {
            need(bytes, 2)?;
            (serde_json::json!(i16::from_le_bytes([bytes[0], bytes[1]])), 2)
        }
        UShort => {
            need(bytes, 2)?;
            (serde_json::json!(u16::from_le_bytes([bytes[0], bytes[1]])), 2)
        }
        Int => {
            need(bytes, 4)?;
            (
                serde_json::json!(i32::from_le_bytes(bytes[0..4].try_into().unwrap())),
                4,
            )
        }
        UInt => {
            need(bytes, 4)?;
            (
                serde_json::json!(u32::from_le_bytes(bytes[0..4].try_into().unwrap())),
                4,
            )
        }
        Long => {
            need(bytes, 8)?;
            (
                serde_json::json!(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
                8,
            )
        }
        ULong => {
            need(bytes, 8)?;
            (
                serde_json::json!(u64::from_le_bytes(bytes[0..8].try_into().unwrap())),
                8,
            )
        }
        Float => {
            need(bytes, 4)?;
            (
                serde_json::json!(f32::from_le_bytes(bytes[0..4].try_into().unwrap())),
                4,
            )
        }
        Double => {
            need(bytes, 8)?;
            (
                serde_json::json!(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
                8,
            )
        }
        String | Json | DateTime => {
            need(bytes, 4)?;
            let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
            need(bytes, 4 + len)?;
            let s = std::str::from_utf8(&bytes[4..4 + len]).map_err(|e| {
                Error::CorruptFeature(format!("invalid utf8 in string property: {e}"))
            })?;
            (serde_json::Value::String(s.to_string()), 4 + len)
        }
        Binary => {
            need(bytes, 4)?;
            let len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
            need(bytes, 4 + len)?;
            let hex = bytes[4..4 + len]
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<String>();
            (serde_json::Value::String(hex), 4 + len)
        }
    })
}
