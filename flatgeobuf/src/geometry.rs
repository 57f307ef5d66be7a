//! Duck-typed geometry: a tagged enum over the geometry kinds FlatGeobuf
//! carries, each exposing the same flat-coordinate view regardless of
//! variant. Grounded on the generic geometry parsing in the reference
//! implementation's `generic/geometry.py`, which builds every concrete
//! geometry type out of the same `(xy, ends)` pair.

use crate::error::{Error, Result};
use crate::fb::{GeometryType as WireGeometryType, RawGeometry};

/// A single (x, y[, z]) vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Coord),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Vec<Vec<Coord>>),
    MultiPolygon(Vec<Vec<Vec<Coord>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    /// Every vertex of this geometry, in wire order, ignoring ring/part
    /// boundaries — the same flattened view `ends()`/`sub_parts()` let a
    /// caller regroup.
    pub fn flat_coordinates(&self) -> Vec<Coord> {
        match self {
            Geometry::Point(c) => vec![*c],
            Geometry::MultiPoint(cs) | Geometry::LineString(cs) => cs.clone(),
            Geometry::MultiLineString(rings) | Geometry::Polygon(rings) => {
                rings.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .flatten()
                .flatten()
                .copied()
                .collect(),
            Geometry::GeometryCollection(parts) => {
                parts.iter().flat_map(Geometry::flat_coordinates).collect()
            }
        }
    }

    /// Cumulative vertex counts marking where each ring/part ends, mirroring
    /// the wire `ends` array. `None` for single-part geometries (`Point`,
    /// `LineString`).
    pub fn ends(&self) -> Option<Vec<u32>> {
        match self {
            Geometry::Point(_) | Geometry::LineString(_) => None,
            Geometry::MultiPoint(cs) => Some(vec![cs.len() as u32]),
            Geometry::MultiLineString(rings) | Geometry::Polygon(rings) => {
                let mut acc = 0u32;
                Some(
                    rings
                        .iter()
                        .map(|r| {
                            acc += r.len() as u32;
                            acc
                        })
                        .collect(),
                )
            }
            Geometry::MultiPolygon(polys) => {
                let mut acc = 0u32;
                Some(
                    polys
                        .iter()
                        .flatten()
                        .map(|r| {
                            acc += r.len() as u32;
                            acc
                        })
                        .collect(),
                )
            }
            Geometry::GeometryCollection(_) => None,
        }
    }

    /// The nested geometries making up a `GeometryCollection`; empty for
    /// every other variant.
    pub fn sub_parts(&self) -> &[Geometry] {
        match self {
            Geometry::GeometryCollection(parts) => parts,
            _ => &[],
        }
    }
}

fn coords_from_flat(xy: &[f64], z: Option<&[f64]>, start: usize, end: usize) -> Vec<Coord> {
    (start..end)
        .map(|i| Coord {
            x: xy[2 * i],
            y: xy[2 * i + 1],
            z: z.map(|z| z[i]),
        })
        .collect()
}

fn rings_from_flat(xy: &[f64], z: Option<&[f64]>, ends: &[u32]) -> Vec<Vec<Coord>> {
    let mut start = 0usize;
    let mut rings = Vec::with_capacity(ends.len());
    for &end in ends {
        let end = end as usize;
        rings.push(coords_from_flat(xy, z, start, end));
        start = end;
    }
    rings
}

/// Build a [`Geometry`] from the header's declared geometry type and a
/// decoded wire geometry. The wire type takes priority when it is anything
/// other than `Unknown` (heterogeneous collections override the header's
/// per-layer default on a per-feature basis).
pub fn from_raw(header_type: WireGeometryType, raw: &RawGeometry) -> Result<Geometry> {
    let geometry_type = if raw.geometry_type == WireGeometryType::Unknown {
        header_type
    } else {
        raw.geometry_type
    };
    let z = raw.z.as_deref();

    Ok(match geometry_type {
        WireGeometryType::Point => {
            let coords = coords_from_flat(&raw.xy, z, 0, raw.xy.len() / 2);
            Geometry::Point(*coords.first().ok_or_else(|| {
                Error::CorruptFeature("point geometry has no coordinates".into())
            })?)
        }
        WireGeometryType::MultiPoint => {
            Geometry::MultiPoint(coords_from_flat(&raw.xy, z, 0, raw.xy.len() / 2))
        }
        WireGeometryType::LineString => {
            Geometry::LineString(coords_from_flat(&raw.xy, z, 0, raw.xy.len() / 2))
        }
        WireGeometryType::MultiLineString => {
            let ends = raw.ends.as_deref().ok_or_else(|| {
                Error::CorruptFeature("multilinestring geometry missing ends array".into())
            })?;
            Geometry::MultiLineString(rings_from_flat(&raw.xy, z, ends))
        }
        WireGeometryType::Polygon => {
            let ends = raw
                .ends
                .clone()
                .unwrap_or_else(|| vec![(raw.xy.len() / 2) as u32]);
            Geometry::Polygon(rings_from_flat(&raw.xy, z, &ends))
        }
        WireGeometryType::MultiPolygon => {
            let parts = raw.parts.as_deref().ok_or_else(|| {
                Error::CorruptFeature("multipolygon geometry missing parts array".into())
            })?;
            let mut polys = Vec::with_capacity(parts.len());
            for part in parts {
                let ends = part
                    .ends
                    .clone()
                    .unwrap_or_else(|| vec![(part.xy.len() / 2) as u32]);
                polys.push(rings_from_flat(&part.xy, part.z.as_deref(), &ends));
            }
            Geometry::MultiPolygon(polys)
        }
        WireGeometryType::GeometryCollection => {
            let parts = raw.parts.as_deref().ok_or_else(|| {
                Error::CorruptFeature("geometrycollection missing parts array".into())
            })?;
            let mut decoded = Vec::with_capacity(parts.len());
            for part in parts {
                decoded.push(from_raw(header_type, part)?);
            }
            Geometry::GeometryCollection(decoded)
        }
        other => {
            return Err(Error::CorruptFeature(format!(
                "geometry type {other:?} is not supported by this reader"
            )))
        }
    })
}
