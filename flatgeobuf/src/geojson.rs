//! Conversion from this crate's [`crate::Feature`] to the `geojson` crate's
//! `Feature`/`Geometry` types. Purely a convenience collaborator — spec §6
//! only requires that *some* GeoJSON conversion exists alongside the core
//! reader, not that the core call into it.

use geojson::{feature::Id, Value};
use serde_json::Map;

use crate::error::{Error, Result};
use crate::geometry::{Coord, Geometry as FgbGeometry};
use crate::Feature;

fn position(c: Coord) -> Vec<f64> {
    match c.z {
        Some(z) => vec![c.x, c.y, z],
        None => vec![c.x, c.y],
    }
}

fn ring(coords: &[Coord]) -> Vec<Vec<f64>> {
    coords.iter().copied().map(position).collect()
}

fn to_geojson_geometry(geom: &FgbGeometry) -> geojson::Geometry {
    let value = match geom {
        FgbGeometry::Point(c) => Value::Point(position(*c)),
        FgbGeometry::MultiPoint(cs) => Value::MultiPoint(ring(cs)),
        FgbGeometry::LineString(cs) => Value::LineString(ring(cs)),
        FgbGeometry::MultiLineString(rings) => {
            Value::MultiLineString(rings.iter().map(|r| ring(r)).collect())
        }
        FgbGeometry::Polygon(rings) => Value::Polygon(rings.iter().map(|r| ring(r)).collect()),
        FgbGeometry::MultiPolygon(polys) => Value::MultiPolygon(
            polys
                .iter()
                .map(|rings| rings.iter().map(|r| ring(r)).collect())
                .collect(),
        ),
        FgbGeometry::GeometryCollection(parts) => {
            Value::GeometryCollection(parts.iter().map(to_geojson_geometry).collect())
        }
    };
    geojson::Geometry::new(value)
}

/// Convert a decoded [`Feature`] into a `geojson::Feature`. Properties are
/// carried through verbatim as a JSON object; a feature with no geometry
/// (legal on the wire — not every row in a FlatGeobuf file need have one)
/// becomes a GeoJSON feature with `geometry: null`.
pub fn to_geojson_feature(feature: &Feature) -> Result<geojson::Feature> {
    let geometry = feature.geometry.as_ref().map(to_geojson_geometry);

    let properties = match &feature.properties {
        Some(map) => {
            let json = serde_json::to_value(map)
                .map_err(|e| Error::CorruptFeature(format!("properties not representable as JSON: {e}")))?;
            match json {
                serde_json::Value::Object(obj) => Some(obj),
                _ => None,
            }
        }
        None => None,
    };

    Ok(geojson::Feature {
        bbox: None,
        geometry,
        id: None::<Id>,
        properties: properties.or_else(|| Some(Map::new())),
        foreign_members: None,
    })
}
