//! Optional exact geometry-vs-bbox filter (spec §6's `intersects`
//! collaborator). The core reader never calls this — every bbox query
//! already yields a bbox-only match (spec §8 "bbox soundness" is defined
//! against node envelopes, not exact geometry) — but callers that want to
//! collapse envelope hits to true geometric intersections can run results
//! through [`intersects_exact`]. Grounded on `bbox_filter.py`'s
//! `BBoxFilter`, reimplemented with `geo`'s `Intersects` instead of Shapely.

use geo::{Coord as GeoCoord, Intersects, LineString, MultiPolygon, Polygon, Rect as GeoRect};
use packed_rtree::Rect;

use crate::geometry::{Coord, Geometry};

fn to_geo_coord(c: Coord) -> GeoCoord<f64> {
    GeoCoord { x: c.x, y: c.y }
}

fn to_line_string(coords: &[Coord]) -> LineString<f64> {
    LineString::new(coords.iter().copied().map(to_geo_coord).collect())
}

fn to_polygon(rings: &[Vec<Coord>]) -> Polygon<f64> {
    let mut rings = rings.iter();
    let exterior = rings.next().map(|r| to_line_string(r)).unwrap_or_default();
    let interiors = rings.map(|r| to_line_string(r)).collect();
    Polygon::new(exterior, interiors)
}

fn to_geo_rect(rect: Rect) -> GeoRect<f64> {
    GeoRect::new(
        GeoCoord {
            x: rect.min_x,
            y: rect.min_y,
        },
        GeoCoord {
            x: rect.max_x,
            y: rect.max_y,
        },
    )
}

/// Does this geometry actually intersect `rect`, rather than merely having
/// an envelope that does? `Point`/`MultiPoint`/line geometries fall back to
/// point/line-vs-rect intersection; polygons get true polygon-vs-rect
/// intersection.
pub fn intersects_exact(geometry: &Geometry, rect: Rect) -> bool {
    let rect = to_geo_rect(rect);
    match geometry {
        Geometry::Point(c) => rect.intersects(&to_geo_coord(*c)),
        Geometry::MultiPoint(cs) => cs.iter().any(|c| rect.intersects(&to_geo_coord(*c))),
        Geometry::LineString(cs) => rect.intersects(&to_line_string(cs)),
        Geometry::MultiLineString(rings) => {
            rings.iter().any(|r| rect.intersects(&to_line_string(r)))
        }
        Geometry::Polygon(rings) => rect.intersects(&to_polygon(rings)),
        Geometry::MultiPolygon(polys) => {
            let polys: Vec<Polygon<f64>> = polys.iter().map(|r| to_polygon(r)).collect();
            rect.intersects(&MultiPolygon::new(polys))
        }
        Geometry::GeometryCollection(parts) => {
            parts.iter().any(|g| intersects_exact(g, rect_from(rect)))
        }
    }
}

fn rect_from(rect: GeoRect<f64>) -> Rect {
    Rect::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
}
