//! Planar geometry used by the place tables.
//!
//! Coordinates are WGS84 degrees and all distances are measured in degrees, matching the
//! way the search thresholds (`0.006`, `0.001`, the viewbox expansions) are expressed.
//! [`Geometry`] wraps a [`geo::Geometry`] and caches its bounding box so the spatial index
//! and the filter predicates never have to recompute it.

use geo::{BoundingRect, Centroid, Closest, ClosestPoint, Contains, Intersects, LineString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{DataError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Square box of side `2 * buffer` around the point.
    pub fn to_bbox(self, buffer: f64) -> Bbox {
        Bbox::new(
            self.x - buffer,
            self.y - buffer,
            self.x + buffer,
            self.y + buffer,
        )
    }
}

impl From<Point> for geo::Point<f64> {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

impl From<geo::Point<f64>> for Point {
    fn from(p: geo::Point<f64>) -> Self {
        Self::new(p.x(), p.y())
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned bounding box. The constructor normalises the corner order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl Bbox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            minx: x1.min(x2),
            miny: y1.min(y2),
            maxx: x1.max(x2),
            maxy: y1.max(y2),
        }
    }

    pub fn from_point(p: Point, buffer: f64) -> Self {
        p.to_bbox(buffer)
    }

    pub fn area(&self) -> f64 {
        (self.maxx - self.minx) * (self.maxy - self.miny)
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.minx + self.maxx) / 2.0,
            (self.miny + self.maxy) / 2.0,
        )
    }

    pub fn contains(&self, p: &Point) -> bool {
        p.x >= self.minx && p.x <= self.maxx && p.y >= self.miny && p.y <= self.maxy
    }

    pub fn intersects(&self, other: &Self) -> bool {
        self.minx <= other.maxx
            && other.minx <= self.maxx
            && self.miny <= other.maxy
            && other.miny <= self.maxy
    }

    /// Grow the box by `buffer` on every side.
    pub fn expand(&self, buffer: f64) -> Self {
        Self::new(
            self.minx - buffer,
            self.miny - buffer,
            self.maxx + buffer,
            self.maxy + buffer,
        )
    }

    /// Box of twice the width and height around the same center.
    pub fn scaled_by_two(&self) -> Self {
        let dx = (self.maxx - self.minx) / 2.0;
        let dy = (self.maxy - self.miny) / 2.0;
        Self::new(
            self.minx - dx,
            self.miny - dy,
            self.maxx + dx,
            self.maxy + dy,
        )
    }

    pub fn to_rect(self) -> geo::Rect<f64> {
        geo::Rect::new(
            geo::Coord {
                x: self.minx,
                y: self.miny,
            },
            geo::Coord {
                x: self.maxx,
                y: self.maxy,
            },
        )
    }
}

/// A place geometry together with its cached envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    inner: geo::Geometry<f64>,
    envelope: Bbox,
}

impl Geometry {
    pub fn new(inner: geo::Geometry<f64>) -> Result<Self> {
        let rect = inner
            .bounding_rect()
            .ok_or_else(|| DataError::InvalidGeometry("geometry has no coordinates".into()))?;
        let envelope = Bbox::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y);
        Ok(Self { inner, envelope })
    }

    pub fn point(p: Point) -> Self {
        Self {
            inner: geo::Geometry::Point(p.into()),
            envelope: Bbox::new(p.x, p.y, p.x, p.y),
        }
    }

    pub fn line(coords: &[(f64, f64)]) -> Result<Self> {
        if coords.len() < 2 {
            return Err(DataError::InvalidGeometry(
                "a line needs at least two coordinates".into(),
            ));
        }
        Self::new(geo::Geometry::LineString(LineString::from(coords.to_vec())))
    }

    /// Polygon from its exterior ring. The ring is closed automatically.
    pub fn polygon(ring: &[(f64, f64)]) -> Result<Self> {
        if ring.len() < 3 {
            return Err(DataError::InvalidGeometry(
                "a polygon needs at least three coordinates".into(),
            ));
        }
        Self::new(geo::Geometry::Polygon(geo::Polygon::new(
            LineString::from(ring.to_vec()),
            vec![],
        )))
    }

    pub fn rect(bbox: Bbox) -> Self {
        Self {
            inner: geo::Geometry::Polygon(bbox.to_rect().to_polygon()),
            envelope: bbox,
        }
    }

    pub fn from_geojson(geojson: &str) -> Result<Self> {
        let parsed: geojson::Geometry = geojson.parse::<geojson::Geometry>()?;
        Self::try_from(parsed)
    }

    pub const fn inner(&self) -> &geo::Geometry<f64> {
        &self.inner
    }

    pub const fn bbox(&self) -> Bbox {
        self.envelope
    }

    pub fn centroid(&self) -> Point {
        self.inner
            .centroid()
            .map_or_else(|| self.envelope.center(), Point::from)
    }

    pub const fn is_area(&self) -> bool {
        matches!(
            self.inner,
            geo::Geometry::Polygon(_)
                | geo::Geometry::MultiPolygon(_)
                | geo::Geometry::Rect(_)
                | geo::Geometry::Triangle(_)
        )
    }

    pub const fn is_line(&self) -> bool {
        matches!(
            self.inner,
            geo::Geometry::LineString(_) | geo::Geometry::MultiLineString(_) | geo::Geometry::Line(_)
        )
    }

    pub const fn is_point(&self) -> bool {
        matches!(
            self.inner,
            geo::Geometry::Point(_) | geo::Geometry::MultiPoint(_)
        )
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.envelope.contains(p) && self.inner.contains(&geo::Point::from(*p))
    }

    pub fn intersects_bbox(&self, bbox: &Bbox) -> bool {
        self.envelope.intersects(bbox) && self.inner.intersects(&bbox.to_rect())
    }

    /// Point on the geometry closest to `p`.
    pub fn closest_point(&self, p: &Point) -> Option<Point> {
        match self.inner.closest_point(&geo::Point::from(*p)) {
            Closest::Intersection(c) | Closest::SinglePoint(c) => Some(c.into()),
            Closest::Indeterminate => None,
        }
    }

    /// Planar distance in degrees, zero when the point lies on or inside the geometry.
    pub fn distance_to(&self, p: &Point) -> f64 {
        if self.inner.intersects(&geo::Point::from(*p)) {
            return 0.0;
        }
        self.closest_point(p)
            .map_or(f64::INFINITY, |c| c.distance(p))
    }

    fn first_line(&self) -> Option<LineString<f64>> {
        match &self.inner {
            geo::Geometry::LineString(l) => Some(l.clone()),
            geo::Geometry::MultiLineString(m) => m.0.first().cloned(),
            geo::Geometry::Line(l) => Some(LineString::from(vec![l.start, l.end])),
            _ => None,
        }
    }

    /// Fraction (0..=1) along the line of the point closest to `p`.
    pub fn line_locate_point(&self, p: &Point) -> Option<f64> {
        let line = self.first_line()?;
        let total = line_length(&line);
        if total <= 0.0 {
            return Some(0.0);
        }
        let mut walked = 0.0;
        let mut best: Option<(f64, f64)> = None;
        for segment in line.lines() {
            let (sx, sy) = (segment.start.x, segment.start.y);
            let (dx, dy) = (segment.end.x - sx, segment.end.y - sy);
            let seg_len = dx.hypot(dy);
            let t = if seg_len > 0.0 {
                (((p.x - sx) * dx + (p.y - sy) * dy) / (seg_len * seg_len)).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let dist = (sx + t * dx - p.x).hypot(sy + t * dy - p.y);
            if best.is_none_or(|(d, _)| dist < d) {
                best = Some((dist, (walked + t * seg_len) / total));
            }
            walked += seg_len;
        }
        best.map(|(_, fraction)| fraction)
    }

    /// Point at `fraction` (clamped to 0..=1) of the line length.
    pub fn line_interpolate_point(&self, fraction: f64) -> Option<Point> {
        let line = self.first_line()?;
        let first = line.0.first()?;
        let total = line_length(&line);
        let target = fraction.clamp(0.0, 1.0) * total;
        if total <= 0.0 {
            return Some(Point::new(first.x, first.y));
        }
        let mut walked = 0.0;
        for segment in line.lines() {
            let (dx, dy) = (segment.end.x - segment.start.x, segment.end.y - segment.start.y);
            let seg_len = dx.hypot(dy);
            if walked + seg_len >= target && seg_len > 0.0 {
                let t = (target - walked) / seg_len;
                return Some(Point::new(
                    segment.start.x + t * dx,
                    segment.start.y + t * dy,
                ));
            }
            walked += seg_len;
        }
        line.0.last().map(|c| Point::new(c.x, c.y))
    }
}

fn line_length(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|s| (s.end.x - s.start.x).hypot(s.end.y - s.start.y))
        .sum()
}

impl TryFrom<geojson::Geometry> for Geometry {
    type Error = DataError;

    fn try_from(value: geojson::Geometry) -> Result<Self> {
        let inner: geo::Geometry<f64> = value.try_into()?;
        Self::new(inner)
    }
}

impl Serialize for Geometry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        geojson::Geometry::new(geojson::Value::from(&self.inner)).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Geometry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = geojson::Geometry::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Geometry {
        Geometry::polygon(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]).unwrap()
    }

    #[test]
    fn test_polygon_contains_and_distance() {
        let geom = square();
        assert!(geom.is_area());
        assert!(geom.contains(&Point::new(0.5, 0.5)));
        assert!(!geom.contains(&Point::new(1.5, 0.5)));
        assert_eq!(geom.distance_to(&Point::new(0.5, 0.5)), 0.0);
        assert!((geom.distance_to(&Point::new(1.5, 0.5)) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_line_locate_and_interpolate() {
        let line = Geometry::line(&[(0.0, 0.0), (2.0, 0.0)]).unwrap();
        assert!(line.is_line());
        let pos = line.line_locate_point(&Point::new(0.5, 1.0)).unwrap();
        assert!((pos - 0.25).abs() < 1e-9);
        let p = line.line_interpolate_point(0.75).unwrap();
        assert!((p.x - 1.5).abs() < 1e-9 && p.y.abs() < 1e-9);
        assert!(square().line_locate_point(&Point::new(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_bbox_helpers() {
        let bbox = Bbox::new(2.0, 2.0, 0.0, 0.0);
        assert_eq!(bbox.minx, 0.0);
        assert_eq!(bbox.area(), 4.0);
        let doubled = bbox.scaled_by_two();
        assert_eq!(doubled, Bbox::new(-1.0, -1.0, 3.0, 3.0));
        assert!(bbox.intersects(&Bbox::new(1.5, 1.5, 5.0, 5.0)));
        assert!(!bbox.intersects(&Bbox::new(2.5, 2.5, 5.0, 5.0)));
    }

    #[test]
    fn test_geojson_parsing() {
        let geom =
            Geometry::from_geojson(r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#).unwrap();
        assert!(geom.is_line());
        assert_eq!(geom.bbox(), Bbox::new(0.0, 0.0, 1.0, 1.0));
        assert!(Geometry::from_geojson(r#"{"type":"Nope"}"#).is_err());
    }
}
