//! Land-boundary containment test.
//!
//! The country outlines (World Bank Admin0, 10m) are loaded once per run,
//! either straight from the `.shp` or from a GeoJSON export of it. The format
//! is picked by file extension.
//!
//! Coordinates outside every polygon are treated as open water.

use geo::{BoundingRect, Contains, Geometry, GeometryCollection, MultiPolygon, Point, Polygon, Rect};
use geojson::GeoJson;
use shapefile::Shape;
use std::path::Path;

use crate::logging::{self, Source};
use crate::model::GeotagError;

/// Land polygons with their bounding rectangles for a cheap prefilter.
pub struct LandMask {
    shapes: Vec<(Rect<f64>, Polygon<f64>)>,
}

impl LandMask {
    pub fn from_polygons<I>(polygons: I) -> Self
    where
        I: IntoIterator<Item = Polygon<f64>>,
    {
        let shapes = polygons
            .into_iter()
            .filter_map(|p| p.bounding_rect().map(|r| (r, p)))
            .collect();
        LandMask { shapes }
    }

    /// Parse a GeoJSON document (FeatureCollection, Feature or bare geometry).
    /// Only Polygon and MultiPolygon geometries are kept.
    pub fn from_geojson_str(text: &str) -> Result<Self, GeotagError> {
        let geojson: GeoJson = text
            .parse()
            .map_err(|e: geojson::Error| GeotagError::LandDataError(e.to_string()))?;
        let collection: GeometryCollection<f64> =
            geojson::quick_collection(&geojson).map_err(|e| GeotagError::LandDataError(e.to_string()))?;

        let mut polygons = Vec::new();
        for geometry in collection.0 {
            collect_polygons(geometry, &mut polygons);
        }

        if polygons.is_empty() {
            return Err(GeotagError::LandDataError("no polygon geometries found".to_string()));
        }
        Ok(LandMask::from_polygons(polygons))
    }

    /// Build a mask from shapefile records. Polygon shapes are kept, null
    /// records are skipped, any other shape type is an error.
    pub fn from_shapes(shapes: Vec<Shape>) -> Result<Self, GeotagError> {
        let mut polygons = Vec::new();
        for shape in shapes {
            match shape {
                Shape::Polygon(p) => polygons.extend(MultiPolygon::<f64>::from(p).0),
                Shape::NullShape => {}
                other => {
                    return Err(GeotagError::LandDataError(format!(
                        "expected polygon shapes, found {:?}",
                        other.shapetype()
                    )));
                }
            }
        }

        if polygons.is_empty() {
            return Err(GeotagError::LandDataError("no polygon shapes found".to_string()));
        }
        Ok(LandMask::from_polygons(polygons))
    }

    /// Load a `.shp` shapefile or a `.geojson`/`.json` document.
    pub fn load(path: &Path) -> Result<Self, GeotagError> {
        let mask = match LandFormat::of(path)? {
            LandFormat::Shapefile => {
                let shapes = shapefile::read_shapes(path)
                    .map_err(|e| GeotagError::LandDataError(format!("{}: {}", path.display(), e)))?;
                LandMask::from_shapes(shapes)?
            }
            LandFormat::GeoJson => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| GeotagError::LandDataError(format!("{}: {}", path.display(), e)))?;
                LandMask::from_geojson_str(&text)?
            }
        };
        logging::info(
            Source::Land,
            None,
            &format!("Loaded {} land polygons from {}", mask.len(), path.display()),
        );
        Ok(mask)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// True if the coordinate lies strictly inside any land polygon.
    /// Points on a boundary or inside a hole are not on land.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let point = Point::new(longitude, latitude);
        self.shapes
            .iter()
            .filter(|(rect, _)| in_rect(rect, longitude, latitude))
            .any(|(_, polygon)| polygon.contains(&point))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandFormat {
    Shapefile,
    GeoJson,
}

impl LandFormat {
    pub fn of(path: &Path) -> Result<Self, GeotagError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "shp" => Ok(LandFormat::Shapefile),
            "geojson" | "json" => Ok(LandFormat::GeoJson),
            _ => Err(GeotagError::LandDataError(format!(
                "{}: unsupported land dataset format (expected .shp or .geojson)",
                path.display()
            ))),
        }
    }
}

fn in_rect(rect: &Rect<f64>, x: f64, y: f64) -> bool {
    let (min, max) = (rect.min(), rect.max());
    min.x <= x && x <= max.x && min.y <= y && y <= max.y
}

fn collect_polygons(geometry: Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geometry {
        Geometry::Polygon(p) => out.push(p),
        Geometry::MultiPolygon(mp) => out.extend(mp.0),
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out);
            }
        }
        _ => {}
    }
}
