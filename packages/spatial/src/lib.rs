#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! County boundary geometry and point-in-polygon lookups.
//!
//! The county boundary is a single (possibly multi-part) polygon built from
//! parcel data. Site filtering tests hundreds of thousands of register
//! points against it, so the polygon parts are loaded into an R-tree and
//! each lookup only runs the exact containment test against parts whose
//! bounding box holds the point.

pub mod crs;

use geo::{Area, BoundingRect, Contains, MapCoords, MultiPolygon, Point, Polygon};
use rstar::{AABB, RTree, RTreeObject};

pub use crs::{Crs, CrsTransform, bng_to_wgs84};

/// Errors that can occur during spatial operations.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// A CRS identifier was not recognised.
    #[error("Unknown CRS: {0}")]
    UnknownCrs(String),

    /// A projection definition or a point transform was rejected.
    #[error("Projection error: {0}")]
    Projection(#[from] proj4rs::errors::Error),

    /// A transform produced a non-finite coordinate.
    #[error("Coordinate ({x}, {y}) in {crs} has no finite transform")]
    NonFiniteCoordinate {
        /// Input x.
        x: f64,
        /// Input y.
        y: f64,
        /// Input CRS.
        crs: Crs,
    },

    /// JSON serialisation failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The unioned county polygon and the CRS its coordinates are in.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyBoundary {
    polygon: MultiPolygon<f64>,
    crs: Crs,
}

impl CountyBoundary {
    #[must_use]
    pub const fn new(polygon: MultiPolygon<f64>, crs: Crs) -> Self {
        Self { polygon, crs }
    }

    #[must_use]
    pub const fn polygon(&self) -> &MultiPolygon<f64> {
        &self.polygon
    }

    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Number of disjoint parts in the boundary.
    #[must_use]
    pub fn part_count(&self) -> usize {
        self.polygon.0.len()
    }

    /// Area in the squared units of the boundary's CRS.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }

    /// Returns a copy of the boundary with every vertex mapped into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if any vertex cannot be transformed.
    pub fn reproject(&self, target: Crs) -> Result<Self, SpatialError> {
        if target == self.crs {
            return Ok(self.clone());
        }
        let transform = self.crs.transform_to(target)?;
        log::debug!("Reprojecting boundary from {} to {target}", self.crs);
        Ok(Self {
            polygon: self.polygon.try_map_coords(|c| transform.apply(c))?,
            crs: target,
        })
    }

    /// Serialises the boundary as a single `GeoJSON` feature.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Json`] if serialisation fails.
    pub fn to_geojson_string(&self) -> Result<String, SpatialError> {
        let geometry = geojson::Geometry::new(geojson::Value::from(&self.polygon));
        let mut properties = geojson::JsonObject::new();
        properties.insert("crs".to_string(), self.crs.to_string().into());
        properties.insert("parts".to_string(), self.part_count().into());

        let feature = geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        };

        Ok(serde_json::to_string(&feature)?)
    }
}

/// Converts any polygonal [`geo::Geometry`] into a [`MultiPolygon`].
///
/// Geometry collections are flattened; non-polygonal members are dropped.
/// Returns `None` when nothing polygonal remains.
#[must_use]
pub fn geometry_to_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    let polygons = collect_polygons(geometry);
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon(polygons))
    }
}

fn collect_polygons(geometry: geo::Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        geo::Geometry::Polygon(p) => vec![p],
        geo::Geometry::MultiPolygon(mp) => mp.0,
        geo::Geometry::Rect(r) => vec![r.to_polygon()],
        geo::Geometry::GeometryCollection(gc) => {
            gc.0.into_iter().flat_map(collect_polygons).collect()
        }
        _ => Vec::new(),
    }
}

/// One polygon part stored in the R-tree.
struct BoundaryPart {
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for BoundaryPart {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree over the parts of a [`CountyBoundary`].
pub struct BoundaryIndex {
    parts: RTree<BoundaryPart>,
    crs: Crs,
}

impl BoundaryIndex {
    /// Builds the index from a boundary's polygon parts.
    #[must_use]
    pub fn new(boundary: &CountyBoundary) -> Self {
        let entries: Vec<BoundaryPart> = boundary
            .polygon()
            .iter()
            .map(|polygon| BoundaryPart {
                envelope: compute_envelope(polygon),
                polygon: polygon.clone(),
            })
            .collect();

        log::debug!("Loaded {} boundary parts into spatial index", entries.len());

        Self {
            parts: RTree::bulk_load(entries),
            crs: boundary.crs(),
        }
    }

    /// CRS the indexed coordinates are in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Whether `(x, y)` lies strictly inside the boundary.
    ///
    /// Points exactly on an edge are not contained.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let point = Point::new(x, y);
        let query_env = AABB::from_point([x, y]);

        self.parts
            .locate_in_envelope_intersecting(&query_env)
            .any(|part| part.polygon.contains(&point))
    }
}

/// Compute the bounding box envelope for a [`Polygon`].
fn compute_envelope(polygon: &Polygon<f64>) -> AABB<[f64; 2]> {
    polygon.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
