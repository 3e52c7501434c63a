//! Coordinate reference systems used by the pipeline.
//!
//! Parcel geometries arrive in British National Grid (EPSG:27700) and the
//! site register uses WGS84 longitude/latitude (EPSG:4326). Transforms
//! between them are delegated to `proj4rs`, with the OSGB36 to WGS84 datum
//! shift given as the published seven-parameter Helmert transform
//! (accurate to a few metres, well below parcel resolution).

use std::fmt;
use std::str::FromStr;

use geo::Coord;
use proj4rs::Proj;

use crate::SpatialError;

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// OSGB36 / British National Grid, eastings and northings in metres.
    BritishNationalGrid,
    /// WGS84 geographic, `x` = longitude and `y` = latitude in degrees.
    Wgs84,
}

impl Crs {
    /// EPSG code for this CRS.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::BritishNationalGrid => 27700,
            Self::Wgs84 => 4326,
        }
    }

    /// Proj definition string for this CRS.
    #[must_use]
    pub const fn proj_string(self) -> &'static str {
        match self {
            Self::BritishNationalGrid => {
                "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
                 +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 \
                 +units=m +no_defs"
            }
            Self::Wgs84 => "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs",
        }
    }

    /// Geographic systems take and return degrees; `proj4rs` works in
    /// radians for them.
    const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }

    /// Builds the transform from `self` into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if either definition is
    /// rejected.
    pub fn transform_to(self, target: Self) -> Result<CrsTransform, SpatialError> {
        Ok(CrsTransform {
            from: self,
            to: target,
            src: Proj::from_proj_string(self.proj_string())?,
            dst: Proj::from_proj_string(target.proj_string())?,
        })
    }
}

/// A ready-to-apply transform between two [`Crs`] values.
pub struct CrsTransform {
    from: Crs,
    to: Crs,
    src: Proj,
    dst: Proj,
}

impl CrsTransform {
    /// Maps one coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Projection`] if the point is outside the
    /// projection's domain, or [`SpatialError::NonFiniteCoordinate`] if the
    /// result is not a finite number.
    pub fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>, SpatialError> {
        if self.from == self.to {
            return Ok(coord);
        }

        let mut point = if self.from.is_geographic() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };
        proj4rs::transform::transform(&self.src, &self.dst, &mut point)?;

        let (x, y) = if self.to.is_geographic() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !(x.is_finite() && y.is_finite()) {
            return Err(SpatialError::NonFiniteCoordinate {
                x: coord.x,
                y: coord.y,
                crs: self.from,
            });
        }
        Ok(Coord { x, y })
    }
}

/// Converts a British National Grid easting/northing to WGS84
/// `(longitude, latitude)` in degrees.
///
/// # Errors
///
/// Returns [`SpatialError`] if the point cannot be transformed.
pub fn bng_to_wgs84(easting: f64, northing: f64) -> Result<(f64, f64), SpatialError> {
    let coord = Crs::BritishNationalGrid
        .transform_to(Crs::Wgs84)?
        .apply(Coord {
            x: easting,
            y: northing,
        })?;
    Ok((coord.x, coord.y))
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = SpatialError;

    /// Accepts `EPSG:27700`, `urn:ogc:def:crs:EPSG::27700`, `OGC:CRS84` and
    /// the equivalent 4326 forms.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let code = normalized
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .trim_start_matches("CRS");

        match code {
            "27700" => Ok(Self::BritishNationalGrid),
            "4326" | "84" => Ok(Self::Wgs84),
            _ => Err(SpatialError::UnknownCrs(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordnance_survey_worked_example() {
        // OS guide worked example: 651409.903E 313177.270N is
        // 52°39'28.72"N 1°42'57.79"E on WGS84.
        let (lon, lat) = bng_to_wgs84(651_409.903, 313_177.270).unwrap();
        assert!((lon - 1.716_052).abs() < 1e-4);
        assert!((lat - 52.657_979).abs() < 1e-4);
    }

    #[test]
    fn central_london() {
        let (lon, lat) = bng_to_wgs84(530_000.0, 180_000.0).unwrap();
        assert!((lon - -0.128_354).abs() < 1e-4);
        assert!((lat - 51.503_991).abs() < 1e-4);
    }

    #[test]
    fn wgs84_to_bng_round_trips() {
        let to_grid = Crs::Wgs84.transform_to(Crs::BritishNationalGrid).unwrap();
        let grid = to_grid
            .apply(Coord {
                x: 1.716_052,
                y: 52.657_979,
            })
            .unwrap();
        // Within a few metres of the OS worked example.
        assert!((grid.x - 651_409.903).abs() < 5.0);
        assert!((grid.y - 313_177.270).abs() < 5.0);
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let to_grid = Crs::Wgs84.transform_to(Crs::BritishNationalGrid).unwrap();
        assert!(to_grid.apply(Coord { x: 0.1, y: 95.0 }).is_err());
    }

    #[test]
    fn parses_crs_identifiers() {
        assert_eq!("EPSG:27700".parse::<Crs>().unwrap(), Crs::BritishNationalGrid);
        assert_eq!(
            "urn:ogc:def:crs:EPSG::27700".parse::<Crs>().unwrap(),
            Crs::BritishNationalGrid
        );
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert!("EPSG:3857".parse::<Crs>().is_err());
        assert_eq!(Crs::BritishNationalGrid.to_string(), "EPSG:27700");
    }

    #[test]
    fn same_crs_is_identity() {
        let identity = Crs::Wgs84.transform_to(Crs::Wgs84).unwrap();
        assert_eq!(
            identity.apply(Coord { x: 1.0, y: 2.0 }).unwrap(),
            Coord { x: 1.0, y: 2.0 }
        );
    }
}
