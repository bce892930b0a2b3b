/// Geographic coordinate types and AOI bounding boxes.
/// All coordinate math uses f64 for precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PrepError, Result};

/// Mean Earth radius in km (IUGG).
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Cells per degree of the global soil raster (30 arc-seconds).
pub const GRANULARITY: f64 = 120.0;

/// A point on the sphere in geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    /// Latitude in degrees, -90 to +90.
    pub lat: f64,
    /// Longitude in degrees, -180 to +180.
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Integer grid-index coordinates of the soil raster cell containing this
    /// point. Rows count southward from 90°N, columns eastward from 180°W.
    pub fn granular(self) -> (i32, i32) {
        let gran_lat = ((90.0 - self.lat) * GRANULARITY).round() as i32;
        let gran_lon = ((180.0 + self.lon) * GRANULARITY).round() as i32;
        (gran_lat, gran_lon)
    }
}

/// Lower-left / upper-right rectangle in decimal degrees.
///
/// Serialised as `[lon_ll, lat_ll, lon_ur, lat_ur]`; deserialisation goes
/// through [`BoundingBox::new`] so an inverted box can never be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub lon_ll: f64,
    pub lat_ll: f64,
    pub lon_ur: f64,
    pub lat_ur: f64,
}

impl BoundingBox {
    /// Validated constructor: coordinates must be finite, in range, and the
    /// upper-right corner strictly north-east of the lower-left corner.
    pub fn new(lon_ll: f64, lat_ll: f64, lon_ur: f64, lat_ur: f64) -> Result<Self> {
        let bbox = Self { lon_ll, lat_ll, lon_ur, lat_ur };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Parse the four free-text coordinate fields of an AOI entry form.
    pub fn from_text(lon_ll: &str, lat_ll: &str, lon_ur: &str, lat_ur: &str) -> Result<Self> {
        let parse = |field: &'static str, text: &str| -> Result<f64> {
            text.trim().parse::<f64>().map_err(|_| PrepError::BboxParse {
                field,
                value: text.to_string(),
            })
        };
        Self::new(
            parse("lower-left longitude", lon_ll)?,
            parse("lower-left latitude", lat_ll)?,
            parse("upper-right longitude", lon_ur)?,
            parse("upper-right latitude", lat_ur)?,
        )
    }

    pub fn validate(&self) -> Result<()> {
        let coords = [self.lon_ll, self.lat_ll, self.lon_ur, self.lat_ur];
        if coords.iter().any(|v| !v.is_finite()) {
            return Err(PrepError::InvalidBbox(format!("non-finite coordinate in {self}")));
        }
        if self.lat_ll < -90.0 || self.lat_ur > 90.0 {
            return Err(PrepError::InvalidBbox(format!("latitude out of range in {self}")));
        }
        if self.lon_ll < -180.0 || self.lon_ur > 180.0 {
            return Err(PrepError::InvalidBbox(format!("longitude out of range in {self}")));
        }
        if self.lon_ll >= self.lon_ur || self.lat_ll >= self.lat_ur {
            return Err(PrepError::InvalidBbox(format!(
                "upper-right corner must lie north-east of lower-left corner: {self}"
            )));
        }
        Ok(())
    }

    pub fn lat_span(&self) -> f64 {
        self.lat_ur - self.lat_ll
    }

    pub fn lon_span(&self) -> f64 {
        self.lon_ur - self.lon_ll
    }

    /// Inclusive containment test.
    pub fn contains(&self, ll: LatLon) -> bool {
        ll.lat >= self.lat_ll && ll.lat <= self.lat_ur && ll.lon >= self.lon_ll && ll.lon <= self.lon_ur
    }

    /// Raster-style containment for a read window inside `aoi`: south and
    /// west edges inclusive, north and east edges exclusive unless they are
    /// also the AOI's own edges. Adjacent bands never share a cell, and cells
    /// on the AOI's northern or eastern boundary still belong to one band.
    pub fn contains_within(&self, ll: LatLon, aoi: &BoundingBox) -> bool {
        let north = if self.lat_ur >= aoi.lat_ur { ll.lat <= self.lat_ur } else { ll.lat < self.lat_ur };
        let east = if self.lon_ur >= aoi.lon_ur { ll.lon <= self.lon_ur } else { ll.lon < self.lon_ur };
        ll.lat >= self.lat_ll && ll.lon >= self.lon_ll && north && east
    }

    /// True when `self` lies entirely inside `outer`.
    pub fn within(&self, outer: &BoundingBox) -> bool {
        self.lon_ll >= outer.lon_ll
            && self.lat_ll >= outer.lat_ll
            && self.lon_ur <= outer.lon_ur
            && self.lat_ur <= outer.lat_ur
    }

    /// Surface area of the box on a spherical Earth, km².
    pub fn area_km2(&self) -> f64 {
        let dlon = self.lon_span().to_radians();
        let dsin = self.lat_ur.to_radians().sin() - self.lat_ll.to_radians().sin();
        EARTH_RADIUS_KM * EARTH_RADIUS_KM * dlon * dsin.abs()
    }

    /// Square box of side `size_deg` centred on `centre`. Not validated.
    pub fn around(centre: LatLon, size_deg: f64) -> Self {
        let half = size_deg / 2.0;
        Self {
            lon_ll: centre.lon - half,
            lat_ll: centre.lat - half,
            lon_ur: centre.lon + half,
            lat_ur: centre.lat + half,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LL: {:.4}, {:.4}  UR: {:.4}, {:.4}",
            self.lon_ll, self.lat_ll, self.lon_ur, self.lat_ur
        )
    }
}

impl TryFrom<[f64; 4]> for BoundingBox {
    type Error = PrepError;

    fn try_from(v: [f64; 4]) -> Result<Self> {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.lon_ll, b.lat_ll, b.lon_ur, b.lat_ur]
    }
}

/// Accepts `lon_ll,lat_ll,lon_ur,lat_ur` separated by commas and/or spaces.
impl FromStr for BoundingBox {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 4 {
            return Err(PrepError::InvalidBbox(format!(
                "expected 4 coordinates, got {} in {s:?}",
                parts.len()
            )));
        }
        Self::from_text(parts[0], parts[1], parts[2], parts[3])
    }
}
