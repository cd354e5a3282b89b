//! Coordinate reference systems and boundary reprojection.

use std::f64::consts::{FRAC_PI_4, PI};
use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords, MultiPolygon};

use crate::error::{Error, Result};

const WGS84: u32 = 4326;
const GDA94: u32 = 4283;
const GDA2020: u32 = 7844;
const WEB_MERCATOR: u32 = 3857;
const ALBERS_GDA94: u32 = 3577;
const ALBERS_GDA2020: u32 = 9473;

/// Spherical radius used by EPSG:3857
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// A coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u32);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    /// Longitude/latitude in degrees
    Geographic,
    WebMercator,
    AustralianAlbers,
}

impl Crs {
    pub const WGS84: Crs = Crs(WGS84);

    pub fn from_epsg(code: u32) -> Self {
        Self(code)
    }

    pub fn epsg(&self) -> u32 {
        self.0
    }

    fn kind(&self) -> Option<Kind> {
        match self.0 {
            WGS84 | GDA94 | GDA2020 => Some(Kind::Geographic),
            WEB_MERCATOR => Some(Kind::WebMercator),
            ALBERS_GDA94 | ALBERS_GDA2020 => Some(Kind::AustralianAlbers),
            _ => None,
        }
    }

    /// Transform every vertex of `geometry` from `self` into `target`.
    ///
    /// Geographic systems on the GDA94/GDA2020/WGS84 datums are treated as
    /// coordinate-identical.
    pub fn reproject(&self, target: Crs, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        let (from, to) = match (self.kind(), target.kind()) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                return Err(Error::UnsupportedCrs {
                    from: self.to_string(),
                    to: target.to_string(),
                })
            }
        };

        if from == to {
            return Ok(geometry.clone());
        }

        Ok(geometry.map_coords(|c| from_geographic(to, to_geographic(from, c))))
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = Error;

    /// Accepts `EPSG:7844`, `urn:ogc:def:crs:EPSG::7844`, `CRS84` forms and bare codes.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        if upper.ends_with("CRS84") {
            return Ok(Crs::WGS84);
        }

        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG") || !upper.contains(':'))
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidCrs(trimmed.to_string()))?;

        Ok(Crs(code))
    }
}

impl Crs {
    /// Identify a CRS from WKT1 text, as found in a shapefile `.prj` sidecar
    /// or a GeoPackage `srs` definition.
    ///
    /// A trailing top-level `AUTHORITY["EPSG",...]` is taken as is. ESRI-style
    /// text without one is matched by datum and projection name.
    pub fn from_wkt(wkt: &str) -> Result<Self> {
        let upper = wkt.trim().to_ascii_uppercase();
        let invalid = || Error::InvalidCrs(wkt.trim().to_string());

        if let Some(code) = top_level_authority(&upper) {
            return Ok(Crs(code));
        }

        let has = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));
        let gda2020 = has(&["GDA2020", "GDA_2020"]);
        let gda94 = has(&["GDA94", "GDA_1994"]);

        if upper.starts_with("PROJCS") {
            if has(&["ALBERS"]) {
                return match (gda2020, gda94) {
                    (true, _) => Ok(Crs(ALBERS_GDA2020)),
                    (false, true) => Ok(Crs(ALBERS_GDA94)),
                    _ => Err(invalid()),
                };
            }
            if has(&["WEB_MERCATOR", "PSEUDO-MERCATOR", "AUXILIARY_SPHERE"]) {
                return Ok(Crs(WEB_MERCATOR));
            }
            return Err(invalid());
        }

        if upper.starts_with("GEOGCS") {
            if gda2020 {
                return Ok(Crs(GDA2020));
            }
            if gda94 {
                return Ok(Crs(GDA94));
            }
            if has(&["WGS_1984", "WGS 84", "WGS84"]) {
                return Ok(Crs::WGS84);
            }
        }
        Err(invalid())
    }
}

/// `AUTHORITY["EPSG","7844"]]` closing the outermost node
fn top_level_authority(upper: &str) -> Option<u32> {
    const MARKER: &str = "AUTHORITY[\"EPSG\",\"";
    let start = upper.rfind(MARKER)? + MARKER.len();
    let (code, tail) = upper[start..].split_once('"')?;
    if tail.trim() != "]]" {
        return None;
    }
    code.parse().ok()
}

fn to_geographic(kind: Kind, c: Coord<f64>) -> Coord<f64> {
    match kind {
        Kind::Geographic => c,
        Kind::WebMercator => Coord {
            x: (c.x / MERCATOR_RADIUS).to_degrees(),
            y: (2.0 * (c.y / MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees(),
        },
        Kind::AustralianAlbers => albers::inverse(c),
    }
}

fn from_geographic(kind: Kind, c: Coord<f64>) -> Coord<f64> {
    match kind {
        Kind::Geographic => c,
        Kind::WebMercator => Coord {
            x: MERCATOR_RADIUS * c.x.to_radians(),
            y: MERCATOR_RADIUS * (FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln(),
        },
        Kind::AustralianAlbers => albers::forward(c),
    }
}

/// Albers equal-area conic on GRS80 with the Australian parameters
/// (standard parallels 18°S and 36°S, central meridian 132°E), after
/// Snyder, "Map Projections: A Working Manual", pp. 101-102.
mod albers {
    use geo::Coord;

    const A: f64 = 6_378_137.0;
    const INV_F: f64 = 298.257_222_101;
    const LAT1: f64 = -18.0;
    const LAT2: f64 = -36.0;
    const LAT0: f64 = 0.0;
    const LON0: f64 = 132.0;

    struct Params {
        e: f64,
        e2: f64,
        n: f64,
        c: f64,
        rho0: f64,
    }

    fn params() -> Params {
        let f = 1.0 / INV_F;
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();
        let m = |phi: f64| phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt();
        let (m1, m2) = (m(LAT1.to_radians()), m(LAT2.to_radians()));
        let (q1, q2) = (q(LAT1.to_radians(), e, e2), q(LAT2.to_radians(), e, e2));
        let n = (m1 * m1 - m2 * m2) / (q2 - q1);
        let c = m1 * m1 + n * q1;
        let rho0 = A * (c - n * q(LAT0.to_radians(), e, e2)).sqrt() / n;
        Params { e, e2, n, c, rho0 }
    }

    fn q(phi: f64, e: f64, e2: f64) -> f64 {
        let s = phi.sin();
        (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - e * s) / (1.0 + e * s)).ln())
    }

    pub fn forward(c: Coord<f64>) -> Coord<f64> {
        let p = params();
        let rho = A * (p.c - p.n * q(c.y.to_radians(), p.e, p.e2)).sqrt() / p.n;
        let theta = p.n * (c.x - LON0).to_radians();
        Coord {
            x: rho * theta.sin(),
            y: p.rho0 - rho * theta.cos(),
        }
    }

    pub fn inverse(c: Coord<f64>) -> Coord<f64> {
        let p = params();
        let dy = p.rho0 - c.y;
        // rho and theta take the sign of n (negative for southern parallels)
        let rho = (c.x * c.x + dy * dy).sqrt().copysign(p.n);
        let theta = if p.n < 0.0 {
            (-c.x).atan2(-dy)
        } else {
            c.x.atan2(dy)
        };
        let q_val = (p.c - (rho * p.n / A).powi(2)) / p.n;

        let mut phi = (q_val / 2.0).clamp(-1.0, 1.0).asin();
        for _ in 0..15 {
            let s = phi.sin();
            let one_minus = 1.0 - p.e2 * s * s;
            let delta = one_minus * one_minus / (2.0 * phi.cos())
                * (q_val / (1.0 - p.e2) - s / one_minus
                    + (1.0 / (2.0 * p.e)) * ((1.0 - p.e * s) / (1.0 + p.e * s)).ln());
            phi += delta;
            if delta.abs() < 1e-12 {
                break;
            }
        }

        Coord {
            x: LON0 + (theta / p.n).to_degrees(),
            y: phi.to_degrees(),
        }
    }
}
