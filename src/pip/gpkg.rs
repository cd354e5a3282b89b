//! GeoPackage boundary layers.
//!
//! Reads the first feature table listed in `gpkg_contents`, decoding the
//! GeoPackage binary header and the (multi)polygon WKB behind it.

use std::collections::HashMap;
use std::path::Path;

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info};

use super::layer::number_string;
use super::{select_columns, BoundaryFeature, BoundaryLayer, Crs, LayerLoader};
use crate::error::{Error, Result};

/// Undefined geographic SRS, reserved by the GeoPackage standard
const UNDEFINED_GEOGRAPHIC_SRS: i64 = 0;

#[derive(Debug, Clone, Copy, Default)]
pub struct GeoPackageLoader;

#[derive(Debug)]
struct FeatureTable {
    name: String,
    geometry_column: String,
    srs_id: i64,
}

impl LayerLoader for GeoPackageLoader {
    fn load(&self, path: &Path, columns: &[&str]) -> Result<BoundaryLayer> {
        if !path.exists() {
            return Err(Error::LayerNotFound(path.to_path_buf()));
        }

        info!("Loading spatial layer: {}", path.display());

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let table = feature_table(&conn, path)?;
        let crs = table_crs(&conn, table.srs_id)?;
        debug!("Reading table {} ({})", table.name, crs);

        let sql = format!("SELECT * FROM \"{}\"", table.name.replace('"', "\"\""));
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let geometry_index = names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(&table.geometry_column))
            .ok_or_else(|| {
                Error::InvalidGeometry(format!(
                    "geometry column {} missing from {}",
                    table.geometry_column, table.name
                ))
            })?;

        let mut total = 0;
        let mut features = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            total += 1;
            let geometry = match row.get_ref(geometry_index)? {
                ValueRef::Blob(blob) => decode_geometry(blob)?,
                _ => None,
            };
            let Some(geometry) = geometry else {
                continue;
            };

            let mut attributes = HashMap::new();
            for (i, name) in names.iter().enumerate() {
                if i == geometry_index {
                    continue;
                }
                if let Some(value) = value_string(row.get_ref(i)?) {
                    attributes.insert(name.clone(), value);
                }
            }
            features.push(BoundaryFeature {
                attributes,
                geometry,
            });
        }

        if features.len() < total {
            debug!(
                "Skipped {} rows without polygon geometry",
                total - features.len()
            );
        }

        let features = select_columns(features, columns);
        info!("Loaded {} features ({})", features.len(), crs);

        Ok(BoundaryLayer { crs, features })
    }
}

fn feature_table(conn: &Connection, path: &Path) -> Result<FeatureTable> {
    conn.query_row(
        "SELECT c.table_name, g.column_name, g.srs_id
         FROM gpkg_contents c
         JOIN gpkg_geometry_columns g ON g.table_name = c.table_name
         WHERE c.data_type = 'features'
         ORDER BY c.rowid
         LIMIT 1",
        [],
        |row| {
            Ok(FeatureTable {
                name: row.get(0)?,
                geometry_column: row.get(1)?,
                srs_id: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::InvalidGeometry(format!("no feature table in {}", path.display())))
}

fn table_crs(conn: &Connection, srs_id: i64) -> Result<Crs> {
    if srs_id == UNDEFINED_GEOGRAPHIC_SRS {
        return Ok(Crs::WGS84);
    }

    let srs: Option<(String, i64, String)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id, definition
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            params![srs_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match srs {
        Some((org, code, _)) if org.eq_ignore_ascii_case("EPSG") && code > 0 => {
            Ok(Crs::from_epsg(code as u32))
        }
        Some((_, _, definition)) => Crs::from_wkt(&definition),
        None => Err(Error::InvalidCrs(format!("srs_id {}", srs_id))),
    }
}

fn value_string(value: ValueRef<'_>) -> Option<String> {
    let text = match value {
        ValueRef::Null | ValueRef::Blob(_) => return None,
        ValueRef::Integer(n) => n.to_string(),
        ValueRef::Real(n) => number_string(n),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}

/// Decode a GeoPackage geometry blob. Non-polygonal and empty geometries
/// yield `None`; malformed bytes are an error.
fn decode_geometry(blob: &[u8]) -> Result<Option<MultiPolygon<f64>>> {
    if blob.len() < 8 || &blob[..2] != b"GP" {
        return Err(Error::InvalidGeometry("missing GeoPackage header".into()));
    }
    let flags = blob[3];
    if flags & 0b1_0000 != 0 {
        return Ok(None);
    }
    let envelope = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(Error::InvalidGeometry(format!(
                "envelope indicator {}",
                other
            )))
        }
    };
    let start = 8 + envelope;
    if blob.len() < start {
        return Err(Error::InvalidGeometry("truncated envelope".into()));
    }

    let mut wkb = Wkb {
        bytes: &blob[start..],
        pos: 0,
        little_endian: true,
    };
    let (kind, dims) = wkb.header()?;
    match kind {
        WKB_POLYGON => Ok(Some(MultiPolygon::new(vec![wkb.polygon(dims)?]))),
        WKB_MULTI_POLYGON => {
            let count = wkb.u32()?;
            let mut polygons = Vec::new();
            for _ in 0..count {
                let (kind, dims) = wkb.header()?;
                if kind != WKB_POLYGON {
                    return Err(Error::InvalidGeometry(format!(
                        "multipolygon member of type {}",
                        kind
                    )));
                }
                polygons.push(wkb.polygon(dims)?);
            }
            Ok((!polygons.is_empty()).then(|| MultiPolygon::new(polygons)))
        }
        _ => Ok(None),
    }
}

const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POLYGON: u32 = 6;

struct Wkb<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> Wkb<'a> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| Error::InvalidGeometry("truncated WKB".into()))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        })
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(b)
        } else {
            f64::from_be_bytes(b)
        })
    }

    /// Byte order and type; returns the base type and the ordinate count
    fn header(&mut self) -> Result<(u32, usize)> {
        let [order] = self.take::<1>()?;
        self.little_endian = order == 1;
        let raw = self.u32()?;

        // ISO codes add 1000/2000/3000 for Z/M/ZM, EWKB sets the high bits
        let ewkb_extra = usize::from(raw & 0x8000_0000 != 0) + usize::from(raw & 0x4000_0000 != 0);
        let code = raw & 0x0FFF_FFFF;
        let iso_extra = match code / 1000 {
            0 => 0,
            1 | 2 => 1,
            3 => 2,
            _ => return Err(Error::InvalidGeometry(format!("WKB type {}", raw))),
        };
        Ok((code % 1000, 2 + iso_extra + ewkb_extra))
    }

    fn ring(&mut self, dims: usize) -> Result<LineString<f64>> {
        let count = self.u32()?;
        let mut coords = Vec::new();
        for _ in 0..count {
            let x = self.f64()?;
            let y = self.f64()?;
            for _ in 2..dims {
                self.f64()?;
            }
            coords.push(Coord { x, y });
        }
        Ok(LineString::new(coords))
    }

    fn polygon(&mut self, dims: usize) -> Result<Polygon<f64>> {
        let count = self.u32()?;
        let mut rings = Vec::new();
        for _ in 0..count {
            rings.push(self.ring(dims)?);
        }
        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wkb_polygon(little_endian: bool, rings: &[&[(f64, f64)]]) -> Vec<u8> {
        let u32b = |v: u32| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        let f64b = |v: f64| if little_endian { v.to_le_bytes() } else { v.to_be_bytes() };
        let mut out = vec![u8::from(little_endian)];
        out.extend(u32b(WKB_POLYGON));
        out.extend(u32b(rings.len() as u32));
        for ring in rings {
            out.extend(u32b(ring.len() as u32));
            for &(x, y) in *ring {
                out.extend(f64b(x));
                out.extend(f64b(y));
            }
        }
        out
    }

    fn gpkg_blob(srs_id: i32, envelope: Option<[f64; 4]>, wkb: &[u8]) -> Vec<u8> {
        let flags = 0b1 | if envelope.is_some() { 0b10 } else { 0 };
        let mut out = vec![b'G', b'P', 0, flags];
        out.extend(srs_id.to_le_bytes());
        for v in envelope.into_iter().flatten() {
            out.extend(v.to_le_bytes());
        }
        out.extend_from_slice(wkb);
        out
    }

    const SQUARE: &[(f64, f64)] = &[
        (130.0, -13.5),
        (132.0, -13.5),
        (132.0, -12.0),
        (130.0, -12.0),
        (130.0, -13.5),
    ];

    fn write_gpkg(path: &Path, srs: (&str, i64)) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT, srs_id INTEGER PRIMARY KEY,
                 organization TEXT, organization_coordsys_id INTEGER, definition TEXT);
             CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT);
             CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT, srs_id INTEGER);
             CREATE TABLE sa1_2021_aust_gda2020 (fid INTEGER PRIMARY KEY, geom BLOB,
                 sa1_code_2021 TEXT, state_code_2021 INTEGER, state_name_2021 TEXT);
             INSERT INTO gpkg_contents VALUES ('sa1_2021_aust_gda2020', 'features');
             INSERT INTO gpkg_geometry_columns VALUES ('sa1_2021_aust_gda2020', 'geom', 7844);",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_spatial_ref_sys VALUES ('GDA2020', 7844, ?1, ?2, 'undefined')",
            params![srs.0, srs.1],
        )
        .unwrap();

        let polygon = gpkg_blob(7844, Some([130.0, 132.0, -13.5, -12.0]), &wkb_polygon(true, &[SQUARE]));
        let mut point = gpkg_blob(7844, None, &[1, 1, 0, 0, 0]);
        point.extend(131.0f64.to_le_bytes());
        point.extend((-12.5f64).to_le_bytes());

        let insert = "INSERT INTO sa1_2021_aust_gda2020 (geom, sa1_code_2021, state_code_2021, state_name_2021)
                      VALUES (?1, ?2, ?3, ?4)";
        conn.execute(insert, params![polygon, "70201100101", 7, "Northern Territory"])
            .unwrap();
        conn.execute(insert, params![point, "79999999999", 7, "Northern Territory"])
            .unwrap();
    }

    #[test]
    fn loads_first_feature_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SA1_2021_AUST_GDA2020.gpkg");
        write_gpkg(&path, ("EPSG", 7844));

        let layer = GeoPackageLoader
            .load(&path, &["SA1_CODE", "STATE_CODE", "STATE_NAME"])
            .unwrap();

        assert_eq!(layer.crs.epsg(), 7844);
        // The point row is skipped
        assert_eq!(layer.features.len(), 1);
        let feature = &layer.features[0];
        assert_eq!(feature.attribute("SA1_CODE"), Some("70201100101"));
        assert_eq!(feature.attribute("STATE_CODE"), Some("7"));
        assert_eq!(feature.attribute("STATE_NAME"), Some("Northern Territory"));
        assert_eq!(feature.geometry.0[0].exterior().0.len(), 5);
    }

    #[test]
    fn unknown_organization_is_invalid_crs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("odd.gpkg");
        write_gpkg(&path, ("ACME", 1));

        let err = GeoPackageLoader.load(&path, &["SA1_CODE"]).unwrap_err();
        assert!(matches!(err, Error::InvalidCrs(_)));
    }

    #[test]
    fn missing_file_is_layer_not_found() {
        let err = GeoPackageLoader
            .load(Path::new("nonexistent_file.gpkg"), &["SA1_CODE"])
            .unwrap_err();
        assert!(matches!(err, Error::LayerNotFound(_)));
    }

    #[test]
    fn decodes_big_endian_multipolygon() {
        let mut wkb = vec![0u8];
        wkb.extend(WKB_MULTI_POLYGON.to_be_bytes());
        wkb.extend(2u32.to_be_bytes());
        wkb.extend(wkb_polygon(false, &[SQUARE]));
        wkb.extend(wkb_polygon(true, &[SQUARE]));

        let multi = decode_geometry(&gpkg_blob(7844, None, &wkb)).unwrap().unwrap();
        assert_eq!(multi.0.len(), 2);
        assert_eq!(multi.0[0], multi.0[1]);
        assert_eq!(multi.0[0].exterior().0[1], Coord { x: 132.0, y: -13.5 });
    }

    #[test]
    fn rejects_truncated_blobs() {
        let wkb = wkb_polygon(true, &[SQUARE]);
        let blob = gpkg_blob(7844, None, &wkb[..wkb.len() - 4]);
        assert!(matches!(decode_geometry(&blob), Err(Error::InvalidGeometry(_))));
        assert!(decode_geometry(b"XX000000").is_err());
    }

    #[test]
    fn empty_flag_yields_no_geometry() {
        let blob = vec![b'G', b'P', 0, 0b1_0001, 0, 0, 0, 0];
        assert!(decode_geometry(&blob).unwrap().is_none());
    }
}
