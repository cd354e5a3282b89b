//! ESRI Shapefile boundary layers, as published in the ABS `_SHP_` downloads.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Shape};
use tracing::{debug, info};

use super::layer::number_string;
use super::{select_columns, BoundaryFeature, BoundaryLayer, Crs, LayerLoader};
use crate::error::{Error, Result};

/// Loads `.shp` files with their `.dbf` attributes and `.prj` reference system.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShapefileLoader;

impl LayerLoader for ShapefileLoader {
    fn load(&self, path: &Path, columns: &[&str]) -> Result<BoundaryLayer> {
        if !path.exists() {
            return Err(Error::LayerNotFound(path.to_path_buf()));
        }

        info!("Loading spatial layer: {}", path.display());

        let crs = sidecar_crs(path)?;
        let mut reader = shapefile::Reader::from_path(path)?;

        let mut total = 0;
        let mut features = Vec::new();
        for item in reader.iter_shapes_and_records() {
            let (shape, record) = item?;
            total += 1;
            let Some(geometry) = to_multi_polygon(shape) else {
                continue;
            };
            features.push(BoundaryFeature {
                attributes: record_attributes(record),
                geometry,
            });
        }

        if features.len() < total {
            debug!(
                "Skipped {} records without polygon geometry",
                total - features.len()
            );
        }

        let features = select_columns(features, columns);
        info!("Loaded {} features ({})", features.len(), crs);

        Ok(BoundaryLayer { crs, features })
    }
}

/// A missing `.prj` means plain longitude/latitude.
fn sidecar_crs(path: &Path) -> Result<Crs> {
    let prj = path.with_extension("prj");
    if !prj.exists() {
        debug!("No .prj next to {}; assuming {}", path.display(), Crs::WGS84);
        return Ok(Crs::WGS84);
    }
    Crs::from_wkt(&fs::read_to_string(prj)?)
}

fn to_multi_polygon(shape: Shape) -> Option<MultiPolygon<f64>> {
    match shape {
        Shape::Polygon(p) => from_rings(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonM(p) => from_rings(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        Shape::PolygonZ(p) => from_rings(p.rings(), |pt| Coord { x: pt.x, y: pt.y }),
        _ => None,
    }
}

/// Each outer ring opens a polygon; inner rings attach to the latest one.
fn from_rings<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> Option<MultiPolygon<f64>> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for ring in rings {
        let line: LineString<f64> = ring.points().iter().map(&xy).collect();
        match ring {
            PolygonRing::Outer(_) => polygons.push((line, Vec::new())),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(line),
                None => debug!("Hole ring without an outer ring; skipped"),
            },
        }
    }

    let polygons: Vec<Polygon<f64>> = polygons
        .into_iter()
        .filter(|(exterior, _)| exterior.0.len() >= 4)
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect();
    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon::new(polygons))
    }
}

fn record_attributes(record: Record) -> HashMap<String, String> {
    HashMap::<String, FieldValue>::from(record)
        .into_iter()
        .filter_map(|(name, value)| field_string(value).map(|v| (name, v)))
        .collect()
}

fn field_string(value: FieldValue) -> Option<String> {
    let text = match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => s.trim().to_string(),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => number_string(n),
        FieldValue::Float(Some(n)) => number_string(f64::from(n)),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Logical(Some(b)) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapefile::dbase::{FieldName, TableWriterBuilder};
    use shapefile::{Point, Writer};
    use tempfile::tempdir;

    const GDA2020_PRJ: &str = r#"GEOGCS["GCS_GDA2020",DATUM["GDA2020",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> shapefile::Polygon {
        // Shapefile outer rings run clockwise
        shapefile::Polygon::new(PolygonRing::Outer(vec![
            Point::new(x0, y0),
            Point::new(x0, y1),
            Point::new(x1, y1),
            Point::new(x1, y0),
            Point::new(x0, y0),
        ]))
    }

    fn write_layer(path: &Path) {
        let table = TableWriterBuilder::new()
            .add_character_field(FieldName::try_from("SA1_CODE21").unwrap(), 11)
            .add_character_field(FieldName::try_from("STE_NAME21").unwrap(), 50)
            .add_numeric_field(FieldName::try_from("STE_CODE21").unwrap(), 1, 0);
        let mut writer = Writer::from_path(path, table).unwrap();

        let mut record = Record::default();
        record.insert(
            "SA1_CODE21".to_string(),
            FieldValue::Character(Some("70201100101".to_string())),
        );
        record.insert(
            "STE_NAME21".to_string(),
            FieldValue::Character(Some("Northern Territory".to_string())),
        );
        record.insert("STE_CODE21".to_string(), FieldValue::Numeric(Some(7.0)));
        writer
            .write_shape_and_record(&square(130.0, -13.5, 132.0, -12.0), &record)
            .unwrap();
    }

    #[test]
    fn loads_polygons_attributes_and_prj() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("SA1_2021_AUST_GDA2020.shp");
        write_layer(&path);
        fs::write(path.with_extension("prj"), GDA2020_PRJ).unwrap();

        let layer = ShapefileLoader
            .load(&path, &["SA1_CODE", "STATE_CODE", "STATE_NAME"])
            .unwrap();

        assert_eq!(layer.crs.epsg(), 7844);
        assert_eq!(layer.features.len(), 1);
        let feature = &layer.features[0];
        assert_eq!(feature.attribute("SA1_CODE"), Some("70201100101"));
        assert_eq!(feature.attribute("STATE_CODE"), Some("7"));
        assert_eq!(feature.attribute("STATE_NAME"), Some("Northern Territory"));
        assert_eq!(feature.geometry.0.len(), 1);
    }

    #[test]
    fn missing_prj_defaults_to_wgs84() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("layer.shp");
        write_layer(&path);

        let layer = ShapefileLoader.load(&path, &["SA1_CODE"]).unwrap();
        assert_eq!(layer.crs, Crs::WGS84);
    }

    #[test]
    fn missing_file_is_layer_not_found() {
        let err = ShapefileLoader
            .load(Path::new("nonexistent_file.shp"), &["SA1_CODE"])
            .unwrap_err();
        assert!(matches!(err, Error::LayerNotFound(_)));
    }

    #[test]
    fn holes_attach_to_preceding_outer_ring() {
        let ring = |pts: &[(f64, f64)]| pts.iter().map(|&(x, y)| Point::new(x, y)).collect::<Vec<_>>();
        let rings = vec![
            PolygonRing::Outer(ring(&[(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0), (0.0, 0.0)])),
            PolygonRing::Inner(ring(&[(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0), (1.0, 1.0)])),
            PolygonRing::Outer(ring(&[(5.0, 5.0), (5.0, 6.0), (6.0, 6.0), (6.0, 5.0), (5.0, 5.0)])),
        ];

        let multi = from_rings(&rings, |p| Coord { x: p.x, y: p.y }).unwrap();

        assert_eq!(multi.0.len(), 2);
        assert_eq!(multi.0[0].interiors().len(), 1);
        assert!(multi.0[1].interiors().is_empty());
    }

    #[test]
    fn numeric_fields_drop_integral_fraction() {
        assert_eq!(field_string(FieldValue::Numeric(Some(702.0))), Some("702".to_string()));
        assert_eq!(field_string(FieldValue::Numeric(Some(1.5))), Some("1.5".to_string()));
        assert_eq!(field_string(FieldValue::Character(Some("  ".to_string()))), None);
        assert_eq!(field_string(FieldValue::Numeric(None)), None);
    }
}
