//! Point-in-Polygon (PIP) region classification.
//!
//! Loads attributed boundary polygons, reconciles their reference system
//! with the points, and joins points to regions through an R-tree index.

mod classifier;
mod crs;
mod gpkg;
mod index;
mod layer;
mod shp;

pub use classifier::{ClassificationSummary, JoinOutcome, RegionClassifier};
pub use crs::Crs;
pub use gpkg::GeoPackageLoader;
pub use index::BoundaryIndex;
pub use layer::{
    candidate_names, resolve_columns, select_columns, BoundaryFeature, BoundaryFileLoader,
    BoundaryLayer, GeoJsonLoader, LayerLoader,
};
pub use shp::ShapefileLoader;
