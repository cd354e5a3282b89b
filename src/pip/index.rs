//! Spatial index for fast boundary lookups.

use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use tracing::info;

use super::BoundaryFeature;

/// R-tree entry: a feature's position in its layer plus its bounding box
struct IndexedFeature {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Point-in-polygon index over one boundary layer
pub struct BoundaryIndex {
    tree: RTree<IndexedFeature>,
    features: Vec<BoundaryFeature>,
}

impl BoundaryIndex {
    pub fn build(features: Vec<BoundaryFeature>) -> Self {
        info!("Building spatial index for {} boundaries...", features.len());

        let indexed: Vec<IndexedFeature> = features
            .iter()
            .enumerate()
            .filter_map(|(position, f)| {
                let rect = f.geometry.bounding_rect()?;
                Some(IndexedFeature {
                    position,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        info!("Spatial index built with {} entries", tree.size());

        Self { tree, features }
    }

    /// The containing feature, earliest in layer order when polygons overlap.
    ///
    /// Points on a boundary edge are not contained.
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<&BoundaryFeature> {
        let point = Point::new(lon, lat);
        let query_envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .filter(|entry| self.features[entry.position].geometry.contains(&point))
            .map(|entry| entry.position)
            .min()
            .map(|position| &self.features[position])
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
