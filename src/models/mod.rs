//! Core data models for the enrichment pipeline.

pub mod location;
pub mod region;

pub use location::{CompletionState, LocationRecord, ADDRESS_NOT_FOUND};
pub use region::{Hierarchy, RegionEntry, RegionHierarchy, RegionLevel};
