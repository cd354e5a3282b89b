//! asgs-enrich - geocode facility names and classify them into ASGS regions
//!
//! This library provides the resolver, classifier and resumable pipeline
//! used by the `enrich` binary.

pub mod config;
pub mod error;
pub mod geocode;
pub mod io;
pub mod models;
pub mod pip;
pub mod pipeline;

pub use config::Settings;
pub use error::{Error, Result};
pub use models::{Hierarchy, LocationRecord, RegionHierarchy, RegionLevel};
