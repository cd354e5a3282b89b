//! Library error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("missing required column '{column}'; available columns: {available:?}")]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },

    #[error("invalid setting {key} = {value}: {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("boundary file not found: {}", .0.display())]
    LayerNotFound(PathBuf),

    #[error("unsupported boundary file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("malformed boundary geometry: {0}")]
    InvalidGeometry(String),

    #[error("unrecognised coordinate reference system: {0}")]
    InvalidCrs(String),

    #[error("no transform available from {from} to {to}")]
    UnsupportedCrs { from: String, to: String },

    /// Network or service failure during a single lookup; eligible for retry.
    #[error("geocoder request failed: {0}")]
    Transient(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Shapefile(#[from] shapefile::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}
