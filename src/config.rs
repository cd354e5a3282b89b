//! Run configuration.
//!
//! Built once at process start (from the environment or a TOML file) and
//! passed by reference into the resolver, classifier and pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Hierarchy;

/// Edition / datum tag used by the ABS boundary downloads.
const DEFAULT_BOUNDARY_STEM: &str = "2021_AUST_GDA2020";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub nominatim_user_agent: String,
    pub nominatim_url: String,
    pub geocode_min_delay_sec: f64,
    pub geocode_max_retries: u32,
    /// Country filter passed to every lookup (ISO 3166-1 alpha-2, comma separated)
    pub country_codes: String,

    pub default_crs: String,
    pub boundaries: BoundaryPaths,

    pub data_dir: PathBuf,
    pub output_dir: PathBuf,

    pub min_success_rate: f64,
    /// Identity column of CSV inputs and of the output table
    pub name_column: String,
    /// Appended to bare names read from `.txt` inputs
    pub region_suffix: String,
}

/// One optional file path per boundary layer.
///
/// Only `sa1` (every primary level is derived from it) and `iare` are joined
/// against; the coarser paths are tracked for status reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryPaths {
    pub sa1: Option<PathBuf>,
    pub sa2: Option<PathBuf>,
    pub sa3: Option<PathBuf>,
    pub sa4: Option<PathBuf>,
    pub gccsa: Option<PathBuf>,
    pub ste: Option<PathBuf>,
    pub iare: Option<PathBuf>,
}

impl BoundaryPaths {
    pub fn entries(&self) -> [(&'static str, Option<&Path>); 7] {
        [
            ("SA1", self.sa1.as_deref()),
            ("SA2", self.sa2.as_deref()),
            ("SA3", self.sa3.as_deref()),
            ("SA4", self.sa4.as_deref()),
            ("GCCSA", self.gccsa.as_deref()),
            ("STE", self.ste.as_deref()),
            ("IARE", self.iare.as_deref()),
        ]
    }

    /// The layer the classifier joins against for a hierarchy
    pub fn join_layer(&self, hierarchy: Hierarchy) -> Option<&Path> {
        match hierarchy {
            Hierarchy::Asgs => self.sa1.as_deref(),
            Hierarchy::Indigenous => self.iare.as_deref(),
        }
    }

    /// True when at least one hierarchy's join layer exists on disk
    pub fn any_join_layer_present(&self) -> bool {
        Hierarchy::all()
            .iter()
            .filter_map(|h| self.join_layer(*h))
            .any(Path::exists)
    }

    fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, p)| p.is_none())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStatus {
    NotConfigured,
    Present,
    Missing,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nominatim_user_agent: "chc_geocoder".to_string(),
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            geocode_min_delay_sec: 1.0,
            geocode_max_retries: 3,
            country_codes: "au".to_string(),
            default_crs: "EPSG:4326".to_string(),
            boundaries: BoundaryPaths::default(),
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("outputs"),
            min_success_rate: 0.8,
            name_column: "CHC".to_string(),
            region_suffix: "NT, Australia".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment (and `.env`, if present).
    pub fn from_env() -> Self {
        load_dotenv();
        let defaults = Self::default();

        let mut settings = Self {
            nominatim_user_agent: env_string("NOMINATIM_USER_AGENT", defaults.nominatim_user_agent),
            nominatim_url: env_string("NOMINATIM_URL", defaults.nominatim_url),
            geocode_min_delay_sec: parse_f64("GEOCODE_MIN_DELAY_SEC", defaults.geocode_min_delay_sec)
                .max(0.0),
            geocode_max_retries: parse_u32("GEOCODE_MAX_RETRIES", defaults.geocode_max_retries)
                .max(1),
            country_codes: env_string("GEOCODE_COUNTRY_CODES", defaults.country_codes),
            default_crs: env_string("DEFAULT_CRS", defaults.default_crs),
            boundaries: BoundaryPaths {
                sa1: path_from_env("ASGS_SA1_PATH"),
                sa2: path_from_env("ASGS_SA2_PATH"),
                sa3: path_from_env("ASGS_SA3_PATH"),
                sa4: path_from_env("ASGS_SA4_PATH"),
                gccsa: path_from_env("ASGS_GCCSA_PATH"),
                ste: path_from_env("ASGS_STE_PATH"),
                iare: path_from_env("ASGS_IARE_PATH"),
            },
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            output_dir: env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            min_success_rate: parse_f64("MIN_SUCCESS_RATE", defaults.min_success_rate)
                .clamp(0.0, 1.0),
            name_column: env_string("NAME_COLUMN", defaults.name_column),
            region_suffix: env_string("REGION_SUFFIX", defaults.region_suffix),
        };
        settings.discover_boundaries();
        settings
    }

    /// Read settings from a TOML file; omitted keys take their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        settings.discover_boundaries();
        Ok(settings)
    }

    /// Reject numeric values the resolver and validation gate cannot use.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key, value: String, reason| Error::InvalidSetting { key, value, reason };

        let delay = self.geocode_min_delay_sec;
        if !delay.is_finite() || delay < 0.0 {
            return Err(invalid(
                "geocode_min_delay_sec",
                delay.to_string(),
                "expected a finite number of seconds >= 0",
            ));
        }
        if self.geocode_max_retries == 0 {
            return Err(invalid("geocode_max_retries", "0".to_string(), "expected at least 1"));
        }
        let rate = self.min_success_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(invalid(
                "min_success_rate",
                rate.to_string(),
                "expected a fraction between 0 and 1",
            ));
        }
        Ok(())
    }

    /// Minimum spacing between lookups; unusable values mean no spacing.
    pub fn geocode_min_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.geocode_min_delay_sec.max(0.0)).unwrap_or_default()
    }

    /// Fill in conventional boundary paths under `<data_dir>/asgs` when none are configured.
    pub fn discover_boundaries(&mut self) {
        let asgs_dir = self.data_dir.join("asgs");
        if self.boundaries.is_empty() && asgs_dir.is_dir() {
            debug!("Using default boundary paths under {}", asgs_dir.display());
            self.boundaries = BoundaryPaths::conventional(&asgs_dir);
        }
    }

    pub fn boundary_status(&self) -> Vec<(&'static str, Option<PathBuf>, BoundaryStatus)> {
        self.boundaries
            .entries()
            .into_iter()
            .map(|(layer, path)| {
                let status = match path {
                    None => BoundaryStatus::NotConfigured,
                    Some(p) if p.exists() => BoundaryStatus::Present,
                    Some(_) => BoundaryStatus::Missing,
                };
                (layer, path.map(Path::to_path_buf), status)
            })
            .collect()
    }

    /// True when at least one joinable layer exists on disk
    pub fn any_boundary_available(&self) -> bool {
        self.boundaries.any_join_layer_present()
    }
}

impl BoundaryPaths {
    /// ABS download layouts under `dir`, per layer: the GeoPackage, then the
    /// unzipped Shapefile directory, then a GeoJSON export. The first that
    /// exists wins; with none present the GeoPackage path is reported.
    fn conventional(dir: &Path) -> Self {
        let file = |layer: &str| {
            let stem = format!("{}_{}", layer, DEFAULT_BOUNDARY_STEM);
            let gpkg = dir.join(format!("{}.gpkg", stem));
            let candidates = [
                gpkg.clone(),
                dir.join(format!("{}_2021_AUST_SHP_GDA2020", layer))
                    .join(format!("{}.shp", stem)),
                dir.join(format!("{}.geojson", stem)),
            ];
            Some(candidates.into_iter().find(|p| p.exists()).unwrap_or(gpkg))
        };
        Self {
            sa1: file("SA1"),
            sa2: file("SA2"),
            sa3: file("SA3"),
            sa4: file("SA4"),
            gccsa: file("GCCSA"),
            ste: file("STE"),
            iare: file("IARE"),
        }
    }
}

fn load_dotenv() {
    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn path_from_env(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}
