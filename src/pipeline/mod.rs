//! End-to-end enrichment run.
//!
//! read input → reconcile with the previous output → geocode what is new →
//! validate → classify → merge with complete cached rows → write.

mod cache;
mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::geocode::{GeocodeResolver, Geocoder, ProgressObserver};
use crate::io::{load_existing_cache, read_locations, write_output_csv};
use crate::models::LocationRecord;
use crate::pip::{BoundaryFileLoader, ClassificationSummary, LayerLoader, RegionClassifier};

pub use cache::{reconcile, Reconciled};
pub use validate::{validate_geocoded, ValidationReport};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    /// Result table, also read back as the cache
    pub output: PathBuf,
    pub skip_classification: bool,
    /// Ignore the cache and reprocess everything
    pub rebuild: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMode {
    Classified,
    /// Turned off for this run
    Skipped,
    /// No boundary layer available
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub already_complete: usize,
    pub classification_only: usize,
    pub full_processing: usize,
    pub validation: Option<ValidationReport>,
    pub mode: ClassificationMode,
    pub summary: ClassificationSummary,
    pub output: PathBuf,
    /// Final rows in output order
    #[serde(skip)]
    pub records: Vec<LocationRecord>,
}

pub struct Pipeline<L = BoundaryFileLoader> {
    settings: Settings,
    resolver: GeocodeResolver,
    classifier: RegionClassifier<L>,
}

impl Pipeline<BoundaryFileLoader> {
    pub fn new(settings: &Settings, geocoder: Arc<dyn Geocoder>) -> Result<Self> {
        Ok(Self::with_classifier(
            settings,
            geocoder,
            RegionClassifier::from_settings(settings)?,
        ))
    }
}

impl<L: LayerLoader> Pipeline<L> {
    pub fn with_classifier(
        settings: &Settings,
        geocoder: Arc<dyn Geocoder>,
        classifier: RegionClassifier<L>,
    ) -> Self {
        Self {
            settings: settings.clone(),
            resolver: GeocodeResolver::new(geocoder, settings),
            classifier,
        }
    }

    /// Run once over `options.input`, writing `options.output`.
    ///
    /// Only input contract violations and write failures are errors;
    /// lookup and boundary problems degrade the affected rows.
    pub async fn run(
        &self,
        options: &RunOptions,
        observer: Option<ProgressObserver>,
    ) -> Result<RunReport> {
        let name_column = &self.settings.name_column;

        let fresh = read_locations(&options.input, &self.settings)?;
        let cache = if options.rebuild {
            Vec::new()
        } else {
            load_existing_cache(&options.output, name_column)
        };

        let Reconciled {
            mut needs_full,
            needs_classification,
            already_complete,
        } = reconcile(fresh, cache, options.rebuild);

        let full_processing = needs_full.len();
        let classification_only = needs_classification.len();
        let complete = already_complete.len();

        if !needs_full.is_empty() {
            info!("Geocoding {} locations", needs_full.len());
            self.resolver.resolve_batch(&mut needs_full, observer).await;
        }

        let mut pending = needs_full;
        pending.extend(needs_classification);

        let validation = if pending.is_empty() {
            None
        } else {
            let report = validate_geocoded(&pending, self.settings.min_success_rate);
            if !report.passed {
                warn!("Geocoding validation failed; continuing");
            }
            Some(report)
        };

        let mode = if options.skip_classification {
            info!("Skipping region classification");
            ClassificationMode::Skipped
        } else if !self.classifier.is_available() {
            warn!("No boundary files available; region columns left empty");
            ClassificationMode::Degraded
        } else {
            if !pending.is_empty() {
                self.classifier.classify(&mut pending);
            }
            ClassificationMode::Classified
        };

        let mut records = pending;
        records.extend(already_complete);
        records.sort_by(|a, b| a.name.cmp(&b.name));

        write_output_csv(&records, &options.output, name_column)?;

        let summary = ClassificationSummary::summarize(&records);
        info!(
            "Run complete: {} locations, {} geocoded, {} classified",
            summary.total_locations, summary.geocoded_successfully, summary.classified_successfully
        );

        Ok(RunReport {
            already_complete: complete,
            classification_only,
            full_processing,
            validation,
            mode,
            summary,
            output: options.output.clone(),
            records,
        })
    }
}
