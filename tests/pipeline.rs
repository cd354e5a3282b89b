use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};

use asgs_enrich::geocode::{GeocodeMatch, Geocoder};
use asgs_enrich::io::load_existing_cache;
use asgs_enrich::pipeline::{ClassificationMode, Pipeline, RunOptions};
use asgs_enrich::{RegionLevel, Result, Settings};

/// Knows a fixed set of places and records every query it receives.
struct FakeGeocoder {
    places: Vec<(&'static str, f64, f64)>,
    queries: Mutex<Vec<String>>,
}

impl FakeGeocoder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            places: vec![
                ("Example River, NT, Australia", -12.6, 131.4),
                ("Batchelor, NT, Australia", -13.05, 131.03),
            ],
            queries: Mutex::new(Vec::new()),
        })
    }

    fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, query: &str, _country_codes: &str) -> Result<Option<GeocodeMatch>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self
            .places
            .iter()
            .find(|(name, _, _)| *name == query)
            .map(|(name, lat, lon)| GeocodeMatch {
                latitude: *lat,
                longitude: *lon,
                address: format!("{} (resolved)", name),
            }))
    }

    fn source(&self) -> &'static str {
        "fake"
    }
}

const SA1_LAYER: &str = r#"{
  "type": "FeatureCollection",
  "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::7844" } },
  "features": [{
    "type": "Feature",
    "properties": {
      "SA1_CODE21": "70201100101",
      "SA2_CODE21": "702011001", "SA2_NAME21": "Adelaide River",
      "SA3_CODE21": "70201", "SA3_NAME21": "Litchfield",
      "SA4_CODE21": "702", "SA4_NAME21": "Northern Territory - Outback",
      "GCC_CODE21": "7RNTE", "GCC_NAME21": "Rest of NT",
      "STE_CODE21": "7", "STE_NAME21": "Northern Territory"
    },
    "geometry": {
      "type": "Polygon",
      "coordinates": [[[130.0, -13.5], [132.0, -13.5], [132.0, -12.0], [130.0, -12.0], [130.0, -13.5]]]
    }
  }]
}"#;

struct Fixture {
    dir: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new(with_boundaries: bool) -> Self {
        let dir = tempdir().unwrap();
        let mut settings = Settings {
            geocode_min_delay_sec: 0.0,
            data_dir: dir.path().join("data"),
            output_dir: dir.path().join("outputs"),
            ..Settings::default()
        };
        if with_boundaries {
            let sa1 = dir.path().join("SA1.geojson");
            fs::write(&sa1, SA1_LAYER).unwrap();
            settings.boundaries.sa1 = Some(sa1);
        }
        Self { dir, settings }
    }

    fn input(&self, file: &str, content: &str) -> RunOptions {
        let input = self.dir.path().join(file);
        fs::write(&input, content).unwrap();
        RunOptions {
            input,
            output: self.dir.path().join("outputs/chc_classified.csv"),
            skip_classification: false,
            rebuild: false,
        }
    }

    fn pipeline(&self, geocoder: Arc<FakeGeocoder>) -> Pipeline {
        Pipeline::new(&self.settings, geocoder).unwrap()
    }
}

const TWO_NAMES: &str = "CHC,Phone\n\"Example River CHC, NT, Australia\",555\n\"Nowhere CHC, NT, Australia\",\n";

#[tokio::test]
async fn classifies_and_resumes_from_cache() {
    let fixture = Fixture::new(true);
    let options = fixture.input("locations.csv", TWO_NAMES);
    let geocoder = FakeGeocoder::new();
    let pipeline = fixture.pipeline(geocoder.clone());

    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.full_processing, 2);
    assert_eq!(report.mode, ClassificationMode::Classified);
    assert_eq!(report.summary.geocoded_successfully, 1);
    assert_eq!(report.summary.classified_successfully, 1);
    assert_eq!(
        report.summary.states_distribution,
        vec![("Northern Territory".to_string(), 1)]
    );
    assert!(!report.validation.as_ref().unwrap().passed);

    let cache = load_existing_cache(&options.output, "CHC");
    assert_eq!(cache.len(), 2);
    let river = &cache[0];
    assert_eq!(river.name, "Example River CHC, NT, Australia");
    assert_eq!(river.latitude, Some(-12.6));
    assert_eq!(river.regions.finest_code(), Some("70201100101"));
    assert_eq!(river.regions.name(RegionLevel::State), Some("Northern Territory"));
    assert_eq!(river.extra, vec![("Phone".to_string(), "555".to_string())]);
    assert_eq!(cache[1].address.as_deref(), Some("Not found"));
    assert!(cache[1].regions.is_empty());

    let first_run_queries = geocoder.queries().len();

    // Second run: the classified row is reused, only the miss is retried
    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.already_complete, 1);
    assert_eq!(report.full_processing, 1);
    let new_queries = &geocoder.queries()[first_run_queries..];
    assert!(new_queries.iter().all(|q| q.starts_with("Nowhere")));
    assert_eq!(report.records[0].regions.finest_code(), Some("70201100101"));
}

#[tokio::test]
async fn geocoded_only_rows_are_classified_without_lookups() {
    let fixture = Fixture::new(true);
    let mut options = fixture.input("locations.csv", "CHC\nBatchelor CHC\n\"Batchelor, NT, Australia\"\n");
    let geocoder = FakeGeocoder::new();
    let pipeline = fixture.pipeline(geocoder.clone());

    options.skip_classification = true;
    let report = pipeline.run(&options, None).await.unwrap();
    assert_eq!(report.mode, ClassificationMode::Skipped);
    assert_eq!(report.summary.geocoded_successfully, 1);
    assert_eq!(report.summary.classified_successfully, 0);

    let before = geocoder.queries().len();
    options.skip_classification = false;
    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.classification_only, 1);
    assert_eq!(report.full_processing, 1);
    assert_eq!(report.summary.classified_successfully, 1);
    // Only the unresolved name goes back to the geocoder
    assert!(geocoder.queries()[before..]
        .iter()
        .all(|q| q.starts_with("Batchelor CHC") || q == "Batchelor"));
}

#[tokio::test]
async fn txt_identity_survives_round_trip() {
    let fixture = Fixture::new(true);
    let options = fixture.input("locations.txt", "Example River\n\n");
    let geocoder = FakeGeocoder::new();
    let pipeline = fixture.pipeline(geocoder.clone());

    pipeline.run(&options, None).await.unwrap();

    let content = fs::read_to_string(&options.output).unwrap();
    let row = content.lines().nth(1).unwrap();
    assert!(row.starts_with("Example River,-12.6,131.4,"));
    assert!(row.contains("\"Example River, NT, Australia\""));

    let calls = geocoder.queries().len();
    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.already_complete, 1);
    assert_eq!(geocoder.queries().len(), calls);
}

#[tokio::test]
async fn missing_boundaries_degrade_classification() {
    let fixture = Fixture::new(false);
    let options = fixture.input("locations.csv", TWO_NAMES);
    let pipeline = fixture.pipeline(FakeGeocoder::new());

    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.mode, ClassificationMode::Degraded);
    assert_eq!(report.summary.geocoded_successfully, 1);
    assert!(report.records.iter().all(|r| r.regions.is_empty()));
    assert!(Path::new(&options.output).exists());
}

#[tokio::test]
async fn rebuild_reprocesses_everything() {
    let fixture = Fixture::new(true);
    let mut options = fixture.input("locations.csv", TWO_NAMES);
    let geocoder = FakeGeocoder::new();
    let pipeline = fixture.pipeline(geocoder.clone());

    pipeline.run(&options, None).await.unwrap();
    options.rebuild = true;
    let report = pipeline.run(&options, None).await.unwrap();

    assert_eq!(report.full_processing, 2);
    assert_eq!(report.already_complete, 0);
    assert_eq!(report.summary.classified_successfully, 1);
}

#[tokio::test]
async fn missing_name_column_fails_the_run() {
    let fixture = Fixture::new(true);
    let options = fixture.input("locations.csv", "Facility\nDarwin\n");
    let pipeline = fixture.pipeline(FakeGeocoder::new());

    let err = pipeline.run(&options, None).await.unwrap_err();
    assert!(err.to_string().contains("CHC"));
    assert!(!options.output.exists());
}
