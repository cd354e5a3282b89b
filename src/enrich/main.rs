//! Facility name enrichment CLI.
//!
//! Geocodes names, classifies them into ASGS regions and keeps the
//! result table as a resumable cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use asgs_enrich::config::BoundaryStatus;
use asgs_enrich::geocode::{NominatimClient, ProgressObserver};
use asgs_enrich::io::create_sample_locations_file;
use asgs_enrich::models::{LocationRecord, RegionLevel};
use asgs_enrich::pipeline::{ClassificationMode, Pipeline, RunOptions, RunReport};
use asgs_enrich::Settings;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const DEFAULT_INPUT: &str = "data/input/locations.csv";
const DEFAULT_OUTPUT: &str = "outputs/chc_classified.csv";
const PREVIEW_ROWS: usize = 20;

#[derive(Parser, Debug)]
#[command(name = "enrich")]
#[command(about = "Geocode facility names and classify them into ASGS regions")]
struct Args {
    /// TOML settings file; the environment is used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Geocode and classify every name in the input
    Run {
        /// Input CSV (name column) or TXT (one name per line)
        #[arg(short, long = "input-csv", default_value = DEFAULT_INPUT)]
        input_csv: PathBuf,

        /// Output CSV, reused as the cache on the next run
        #[arg(short, long = "output-csv", default_value = DEFAULT_OUTPUT)]
        output_csv: PathBuf,

        /// Geocode only
        #[arg(long)]
        skip_classification: bool,

        /// Ignore the cache and reprocess every name
        #[arg(long)]
        rebuild: bool,
    },

    /// Write a sample input file
    Sample { path: PathBuf },

    /// Show configuration and boundary file status
    Info,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::from_env(),
    };

    match args.command {
        Command::Run {
            input_csv,
            output_csv,
            skip_classification,
            rebuild,
        } => {
            let options = RunOptions {
                input: input_csv,
                output: output_csv,
                skip_classification,
                rebuild,
            };
            run(&settings, options).await
        }
        Command::Sample { path } => {
            create_sample_locations_file(&path, &settings.name_column)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Sample file created: {}", path.display());
            Ok(())
        }
        Command::Info => {
            print_info(&settings);
            Ok(())
        }
    }
}

async fn run(settings: &Settings, options: RunOptions) -> Result<()> {
    info!("Facility enrichment");
    info!("Input: {}", options.input.display());
    info!("Output: {}", options.output.display());

    if !options.input.exists() && options.input == Path::new(DEFAULT_INPUT) {
        warn!("Input not found; creating sample data at {}", DEFAULT_INPUT);
        create_sample_locations_file(&options.input, &settings.name_column)
            .context("Failed to create sample input")?;
    }

    let geocoder = NominatimClient::from_settings(settings).context("Failed to build geocoder")?;
    let pipeline = Pipeline::new(settings, Arc::new(geocoder))
        .context("Failed to set up the pipeline")?;

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} geocoded")?
            .progress_chars("#>-"),
    );
    let bar = pb.clone();
    let observer: ProgressObserver = Arc::new(move |done, total| {
        bar.set_length(total as u64);
        bar.set_position(done as u64);
    });

    let report = pipeline
        .run(&options, Some(observer))
        .await
        .context("Processing failed")?;
    pb.finish_and_clear();

    print_report(&report);
    print_preview(&report.records, &settings.name_column);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!(
        "Cache: {} complete, {} classification needed, {} full processing",
        report.already_complete, report.classification_only, report.full_processing
    );

    if let Some(validation) = &report.validation {
        if !validation.passed {
            println!(
                "Warning: geocoding validation failed ({:.1}% success)",
                validation.success_rate * 100.0
            );
        }
    }

    match report.mode {
        ClassificationMode::Classified => {}
        ClassificationMode::Skipped => println!("Region classification skipped"),
        ClassificationMode::Degraded => {
            println!("No boundary files available; region columns are empty");
            println!("Set ASGS_SA1_PATH / ASGS_IARE_PATH or run `enrich info`");
        }
    }

    let s = &report.summary;
    println!();
    println!("{:<30} {:>10}", "Metric", "Value");
    println!("{:<30} {:>10}", "Total Locations", s.total_locations);
    println!("{:<30} {:>10}", "Successfully Geocoded", s.geocoded_successfully);
    println!(
        "{:<30} {:>9.1}%",
        "Geocoding Success Rate",
        s.geocoding_success_rate * 100.0
    );
    if report.mode == ClassificationMode::Classified {
        println!("{:<30} {:>10}", "Successfully Classified", s.classified_successfully);
        println!(
            "{:<30} {:>9.1}%",
            "Classification Success Rate",
            s.classification_success_rate * 100.0
        );
    }

    if !s.states_distribution.is_empty() {
        println!();
        println!("{:<30} {:>10}", "State/Territory", "Count");
        for (state, count) in &s.states_distribution {
            println!("{:<30} {:>10}", state, count);
        }
    }

    println!();
    println!("Results saved to: {}", report.output.display());
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        value.to_string()
    } else {
        let cut: String = value.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

fn print_preview(records: &[LocationRecord], name_column: &str) {
    println!();
    println!(
        "{:<40} {:>10} {:>11} {:<24} {:<20}",
        name_column, "Latitude", "Longitude", "SA2_NAME", "STATE_NAME"
    );
    for record in records.iter().take(PREVIEW_ROWS) {
        let coord = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_default();
        println!(
            "{:<40} {:>10} {:>11} {:<24} {:<20}",
            truncate(record.output_name(), 40),
            coord(record.latitude),
            coord(record.longitude),
            truncate(record.regions.name(RegionLevel::Sa2).unwrap_or_default(), 24),
            record.regions.name(RegionLevel::State).unwrap_or_default(),
        );
    }
    if records.len() > PREVIEW_ROWS {
        println!("\n... and {} more rows", records.len() - PREVIEW_ROWS);
    }
}

fn print_info(settings: &Settings) {
    println!("Configuration");
    println!("  Nominatim URL:      {}", settings.nominatim_url);
    println!("  User agent:         {}", settings.nominatim_user_agent);
    println!("  Min delay (s):      {}", settings.geocode_min_delay_sec);
    println!("  Max retries:        {}", settings.geocode_max_retries);
    println!("  Country codes:      {}", settings.country_codes);
    println!("  Point CRS:          {}", settings.default_crs);
    println!("  Data dir:           {}", settings.data_dir.display());
    println!("  Output dir:         {}", settings.output_dir.display());
    println!("  Min success rate:   {:.0}%", settings.min_success_rate * 100.0);
    println!();
    println!("Boundary files");
    for (layer, path, status) in settings.boundary_status() {
        let status = match status {
            BoundaryStatus::NotConfigured => "not configured",
            BoundaryStatus::Present => "present",
            BoundaryStatus::Missing => "missing",
        };
        match path {
            Some(path) => println!("  {:<6} {:<15} {}", layer, status, path.display()),
            None => println!("  {:<6} {}", layer, status),
        }
    }
    if !settings.any_boundary_available() {
        println!();
        println!("No joinable boundary file found; classification will be skipped");
    }
}
