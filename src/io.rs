//! Reading inputs and caches, writing the result table.

use std::fs;
use std::path::Path;

use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::models::{LocationRecord, RegionEntry, RegionLevel};

pub const LATITUDE: &str = "Latitude";
pub const LONGITUDE: &str = "Longitude";
pub const ADDRESS: &str = "Address";
/// Exact string submitted for geocoding; the record identity
pub const GEOCODE_QUERY: &str = "Geocode_Query";

const SAMPLE_LOCATIONS: &[&str] = &[
    "Adelaide River CHC, NT, Australia",
    "Ali Curung CHC, NT, Australia",
    "Alpurrurulam CHC, NT, Australia",
    "Ampilatwatja CHC, NT, Australia",
    "Amunturrngu CHC, NT, Australia",
    "Angurugu CHC, NT, Australia",
    "Aputula CHC, NT, Australia",
    "Areyonga CHC, NT, Australia",
    "Atitjere CHC, NT, Australia",
    "Batchelor CHC, NT, Australia",
];

/// The 15 region columns in output order
pub fn region_columns() -> Vec<&'static str> {
    RegionLevel::all().iter().flat_map(|l| l.columns()).collect()
}

fn is_managed_column(column: &str, name_column: &str) -> bool {
    column == name_column
        || [LATITUDE, LONGITUDE, ADDRESS, GEOCODE_QUERY].contains(&column)
        || region_columns().contains(&column)
}

/// Read the names to process from a `.txt` list or a CSV table.
pub fn read_locations(path: &Path, settings: &Settings) -> Result<Vec<LocationRecord>> {
    if !path.exists() {
        return Err(Error::InputNotFound(path.to_path_buf()));
    }

    info!("Reading locations from: {}", path.display());

    let is_txt = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));

    let records = if is_txt {
        let content = fs::read_to_string(path)?;
        let records: Vec<LocationRecord> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let mut record =
                    LocationRecord::new(format!("{}, {}", line, settings.region_suffix));
                record.display_name = Some(line.to_string());
                record
            })
            .collect();
        info!(
            "Converted {} raw locality names to qualified format",
            records.len()
        );
        records
    } else {
        let mut records = read_table(path, &settings.name_column)?;
        // Fresh input carries identity only
        for record in &mut records {
            record.latitude = None;
            record.longitude = None;
            record.address = None;
            record.regions = Default::default();
        }
        records
    };

    info!("Loaded {} locations", records.len());
    Ok(records)
}

/// Load the previous result table; missing or unreadable files give an empty cache.
pub fn load_existing_cache(path: &Path, name_column: &str) -> Vec<LocationRecord> {
    if !path.exists() {
        info!("No existing cache found at {}", path.display());
        return Vec::new();
    }

    match read_table(path, name_column) {
        Ok(records) => {
            info!(
                "Loaded {} cached records from {}",
                records.len(),
                path.display()
            );
            records
        }
        Err(err) => {
            warn!(
                "Ignoring unreadable cache {}: {}; starting fresh",
                path.display(),
                err
            );
            Vec::new()
        }
    }
}

fn read_table(path: &Path, name_column: &str) -> Result<Vec<LocationRecord>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let name_idx = column(name_column).ok_or_else(|| Error::MissingColumn {
        column: name_column.to_string(),
        available: headers.iter().map(str::to_string).collect(),
    })?;
    let query_idx = column(GEOCODE_QUERY);
    let lat_idx = column(LATITUDE);
    let lon_idx = column(LONGITUDE);
    let address_idx = column(ADDRESS);
    let extra_idx: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| !is_managed_column(h, name_column))
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut records = Vec::new();
    let mut dropped = 0;

    for row in reader.records() {
        let row = row?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| row.get(i))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let shown = row.get(name_idx).unwrap_or_default();
        if shown.trim().is_empty() {
            dropped += 1;
            continue;
        }

        let query = query_idx
            .and_then(|i| row.get(i))
            .filter(|v| !v.trim().is_empty());
        let mut record = match query {
            Some(query) if query != shown => {
                let mut r = LocationRecord::new(query);
                r.display_name = Some(shown.to_string());
                r
            }
            _ => LocationRecord::new(shown),
        };

        record.latitude = field(lat_idx).and_then(|v| v.parse().ok());
        record.longitude = field(lon_idx).and_then(|v| v.parse().ok());
        record.address = field(address_idx).map(str::to_string);

        for level in RegionLevel::all() {
            let code = field(column(level.code_column())).map(str::to_string);
            let name = level
                .name_column()
                .and_then(|c| field(column(c)))
                .map(str::to_string);
            record.regions.set(*level, RegionEntry::new(code, name));
        }

        record.extra = extra_idx
            .iter()
            .map(|(i, h)| (h.clone(), row.get(*i).unwrap_or_default().to_string()))
            .collect();

        records.push(record);
    }

    if dropped > 0 {
        info!("Removed {} rows with empty location names", dropped);
    }

    Ok(records)
}

/// Write the result table atomically, creating parent directories.
pub fn write_output_csv(records: &[LocationRecord], path: &Path, name_column: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    info!("Writing {} results to: {}", records.len(), path.display());

    let mut extra_columns: Vec<&str> = Vec::new();
    for record in records {
        for (column, _) in &record.extra {
            if !extra_columns.contains(&column.as_str()) {
                extra_columns.push(column);
            }
        }
    }

    let mut header = vec![name_column, LATITUDE, LONGITUDE, ADDRESS];
    header.extend(region_columns());
    header.push(GEOCODE_QUERY);
    header.extend(extra_columns.iter().copied());

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = WriterBuilder::new().from_writer(tmp.as_file_mut());
        writer.write_record(&header)?;

        for record in records {
            let mut row = StringRecord::new();
            row.push_field(record.output_name());
            row.push_field(&record.latitude.map(|v| v.to_string()).unwrap_or_default());
            row.push_field(&record.longitude.map(|v| v.to_string()).unwrap_or_default());
            row.push_field(record.address.as_deref().unwrap_or_default());
            for level in RegionLevel::all() {
                row.push_field(record.regions.code(*level).unwrap_or_default());
                if level.name_column().is_some() {
                    row.push_field(record.regions.name(*level).unwrap_or_default());
                }
            }
            row.push_field(&record.name);
            for column in &extra_columns {
                let value = record
                    .extra
                    .iter()
                    .find(|(c, _)| c == column)
                    .map(|(_, v)| v.as_str())
                    .unwrap_or_default();
                row.push_field(value);
            }
            writer.write_record(&row)?;
        }
        writer.flush()?;
    }
    tmp.as_file_mut().sync_all()?;

    tmp.persist(path).map_err(|e| {
        error!("Error writing CSV file {}: {}", path.display(), e.error);
        Error::Io(e.error)
    })?;

    info!("Successfully wrote output to {}", path.display());
    Ok(())
}

/// Write a quoted single-column CSV of sample facility names.
pub fn create_sample_locations_file(path: &Path, name_column: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_path(path)?;
    writer.write_record([name_column])?;
    for name in SAMPLE_LOCATIONS {
        writer.write_record([*name])?;
    }
    writer.flush()?;

    info!("Created sample locations file: {}", path.display());
    Ok(())
}
