use crate::config::AppConfig;
use crate::types::{Boundary, PopulationIndex, Region};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use geo::MultiPolygon;
use geojson::GeoJson;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// The one normalization rule for region keys. Both sides of the join — index
/// construction and every lookup — must go through this function.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// One row of the population table, as parsed. Discarded after index construction.
#[derive(Debug, Clone)]
pub struct PopulationRecord {
    pub region: String,
    pub population: u64,
}

/// Load both input files concurrently. The map needs both; either failure
/// aborts the load with its own context rather than leaving a blank map.
pub async fn load_inputs(config: &AppConfig) -> Result<(Vec<Boundary>, Vec<PopulationRecord>)> {
    println!("Loading data...");

    let input = config.input.clone();
    let boundaries = tokio::task::spawn_blocking({
        let input = input.clone();
        move || load_boundaries(&input.boundaries, &input.name_property)
    });
    let records = tokio::task::spawn_blocking(move || {
        load_population_table(
            &input.population_csv,
            &input.region_column,
            &input.population_column,
        )
    });

    let (boundaries, records) = tokio::try_join!(boundaries, records)?;
    let boundaries = boundaries?;
    let records = records?;

    println!(
        "Loaded {} boundaries and {} population rows",
        boundaries.len(),
        records.len()
    );

    Ok((boundaries, records))
}

pub fn load_population_table(
    path: &Path,
    region_column: &str,
    population_column: &str,
) -> Result<Vec<PopulationRecord>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open population CSV: {:?}", path))?;
    parse_population_table(file, region_column, population_column)
}

fn parse_population_table<R: Read>(
    reader: R,
    region_column: &str,
    population_column: &str,
) -> Result<Vec<PopulationRecord>> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let region_idx = headers
        .iter()
        .position(|h| h == region_column)
        .ok_or_else(|| anyhow!("Region column '{}' not found in CSV", region_column))?;
    let population_idx = headers
        .iter()
        .position(|h| h == population_column)
        .ok_or_else(|| anyhow!("Population column '{}' not found in CSV", population_column))?;

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (i, result) in rdr.records().enumerate() {
        let record = result?;
        // 1-based, counting the header line
        let row = i + 2;

        let region = record.get(region_idx).unwrap_or("").trim().to_string();
        if region.is_empty() {
            skipped += 1;
            tracing::warn!("Row {}: empty region name, record excluded", row);
            continue;
        }

        // A malformed count must not silently become a valid entry: the record
        // is excluded, never recorded as 0.
        let raw_population = record.get(population_idx).unwrap_or("").trim();
        let population = match raw_population.parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                skipped += 1;
                tracing::warn!(
                    "Row {}: population '{}' for region '{}' is not a non-negative integer, record excluded",
                    row,
                    raw_population,
                    region
                );
                continue;
            }
        };

        records.push(PopulationRecord { region, population });
    }

    if skipped > 0 {
        tracing::warn!("Excluded {} malformed population rows", skipped);
    }

    Ok(records)
}

/// Build the population index: normalized key -> count. Pure; at most one entry
/// per normalized key, later duplicates overwrite earlier ones.
pub fn build_index(records: &[PopulationRecord]) -> PopulationIndex {
    let mut index = PopulationIndex::new();
    for record in records {
        index.insert(normalize_key(&record.region), record.population);
    }
    index
}

pub fn load_boundaries(path: &Path, name_property: &str) -> Result<Vec<Boundary>> {
    println!("Loading GeoJSON from {:?}...", path);
    let file =
        File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    parse_boundaries(BufReader::new(file), name_property)
}

fn parse_boundaries<R: Read>(reader: R, name_property: &str) -> Result<Vec<Boundary>> {
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut boundaries = Vec::new();
    let mut skipped = 0usize;

    for feature in collection.features {
        let name_val = feature
            .properties
            .as_ref()
            .and_then(|props| props.get(name_property));

        let name = match name_val {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let valid_geo: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of '{}': {:?}", name, e))?;

                match valid_geo {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    // Points/lines cannot be shaded
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        boundaries.push(Boundary { name, geometry });
    }

    if skipped > 0 {
        tracing::warn!(
            "Skipped {} features without a '{}' property or polygonal geometry",
            skipped,
            name_property
        );
    }

    Ok(boundaries)
}

/// Join boundaries against the population index. Absent keys are not an error:
/// the region is kept with population 0 and flagged unmatched.
pub fn join_regions(boundaries: Vec<Boundary>, index: &PopulationIndex) -> Vec<Region> {
    let total = boundaries.len();

    let regions: Vec<Region> = boundaries
        .into_iter()
        .map(|b| {
            let key = normalize_key(&b.name);
            let population = index.get(&key).copied();
            Region {
                name: b.name,
                key,
                geometry: b.geometry,
                population: population.unwrap_or(0),
                matched: population.is_some(),
            }
        })
        .collect();

    let unmatched = regions.iter().filter(|r| !r.matched).count();
    if unmatched > 0 {
        tracing::warn!(
            "{} of {} boundaries have no population entry, shading them as population 0",
            unmatched,
            total
        );
    }

    regions
}
