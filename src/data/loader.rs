//! Input tables and their CSV readers.

use chrono::{Datelike, NaiveDate};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::LocationError;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("{path}: missing required column '{column}'")]
    MissingColumn { path: String, column: String },
    #[error("{path}: invalid date '{value}' on record {record}")]
    InvalidDate {
        path: String,
        value: String,
        record: usize,
    },
    #[error("no observations remain after {0}")]
    Empty(&'static str),
    #[error("unknown panel column '{0}'")]
    UnknownColumn(String),
    #[error("panel is unbalanced: '{location}' has {got} periods, expected {expected}")]
    Unbalanced {
        location: String,
        got: usize,
        expected: usize,
    },
    #[error("{names} regressor names for {columns} design columns")]
    NameCount { names: usize, columns: usize },
    #[error("design has {rows} rows, expected {expected} ({locations} locations x {periods} periods)")]
    DesignShape {
        rows: usize,
        expected: usize,
        locations: usize,
        periods: usize,
    },
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Calendar month, the time index of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Self {
        Self { year, month }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The following calendar month.
    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.month + 1)
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Daily commodity price at a market.
#[derive(Debug, Clone)]
pub struct PriceObservation {
    pub location: String,
    pub date: NaiveDate,
    pub commodity: String,
    pub commodity_id: Option<String>,
    /// `None` when blank or non-positive.
    pub price: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherObservation {
    pub location: String,
    pub date: NaiveDate,
    pub temperature_mean_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
}

/// National monthly fuel price.
#[derive(Debug, Clone)]
pub struct FuelPrice {
    pub period: YearMonth,
    pub price: f64,
}

/// Annual harvested rice area of a regency.
#[derive(Debug, Clone)]
pub struct ProductionRecord {
    pub year: i32,
    pub region: String,
    pub harvested_area_ha: Option<f64>,
}

/// A supply-chain facility found around a market location.
#[derive(Debug, Clone)]
pub struct FacilityRecord {
    pub search_location: String,
    pub facility_type: String,
    pub distance_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    date: String,
    location_name: String,
    #[serde(default)]
    commodity_name: Option<String>,
    #[serde(default)]
    commodity_id: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    price: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawWeather {
    date: String,
    location_name: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    temperature_mean_c: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    precipitation_mm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFuel {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Price_IDR_per_Liter", default, deserialize_with = "csv::invalid_option")]
    price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawProduction {
    year: i32,
    kabupaten_kota: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    luas_panen_ha: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFacility {
    search_location: String,
    facility_type: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    distance_to_location_km: Option<f64>,
}

/// Parse `YYYY-MM-DD`, tolerating a trailing time component.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            trimmed
                .get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        })
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%d/%m/%Y").ok())
}

/// Deserialize every record of a CSV source after checking its header.
fn read_records<R, T>(reader: R, source: &str, required: &[&str]) -> Result<Vec<T>, DataError>
where
    R: io::Read,
    T: DeserializeOwned,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|source_err| DataError::Csv {
            path: source.to_string(),
            source: source_err,
        })?
        .clone();
    for column in required {
        if !headers.iter().any(|h| h == *column) {
            return Err(DataError::MissingColumn {
                path: source.to_string(),
                column: (*column).to_string(),
            });
        }
    }

    let mut out = Vec::new();
    for record in rdr.deserialize() {
        out.push(record.map_err(|source_err| DataError::Csv {
            path: source.to_string(),
            source: source_err,
        })?);
    }
    debug!(source, rows = out.len(), "read csv table");
    Ok(out)
}

fn open(path: &Path) -> Result<std::fs::File, DataError> {
    std::fs::File::open(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn date_or_err(value: &str, source: &str, record: usize) -> Result<NaiveDate, DataError> {
    parse_date(value).ok_or_else(|| DataError::InvalidDate {
        path: source.to_string(),
        value: value.to_string(),
        record,
    })
}

pub fn read_prices<R: io::Read>(reader: R, source: &str) -> Result<Vec<PriceObservation>, DataError> {
    let raw: Vec<RawPrice> = read_records(reader, source, &["date", "location_name", "price"])?;
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| {
            let commodity = r
                .commodity_name
                .clone()
                .or_else(|| r.commodity_id.clone())
                .ok_or_else(|| DataError::MissingColumn {
                    path: source.to_string(),
                    column: "commodity_name".to_string(),
                })?;
            Ok(PriceObservation {
                location: r.location_name,
                date: date_or_err(&r.date, source, i + 1)?,
                commodity,
                commodity_id: r.commodity_id,
                price: r.price.filter(|p| *p > 0.0 && p.is_finite()),
                unit: r.unit,
            })
        })
        .collect()
}

pub fn read_weather<R: io::Read>(
    reader: R,
    source: &str,
) -> Result<Vec<WeatherObservation>, DataError> {
    let raw: Vec<RawWeather> = read_records(
        reader,
        source,
        &["date", "location_name", "temperature_mean_c", "precipitation_mm"],
    )?;
    raw.into_iter()
        .enumerate()
        .map(|(i, r)| {
            Ok(WeatherObservation {
                location: r.location_name,
                date: date_or_err(&r.date, source, i + 1)?,
                temperature_mean_c: r.temperature_mean_c,
                precipitation_mm: r.precipitation_mm,
            })
        })
        .collect()
}

pub fn read_fuel<R: io::Read>(reader: R, source: &str) -> Result<Vec<FuelPrice>, DataError> {
    let raw: Vec<RawFuel> = read_records(reader, source, &["Date", "Price_IDR_per_Liter"])?;
    let mut out = Vec::with_capacity(raw.len());
    for (i, r) in raw.into_iter().enumerate() {
        let date = date_or_err(&r.date, source, i + 1)?;
        if let Some(price) = r.price {
            out.push(FuelPrice {
                period: YearMonth::from_date(date),
                price,
            });
        }
    }
    Ok(out)
}

pub fn read_production<R: io::Read>(
    reader: R,
    source: &str,
) -> Result<Vec<ProductionRecord>, DataError> {
    let raw: Vec<RawProduction> =
        read_records(reader, source, &["year", "kabupaten_kota", "luas_panen_ha"])?;
    Ok(raw
        .into_iter()
        .map(|r| ProductionRecord {
            year: r.year,
            region: r.kabupaten_kota,
            harvested_area_ha: r.luas_panen_ha,
        })
        .collect())
}

pub fn read_facilities<R: io::Read>(
    reader: R,
    source: &str,
) -> Result<Vec<FacilityRecord>, DataError> {
    let raw: Vec<RawFacility> = read_records(
        reader,
        source,
        &["search_location", "facility_type", "distance_to_location_km"],
    )?;
    Ok(raw
        .into_iter()
        .map(|r| FacilityRecord {
            search_location: r.search_location,
            facility_type: r.facility_type,
            distance_km: r.distance_to_location_km,
        })
        .collect())
}

/// File locations of the five input tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputPaths {
    pub prices: PathBuf,
    pub weather: PathBuf,
    pub fuel: PathBuf,
    pub production: PathBuf,
    pub facilities: PathBuf,
}

/// All input tables, loaded but not yet joined.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub prices: Vec<PriceObservation>,
    pub weather: Vec<WeatherObservation>,
    pub fuel: Vec<FuelPrice>,
    pub production: Vec<ProductionRecord>,
    pub facilities: Vec<FacilityRecord>,
}

impl SourceTables {
    pub fn load(paths: &InputPaths) -> Result<Self, DataError> {
        let label = |p: &Path| p.display().to_string();
        let tables = Self {
            prices: read_prices(open(&paths.prices)?, &label(&paths.prices))?,
            weather: read_weather(open(&paths.weather)?, &label(&paths.weather))?,
            fuel: read_fuel(open(&paths.fuel)?, &label(&paths.fuel))?,
            production: read_production(open(&paths.production)?, &label(&paths.production))?,
            facilities: read_facilities(open(&paths.facilities)?, &label(&paths.facilities))?,
        };
        info!(
            prices = tables.prices.len(),
            weather = tables.weather.len(),
            fuel = tables.fuel.len(),
            production = tables.production.len(),
            facilities = tables.facilities.len(),
            "loaded source tables"
        );
        Ok(tables)
    }
}
