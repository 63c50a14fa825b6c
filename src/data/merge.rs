//! Joins the price table with its covariates.
//!
//! Every join keeps the left (price) side and records what did not match in a
//! [`JoinAudit`] instead of dropping rows silently.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

use super::loader::{DataError, SourceTables, YearMonth};
use crate::core::LocationRegistry;

/// Maximum number of unmatched keys kept per side of a join.
const KEY_SAMPLE: usize = 10;

/// Facility type counted for economic weights.
pub const DISTRIBUTION_FACILITY: &str = "distribution";

/// Outcome of one left join.
#[derive(Debug, Clone, Serialize)]
pub struct JoinAudit {
    pub name: String,
    pub left_rows: usize,
    pub matched: usize,
    pub unmatched_left: usize,
    pub unmatched_right: usize,
    #[serde(skip)]
    pub unmatched_left_keys: Vec<String>,
    #[serde(skip)]
    pub unmatched_right_keys: Vec<String>,
}

impl JoinAudit {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            left_rows: 0,
            matched: 0,
            unmatched_left: 0,
            unmatched_right: 0,
            unmatched_left_keys: Vec::new(),
            unmatched_right_keys: Vec::new(),
        }
    }

    fn record(&mut self, hit: bool, key: impl FnOnce() -> String) {
        self.left_rows += 1;
        if hit {
            self.matched += 1;
        } else {
            self.unmatched_left += 1;
            if self.unmatched_left_keys.len() < KEY_SAMPLE {
                let key = key();
                if !self.unmatched_left_keys.contains(&key) {
                    self.unmatched_left_keys.push(key);
                }
            }
        }
    }

    fn finish<K: ToString>(mut self, unused_right: impl Iterator<Item = K>) -> Self {
        for key in unused_right {
            self.unmatched_right += 1;
            if self.unmatched_right_keys.len() < KEY_SAMPLE {
                self.unmatched_right_keys.push(key.to_string());
            }
        }
        if self.unmatched_left > 0 || self.unmatched_right > 0 {
            warn!(
                join = %self.name,
                matched = self.matched,
                unmatched_left = self.unmatched_left,
                unmatched_right = self.unmatched_right,
                left_sample = ?self.unmatched_left_keys,
                right_sample = ?self.unmatched_right_keys,
                "join has unmatched keys"
            );
        }
        self
    }

    pub fn match_rate(&self) -> f64 {
        if self.left_rows == 0 {
            return f64::NAN;
        }
        self.matched as f64 / self.left_rows as f64
    }
}

/// Per-location aggregates of the facility table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FacilitySummary {
    /// Mean distance to any facility, by canonical location.
    pub avg_distance_km: BTreeMap<String, f64>,
    /// Number of distribution facilities, by canonical location.
    pub distribution_counts: BTreeMap<String, usize>,
    /// Median of `avg_distance_km`, used for locations without facilities.
    pub median_distance_km: f64,
}

impl FacilitySummary {
    /// Facility counts aligned with `locations`; a location with no recorded
    /// distribution facility counts as one.
    pub fn facility_counts(&self, locations: &[String]) -> Vec<f64> {
        locations
            .iter()
            .map(|loc| {
                self.distribution_counts
                    .get(loc)
                    .map_or(1.0, |&c| c as f64)
            })
            .collect()
    }

    pub fn distance_for(&self, location: &str) -> Option<f64> {
        self.avg_distance_km.get(location).copied()
    }
}

/// Row counts for every stage of the merge.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub price_rows: usize,
    pub commodity_rows: usize,
    pub dropped_unresolved: usize,
    #[serde(skip)]
    pub unresolved_names: Vec<String>,
    pub production_filled_zero: usize,
    pub distance_filled_median: usize,
    pub fuel_forward_filled: usize,
    pub dropped_missing_price: usize,
    pub dropped_missing_precipitation: usize,
    pub dropped_missing_fuel: usize,
    pub final_rows: usize,
    #[serde(skip)]
    pub joins: Vec<JoinAudit>,
}

/// One daily observation after all joins.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub location: String,
    pub date: NaiveDate,
    pub commodity: String,
    pub price: f64,
    pub precipitation_mm: f64,
    pub temperature_mean_c: Option<f64>,
    pub fuel_price: f64,
    pub harvested_area_ha: f64,
    pub avg_distance_km: f64,
}

impl MergedRecord {
    pub fn period(&self) -> YearMonth {
        YearMonth::from_date(self.date)
    }
}

#[derive(Debug, Clone)]
pub struct MergedDataset {
    pub records: Vec<MergedRecord>,
    pub facilities: FacilitySummary,
    pub report: MergeReport,
}

impl MergedDataset {
    /// Canonical locations present, sorted.
    pub fn locations(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| r.location.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Intermediate row while covariates are being attached.
struct Staged {
    location: String,
    date: NaiveDate,
    commodity: String,
    price: Option<f64>,
    precipitation_mm: Option<f64>,
    temperature_mean_c: Option<f64>,
    fuel_price: Option<f64>,
    harvested_area_ha: f64,
    avg_distance_km: f64,
}

/// Canonicalises locations through a registry and joins the source tables.
#[derive(Debug, Clone, Copy)]
pub struct DataMerger<'a> {
    registry: &'a LocationRegistry,
}

impl<'a> DataMerger<'a> {
    pub fn new(registry: &'a LocationRegistry) -> Self {
        Self { registry }
    }

    /// Aggregate the facility table by canonical location.
    pub fn summarize_facilities(&self, tables: &SourceTables) -> FacilitySummary {
        let mut distances: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();

        for f in &tables.facilities {
            let Some(loc) = self.registry.resolve(&f.search_location) else {
                continue;
            };
            if let Some(d) = f.distance_km.filter(|d| d.is_finite()) {
                let entry = distances.entry(loc.to_string()).or_insert((0.0, 0));
                entry.0 += d;
                entry.1 += 1;
            }
            if f.facility_type.trim().eq_ignore_ascii_case(DISTRIBUTION_FACILITY) {
                *counts.entry(loc.to_string()).or_insert(0) += 1;
            }
        }

        let avg_distance_km: BTreeMap<String, f64> = distances
            .into_iter()
            .map(|(loc, (sum, n))| (loc, sum / n as f64))
            .collect();
        let median_distance_km = median(avg_distance_km.values().copied().collect());

        FacilitySummary {
            avg_distance_km,
            distribution_counts: counts,
            median_distance_km,
        }
    }

    /// Join prices for one commodity with weather, fuel, production and
    /// facility distance.
    ///
    /// `commodity` matches the commodity name or id case-insensitively; `None`
    /// keeps every commodity.
    pub fn merge(
        &self,
        tables: &SourceTables,
        commodity: Option<&str>,
    ) -> Result<MergedDataset, DataError> {
        let mut report = MergeReport {
            price_rows: tables.prices.len(),
            ..MergeReport::default()
        };

        let wanted = commodity.map(|c| c.trim().to_lowercase());
        let selected: Vec<_> = tables
            .prices
            .iter()
            .filter(|p| match &wanted {
                None => true,
                Some(w) => {
                    p.commodity.trim().to_lowercase() == *w
                        || p.commodity_id
                            .as_deref()
                            .is_some_and(|id| id.trim().to_lowercase() == *w)
                }
            })
            .collect();
        report.commodity_rows = selected.len();
        if selected.is_empty() {
            return Err(DataError::Empty("commodity filter"));
        }

        let mut staged = Vec::with_capacity(selected.len());
        let mut unresolved = BTreeSet::new();
        for p in selected {
            match self.registry.resolve(&p.location) {
                Some(loc) => staged.push(Staged {
                    location: loc.to_string(),
                    date: p.date,
                    commodity: p.commodity.clone(),
                    price: p.price,
                    precipitation_mm: None,
                    temperature_mean_c: None,
                    fuel_price: None,
                    harvested_area_ha: 0.0,
                    avg_distance_km: f64::NAN,
                }),
                None => {
                    report.dropped_unresolved += 1;
                    unresolved.insert(p.location.trim().to_string());
                }
            }
        }
        if !unresolved.is_empty() {
            warn!(
                rows = report.dropped_unresolved,
                names = ?unresolved,
                "dropping price rows with unregistered locations"
            );
        }
        report.unresolved_names = unresolved.into_iter().collect();
        if staged.is_empty() {
            return Err(DataError::Empty("location resolution"));
        }

        report.joins.push(self.join_weather(tables, &mut staged));
        let fuel = join_fuel(tables, &mut staged, &mut report);
        report.joins.push(fuel);
        let production = self.join_production(tables, &mut staged, &mut report);
        report.joins.push(production);

        let facilities = self.summarize_facilities(tables);
        let mut audit = JoinAudit::new("facility_distance");
        let mut used = BTreeSet::new();
        for row in &mut staged {
            let hit = facilities.distance_for(&row.location);
            audit.record(hit.is_some(), || row.location.clone());
            match hit {
                Some(d) => {
                    used.insert(row.location.clone());
                    row.avg_distance_km = d;
                }
                None => {
                    report.distance_filled_median += 1;
                    row.avg_distance_km = facilities.median_distance_km;
                }
            }
        }
        let unused = facilities
            .avg_distance_km
            .keys()
            .filter(|k| !used.contains(*k))
            .cloned();
        report.joins.push(audit.finish(unused));

        let mut records = Vec::with_capacity(staged.len());
        for row in staged {
            let Some(price) = row.price else {
                report.dropped_missing_price += 1;
                continue;
            };
            let Some(precipitation_mm) = row.precipitation_mm else {
                report.dropped_missing_precipitation += 1;
                continue;
            };
            let Some(fuel_price) = row.fuel_price else {
                report.dropped_missing_fuel += 1;
                continue;
            };
            records.push(MergedRecord {
                location: row.location,
                date: row.date,
                commodity: row.commodity,
                price,
                precipitation_mm,
                temperature_mean_c: row.temperature_mean_c,
                fuel_price,
                harvested_area_ha: row.harvested_area_ha,
                avg_distance_km: row.avg_distance_km,
            });
        }
        report.final_rows = records.len();

        let dropped = report.dropped_missing_price
            + report.dropped_missing_precipitation
            + report.dropped_missing_fuel;
        if dropped > 0 {
            warn!(
                price = report.dropped_missing_price,
                precipitation = report.dropped_missing_precipitation,
                fuel = report.dropped_missing_fuel,
                "dropped rows with missing core variables"
            );
        }
        if records.is_empty() {
            return Err(DataError::Empty("merge"));
        }
        info!(
            rows = records.len(),
            commodity = commodity.unwrap_or("all"),
            "merged daily observations"
        );

        Ok(MergedDataset {
            records,
            facilities,
            report,
        })
    }

    fn join_weather(&self, tables: &SourceTables, staged: &mut [Staged]) -> JoinAudit {
        let mut weather: HashMap<(String, NaiveDate), (Option<f64>, Option<f64>)> =
            HashMap::new();
        for w in &tables.weather {
            if let Some(loc) = self.registry.resolve(&w.location) {
                weather
                    .entry((loc.to_string(), w.date))
                    .or_insert((w.precipitation_mm, w.temperature_mean_c));
            }
        }

        let mut audit = JoinAudit::new("weather");
        let mut used = BTreeSet::new();
        for row in staged.iter_mut() {
            let key = (row.location.clone(), row.date);
            let hit = weather.get(&key);
            audit.record(hit.is_some(), || format!("{} {}", row.location, row.date));
            if let Some(&(precip, temp)) = hit {
                row.precipitation_mm = precip;
                row.temperature_mean_c = temp;
                used.insert(key);
            }
        }
        let mut unused: Vec<_> = weather
            .keys()
            .filter(|k| !used.contains(*k))
            .map(|(loc, date)| format!("{loc} {date}"))
            .collect();
        unused.sort();
        audit.finish(unused.into_iter())
    }

    fn join_production(
        &self,
        tables: &SourceTables,
        staged: &mut [Staged],
        report: &mut MergeReport,
    ) -> JoinAudit {
        let mut production: HashMap<(i32, String), f64> = HashMap::new();
        for p in &tables.production {
            if let (Some(loc), Some(area)) = (self.registry.resolve(&p.region), p.harvested_area_ha)
            {
                production.entry((p.year, loc.to_string())).or_insert(area);
            }
        }

        let mut audit = JoinAudit::new("production");
        let mut used = BTreeSet::new();
        for row in staged.iter_mut() {
            let key = (row.date.year(), row.location.clone());
            let hit = production.get(&key).copied();
            audit.record(hit.is_some(), || format!("{} {}", key.0, key.1));
            match hit {
                Some(area) => {
                    row.harvested_area_ha = area;
                    used.insert(key);
                }
                None => {
                    // Urban regencies such as DKI Jakarta have no paddy fields.
                    row.harvested_area_ha = 0.0;
                    report.production_filled_zero += 1;
                }
            }
        }
        let mut unused: Vec<_> = production
            .keys()
            .filter(|k| !used.contains(*k))
            .map(|(year, loc)| format!("{year} {loc}"))
            .collect();
        unused.sort();
        audit.finish(unused.into_iter())
    }
}

/// Monthly fuel join, then forward fill within each (location, commodity)
/// series ordered by date.
fn join_fuel(tables: &SourceTables, staged: &mut [Staged], report: &mut MergeReport) -> JoinAudit {
    let fuel: BTreeMap<YearMonth, f64> = tables.fuel.iter().map(|f| (f.period, f.price)).collect();

    let mut audit = JoinAudit::new("fuel");
    let mut used = BTreeSet::new();
    for row in staged.iter_mut() {
        let period = YearMonth::from_date(row.date);
        let hit = fuel.get(&period).copied();
        audit.record(hit.is_some(), || period.to_string());
        if hit.is_some() {
            used.insert(period);
        }
        row.fuel_price = hit;
    }

    let mut order: Vec<usize> = (0..staged.len()).collect();
    order.sort_by(|&a, &b| {
        (&staged[a].location, &staged[a].commodity, staged[a].date).cmp(&(
            &staged[b].location,
            &staged[b].commodity,
            staged[b].date,
        ))
    });
    let mut last: Option<(String, String, f64)> = None;
    for idx in order {
        let row = &mut staged[idx];
        match row.fuel_price {
            Some(v) => last = Some((row.location.clone(), row.commodity.clone(), v)),
            None => {
                if let Some((loc, com, v)) = &last {
                    if *loc == row.location && *com == row.commodity {
                        row.fuel_price = Some(*v);
                        report.fuel_forward_filled += 1;
                    }
                }
            }
        }
    }

    audit.finish(fuel.keys().filter(|k| !used.contains(*k)))
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}
