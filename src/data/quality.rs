//! Missing-value and coverage summary of the inputs.

use serde::Serialize;
use std::collections::BTreeMap;

use super::loader::SourceTables;
use super::merge::MergedDataset;
use super::panel::Panel;

/// Missing count of one column.
#[derive(Debug, Clone, Serialize)]
pub struct MissingCount {
    pub table: &'static str,
    pub column: &'static str,
    pub rows: usize,
    pub missing: usize,
}

impl MissingCount {
    fn new(table: &'static str, column: &'static str, rows: usize, missing: usize) -> Self {
        Self {
            table,
            column,
            rows,
            missing,
        }
    }

    pub fn share(&self) -> f64 {
        if self.rows == 0 {
            0.0
        } else {
            self.missing as f64 / self.rows as f64
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DataQualityReport {
    pub missing: Vec<MissingCount>,
    /// Daily observations per canonical location after merging.
    pub daily_observations: BTreeMap<String, usize>,
    /// Months per location in the estimation panel.
    pub panel_periods: BTreeMap<String, usize>,
    pub balanced: bool,
}

impl DataQualityReport {
    pub fn build(tables: &SourceTables, merged: &MergedDataset, panel: &Panel) -> Self {
        let prices = tables.prices.len();
        let weather = tables.weather.len();
        let facilities = tables.facilities.len();
        let production = tables.production.len();

        let missing = vec![
            MissingCount::new(
                "prices",
                "price",
                prices,
                tables.prices.iter().filter(|p| p.price.is_none()).count(),
            ),
            MissingCount::new(
                "weather",
                "precipitation_mm",
                weather,
                tables
                    .weather
                    .iter()
                    .filter(|w| w.precipitation_mm.is_none())
                    .count(),
            ),
            MissingCount::new(
                "weather",
                "temperature_mean_c",
                weather,
                tables
                    .weather
                    .iter()
                    .filter(|w| w.temperature_mean_c.is_none())
                    .count(),
            ),
            MissingCount::new(
                "production",
                "luas_panen_ha",
                production,
                tables
                    .production
                    .iter()
                    .filter(|p| p.harvested_area_ha.is_none())
                    .count(),
            ),
            MissingCount::new(
                "facilities",
                "distance_to_location_km",
                facilities,
                tables
                    .facilities
                    .iter()
                    .filter(|f| f.distance_km.is_none())
                    .count(),
            ),
        ];

        let mut daily_observations = BTreeMap::new();
        for r in &merged.records {
            *daily_observations.entry(r.location.clone()).or_insert(0) += 1;
        }

        Self {
            missing,
            daily_observations,
            panel_periods: panel.report().periods_per_location.clone(),
            balanced: panel.is_balanced(),
        }
    }

    pub fn total_missing(&self) -> usize {
        self.missing.iter().map(|m| m.missing).sum()
    }
}
