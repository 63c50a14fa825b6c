//! Location × month panel assembly.

use faer::{Col, Mat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::loader::{DataError, YearMonth};
use super::merge::MergedRecord;

/// Prefix of month-of-year dummy columns.
pub const MONTH_DUMMY_PREFIX: &str = "month_";

/// Dependent variable name, accepted by the column accessors.
pub const PRICE: &str = "price";

/// Lag depths of the dynamic covariates, in months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagSpec {
    pub price: usize,
    pub fuel: usize,
    pub rain: usize,
    pub temperature: usize,
}

impl Default for LagSpec {
    fn default() -> Self {
        Self {
            price: 1,
            fuel: 1,
            rain: 3,
            temperature: 1,
        }
    }
}

impl LagSpec {
    pub fn max_lag(&self) -> usize {
        self.price
            .max(self.fuel)
            .max(self.rain)
            .max(self.temperature)
    }
}

/// Monthly aggregate of one location.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRow {
    pub location: String,
    pub period: YearMonth,
    pub price: f64,
    pub precipitation_mm: f64,
    /// Mean over days with a reading.
    pub temperature_mean_c: Option<f64>,
    pub fuel_price: f64,
    pub harvested_area_ha: f64,
    pub avg_distance_km: f64,
}

#[derive(Default)]
struct MonthAccumulator {
    price_sum: f64,
    n: usize,
    precipitation: f64,
    temperature_sum: f64,
    temperature_n: usize,
    fuel_sum: f64,
    harvested_area_ha: Option<f64>,
    avg_distance_km: Option<f64>,
}

/// Collapse daily records to (location, month): mean price, summed rainfall,
/// mean temperature, mean fuel price, first harvested area and distance.
///
/// Output is sorted by location, then month.
pub fn aggregate_monthly(records: &[MergedRecord]) -> Vec<MonthlyRow> {
    let mut ordered: Vec<&MergedRecord> = records.iter().collect();
    ordered.sort_by(|a, b| (&a.location, a.date).cmp(&(&b.location, b.date)));

    let mut groups: BTreeMap<(String, YearMonth), MonthAccumulator> = BTreeMap::new();
    for r in ordered {
        let acc = groups.entry((r.location.clone(), r.period())).or_default();
        acc.price_sum += r.price;
        acc.n += 1;
        acc.precipitation += r.precipitation_mm;
        if let Some(t) = r.temperature_mean_c {
            acc.temperature_sum += t;
            acc.temperature_n += 1;
        }
        acc.fuel_sum += r.fuel_price;
        acc.harvested_area_ha.get_or_insert(r.harvested_area_ha);
        acc.avg_distance_km.get_or_insert(r.avg_distance_km);
    }

    groups
        .into_iter()
        .map(|((location, period), acc)| {
            let n = acc.n as f64;
            MonthlyRow {
                location,
                period,
                price: acc.price_sum / n,
                precipitation_mm: acc.precipitation,
                temperature_mean_c: (acc.temperature_n > 0)
                    .then(|| acc.temperature_sum / acc.temperature_n as f64),
                fuel_price: acc.fuel_sum / n,
                harvested_area_ha: acc.harvested_area_ha.unwrap_or(0.0),
                avg_distance_km: acc.avg_distance_km.unwrap_or(f64::NAN),
            }
        })
        .collect()
}

/// Row accounting of the panel build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PanelReport {
    pub monthly_rows: usize,
    pub dropped_for_lags: usize,
    pub dropped_incomplete: usize,
    pub rows: usize,
    pub n_locations: usize,
    pub n_periods: usize,
    pub balanced: bool,
    #[serde(skip)]
    pub periods_per_location: BTreeMap<String, usize>,
}

/// Builds the estimation panel from monthly rows.
#[derive(Debug, Clone, Default)]
pub struct PanelAssembler {
    lags: LagSpec,
}

impl PanelAssembler {
    pub fn new(lags: LagSpec) -> Self {
        Self { lags }
    }

    /// Regressor names before month dummies, in design order.
    pub fn base_regressors(&self) -> Vec<String> {
        let mut names = Vec::new();
        names.extend((1..=self.lags.price).map(|k| format!("price_lag{k}")));
        names.push("precipitation_mm".to_string());
        names.extend((1..=self.lags.rain).map(|k| format!("rain_lag{k}")));
        names.push("temperature_mean_c".to_string());
        names.extend((1..=self.lags.temperature).map(|k| format!("temp_lag{k}")));
        names.push("fuel_price".to_string());
        names.extend((1..=self.lags.fuel).map(|k| format!("fuel_lag{k}")));
        names.push("harvested_area_ha".to_string());
        names.push("avg_distance_km".to_string());
        names
    }

    /// Lag each location's series positionally, drop incomplete rows and add
    /// month dummies.
    pub fn assemble(&self, monthly: &[MonthlyRow]) -> Result<Panel, DataError> {
        let mut by_location: BTreeMap<&str, Vec<&MonthlyRow>> = BTreeMap::new();
        for row in monthly {
            by_location.entry(row.location.as_str()).or_default().push(row);
        }

        let max_lag = self.lags.max_lag();
        let mut report = PanelReport {
            monthly_rows: monthly.len(),
            ..PanelReport::default()
        };

        let mut keys = Vec::new();
        let mut y = Vec::new();
        let mut base: Vec<Vec<f64>> = Vec::new();

        for (location, mut series) in by_location {
            series.sort_by_key(|r| r.period);
            for p in 0..series.len() {
                if p < max_lag {
                    report.dropped_for_lags += 1;
                    continue;
                }
                match self.row_values(&series, p) {
                    Some(values) => {
                        keys.push((location.to_string(), series[p].period));
                        y.push(series[p].price);
                        base.push(values);
                    }
                    None => report.dropped_incomplete += 1,
                }
            }
        }

        if y.is_empty() {
            return Err(DataError::Empty("panel lag trimming"));
        }

        let months: Vec<u32> = keys
            .iter()
            .map(|(_, ym)| ym.month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let dummy_months = &months[1.min(months.len())..];

        let mut names = self.base_regressors();
        names.extend(dummy_months.iter().map(|m| format!("{MONTH_DUMMY_PREFIX}{m}")));

        let n_base = base.first().map_or(0, Vec::len);
        let x = Mat::from_fn(y.len(), names.len(), |i, j| {
            if j < n_base {
                base[i][j]
            } else {
                f64::from(u8::from(keys[i].1.month == dummy_months[j - n_base]))
            }
        });

        for (location, _) in &keys {
            *report
                .periods_per_location
                .entry(location.clone())
                .or_insert(0) += 1;
        }
        let locations: Vec<String> = report.periods_per_location.keys().cloned().collect();
        let periods: BTreeSet<YearMonth> = keys.iter().map(|(_, ym)| *ym).collect();
        report.rows = y.len();
        report.n_locations = locations.len();
        report.n_periods = periods.len();
        report.balanced = report
            .periods_per_location
            .values()
            .all(|&c| c == periods.len());

        if report.dropped_incomplete > 0 {
            warn!(
                rows = report.dropped_incomplete,
                "dropped panel rows with missing covariates"
            );
        }
        if !report.balanced {
            warn!(per_location = ?report.periods_per_location, "panel is unbalanced");
        }
        info!(
            rows = report.rows,
            locations = report.n_locations,
            periods = report.n_periods,
            dropped_for_lags = report.dropped_for_lags,
            regressors = names.len(),
            "assembled panel"
        );

        Ok(Panel {
            locations,
            keys,
            names,
            x,
            y: Col::from_fn(y.len(), |i| y[i]),
            lags: self.lags,
            report,
        })
    }

    fn row_values(&self, series: &[&MonthlyRow], p: usize) -> Option<Vec<f64>> {
        let cur = series[p];
        let mut values = Vec::new();
        values.extend((1..=self.lags.price).map(|k| series[p - k].price));
        values.push(cur.precipitation_mm);
        values.extend((1..=self.lags.rain).map(|k| series[p - k].precipitation_mm));
        values.push(cur.temperature_mean_c?);
        for k in 1..=self.lags.temperature {
            values.push(series[p - k].temperature_mean_c?);
        }
        values.push(cur.fuel_price);
        values.extend((1..=self.lags.fuel).map(|k| series[p - k].fuel_price));
        values.push(cur.harvested_area_ha);
        values.push(cur.avg_distance_km);
        values.iter().all(|v| v.is_finite()).then_some(values)
    }
}

/// Per-location averages over the panel's periods.
#[derive(Debug, Clone)]
pub struct CrossSection {
    pub locations: Vec<String>,
    pub y: Col<f64>,
    pub x: Mat<f64>,
    pub names: Vec<String>,
}

/// Estimation panel stacked by location, then month.
#[derive(Debug, Clone)]
pub struct Panel {
    locations: Vec<String>,
    keys: Vec<(String, YearMonth)>,
    names: Vec<String>,
    x: Mat<f64>,
    y: Col<f64>,
    lags: LagSpec,
    report: PanelReport,
}

impl Panel {
    pub fn n_obs(&self) -> usize {
        self.y.nrows()
    }

    /// Sorted location list; the row order of every spatial object built from
    /// this panel.
    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn keys(&self) -> &[(String, YearMonth)] {
        &self.keys
    }

    pub fn regressor_names(&self) -> &[String] {
        &self.names
    }

    pub fn x(&self) -> &Mat<f64> {
        &self.x
    }

    pub fn y(&self) -> &Col<f64> {
        &self.y
    }

    pub fn lag_spec(&self) -> LagSpec {
        self.lags
    }

    pub fn report(&self) -> &PanelReport {
        &self.report
    }

    pub fn is_balanced(&self) -> bool {
        self.report.balanced
    }

    pub fn periods(&self) -> Vec<YearMonth> {
        self.keys
            .iter()
            .map(|(_, ym)| *ym)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Values of a regressor, or of `price`, in panel order.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, DataError> {
        if name == PRICE {
            return Ok(self.y.iter().copied().collect());
        }
        let j = self
            .column_index(name)
            .ok_or_else(|| DataError::UnknownColumn(name.to_string()))?;
        Ok((0..self.n_obs()).map(|i| self.x[(i, j)]).collect())
    }

    /// Time series of one variable for one location.
    pub fn location_series(&self, location: &str, name: &str) -> Result<Vec<f64>, DataError> {
        let values = self.column(name)?;
        Ok(self
            .keys
            .iter()
            .zip(values)
            .filter(|((loc, _), _)| loc == location)
            .map(|(_, v)| v)
            .collect())
    }

    /// Average of a variable across locations for every period.
    pub fn period_means(&self, name: &str) -> Result<Vec<(YearMonth, f64)>, DataError> {
        let values = self.column(name)?;
        let mut acc: BTreeMap<YearMonth, (f64, usize)> = BTreeMap::new();
        for ((_, ym), v) in self.keys.iter().zip(values) {
            let e = acc.entry(*ym).or_insert((0.0, 0));
            e.0 += v;
            e.1 += 1;
        }
        Ok(acc
            .into_iter()
            .map(|(ym, (sum, n))| (ym, sum / n as f64))
            .collect())
    }

    /// Per-location means of price and the requested regressors, ordered
    /// like [`Panel::locations`].
    pub fn cross_section_means(&self, columns: &[&str]) -> Result<CrossSection, DataError> {
        let n = self.locations.len();
        let index: BTreeMap<&str, usize> = self
            .locations
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();
        let mut counts = vec![0usize; n];
        for (loc, _) in &self.keys {
            counts[index[loc.as_str()]] += 1;
        }

        let means_of = |values: &[f64]| -> Vec<f64> {
            let mut sums = vec![0.0; n];
            for ((loc, _), v) in self.keys.iter().zip(values) {
                sums[index[loc.as_str()]] += v;
            }
            sums.iter().zip(&counts).map(|(s, &c)| s / c as f64).collect()
        };

        let y = means_of(&self.column(PRICE)?);
        let mut cols = Vec::with_capacity(columns.len());
        for name in columns {
            cols.push(means_of(&self.column(name)?));
        }

        Ok(CrossSection {
            locations: self.locations.clone(),
            y: Col::from_fn(n, |i| y[i]),
            x: Mat::from_fn(n, cols.len(), |i, j| cols[j][i]),
            names: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    /// Estimation design for the spatial model. Requires a balanced panel.
    pub fn spatial_design(&self) -> Result<SpatialDesign, DataError> {
        let periods = self.periods();
        for (location, &count) in &self.report.periods_per_location {
            if count != periods.len() {
                return Err(DataError::Unbalanced {
                    location: location.clone(),
                    got: count,
                    expected: periods.len(),
                });
            }
        }
        SpatialDesign::new(
            self.locations.clone(),
            periods.len(),
            self.y.clone(),
            self.x.clone(),
            self.names.clone(),
        )
    }
}

/// Balanced, location-major design handed to the spatial estimators.
#[derive(Debug, Clone)]
pub struct SpatialDesign {
    locations: Vec<String>,
    n_periods: usize,
    y: Col<f64>,
    x: Mat<f64>,
    names: Vec<String>,
    durbin: Vec<usize>,
}

impl SpatialDesign {
    /// Rows must be ordered `location * n_periods + period`.
    ///
    /// Durbin terms default to every non-dummy column that varies across
    /// locations within some period. A column equal for all locations in
    /// every period satisfies `W x = x` and is left unlagged.
    pub fn new(
        locations: Vec<String>,
        n_periods: usize,
        y: Col<f64>,
        x: Mat<f64>,
        names: Vec<String>,
    ) -> Result<Self, DataError> {
        let expected = locations.len() * n_periods;
        if y.nrows() != expected || x.nrows() != expected || expected == 0 {
            return Err(DataError::DesignShape {
                rows: x.nrows().min(y.nrows()),
                expected,
                locations: locations.len(),
                periods: n_periods,
            });
        }
        if names.len() != x.ncols() {
            return Err(DataError::NameCount {
                names: names.len(),
                columns: x.ncols(),
            });
        }

        let n = locations.len();
        let durbin: Vec<usize> = (0..x.ncols())
            .filter(|&j| !names[j].starts_with(MONTH_DUMMY_PREFIX))
            .filter(|&j| varies_across_locations(&x, j, n, n_periods))
            .collect();
        let skipped: Vec<&str> = (0..x.ncols())
            .filter(|j| !durbin.contains(j) && !names[*j].starts_with(MONTH_DUMMY_PREFIX))
            .map(|j| names[j].as_str())
            .collect();
        if !skipped.is_empty() {
            debug!(columns = ?skipped, "period-constant columns left out of the Durbin block");
        }

        Ok(Self {
            locations,
            n_periods,
            y,
            x,
            names,
            durbin,
        })
    }

    /// Override the spatially lagged columns.
    pub fn with_durbin(mut self, mut columns: Vec<usize>) -> Self {
        columns.retain(|&j| j < self.x.ncols());
        columns.sort_unstable();
        columns.dedup();
        self.durbin = columns;
        self
    }

    pub fn locations(&self) -> &[String] {
        &self.locations
    }

    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }

    pub fn n_periods(&self) -> usize {
        self.n_periods
    }

    pub fn n_obs(&self) -> usize {
        self.y.nrows()
    }

    pub fn y(&self) -> &Col<f64> {
        &self.y
    }

    pub fn x(&self) -> &Mat<f64> {
        &self.x
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn durbin(&self) -> &[usize] {
        &self.durbin
    }

    pub fn durbin_names(&self) -> Vec<&str> {
        self.durbin.iter().map(|&j| self.names[j].as_str()).collect()
    }

    /// Columns of `x` selected by the Durbin index.
    pub fn durbin_block(&self) -> Mat<f64> {
        Mat::from_fn(self.x.nrows(), self.durbin.len(), |i, c| {
            self.x[(i, self.durbin[c])]
        })
    }
}

fn varies_across_locations(x: &Mat<f64>, j: usize, n: usize, t: usize) -> bool {
    (0..t).any(|p| {
        let first = x[(p, j)];
        let tol = 1e-12 * first.abs().max(1.0);
        (1..n).any(|i| (x[(i * t + p, j)] - first).abs() > tol)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn monthly(loc: &str, n_months: u32, temp_gap: Option<u32>) -> Vec<MonthlyRow> {
        (0..n_months)
            .map(|m| MonthlyRow {
                location: loc.to_string(),
                period: YearMonth::new(2023 + (m / 12) as i32, m % 12 + 1),
                price: 10000.0 + m as f64,
                precipitation_mm: 100.0 + m as f64,
                temperature_mean_c: (Some(m) != temp_gap).then_some(25.0),
                fuel_price: 10000.0,
                harvested_area_ha: 500.0,
                avg_distance_km: 3.0,
            })
            .collect()
    }

    #[test]
    fn test_aggregate_monthly() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).expect("valid date");
        let rec = |d, price, temp| MergedRecord {
            location: "Bandung".to_string(),
            date: day(d),
            commodity: "Beras".to_string(),
            price,
            precipitation_mm: 5.0,
            temperature_mean_c: temp,
            fuel_price: 10000.0,
            harvested_area_ha: d as f64,
            avg_distance_km: 2.0,
        };
        let rows = aggregate_monthly(&[rec(2, 12.0, None), rec(1, 10.0, Some(24.0))]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 11.0);
        assert_eq!(rows[0].precipitation_mm, 10.0);
        assert_eq!(rows[0].temperature_mean_c, Some(24.0));
        // First by date, not by input order.
        assert_eq!(rows[0].harvested_area_ha, 1.0);
    }

    #[test]
    fn test_lag_trimming_counts() {
        let mut rows = monthly("A", 12, None);
        rows.extend(monthly("B", 12, None));
        let panel = PanelAssembler::default().assemble(&rows).expect("panel builds");

        assert_eq!(panel.n_obs(), 2 * (12 - 3));
        assert_eq!(panel.report().dropped_for_lags, 6);
        assert!(panel.is_balanced());

        // Months 4..12 remain; month 4 is the baseline.
        let dummies = panel
            .regressor_names()
            .iter()
            .filter(|n| n.starts_with(MONTH_DUMMY_PREFIX))
            .count();
        assert_eq!(dummies, 8);
        assert!(panel.column_index("month_4").is_none());
    }

    #[test]
    fn test_lag_values_are_positional() {
        let panel = PanelAssembler::default()
            .assemble(&monthly("A", 6, None))
            .expect("panel builds");
        let lag1 = panel.column("price_lag1").expect("column exists");
        let rain3 = panel.column("rain_lag3").expect("column exists");
        let price = panel.column(PRICE).expect("price exists");

        assert_eq!(lag1[0], price[0] - 1.0);
        assert_eq!(rain3[0], 100.0);
    }

    #[test]
    fn test_missing_temperature_unbalances() {
        let mut rows = monthly("A", 8, None);
        rows.extend(monthly("B", 8, Some(5)));
        let panel = PanelAssembler::default().assemble(&rows).expect("panel builds");

        // Month 5 is missing itself, month 6 loses its lag.
        assert_eq!(panel.report().dropped_incomplete, 2);
        assert!(!panel.is_balanced());
        assert!(matches!(
            panel.spatial_design(),
            Err(DataError::Unbalanced { .. })
        ));
    }

    #[test]
    fn test_design_skips_period_constant_durbin() {
        let mut rows = monthly("A", 8, None);
        let mut b = monthly("B", 8, None);
        for r in &mut b {
            r.precipitation_mm += 7.0;
            r.avg_distance_km = 9.0;
        }
        rows.extend(b);
        let design = PanelAssembler::default()
            .assemble(&rows)
            .expect("panel builds")
            .spatial_design()
            .expect("balanced");

        let durbin = design.durbin_names();
        assert!(durbin.contains(&"precipitation_mm"));
        assert!(durbin.contains(&"avg_distance_km"));
        assert!(!durbin.contains(&"fuel_price"));
        assert!(!durbin.iter().any(|n| n.starts_with(MONTH_DUMMY_PREFIX)));
    }

    #[test]
    fn test_cross_section_means() {
        let mut rows = monthly("A", 6, None);
        rows.extend(monthly("B", 6, None));
        let panel = PanelAssembler::default().assemble(&rows).expect("panel builds");
        let cs = panel
            .cross_section_means(&["precipitation_mm"])
            .expect("column exists");

        assert_eq!(cs.locations, vec!["A".to_string(), "B".to_string()]);
        // Months 4..6 remain: precipitation 103, 104, 105.
        assert_eq!(cs.x[(0, 0)], 104.0);
    }
}
