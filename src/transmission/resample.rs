//! Calendar resampling of daily prices for the time-series analyses.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SeriesSet, TransmissionError};

/// Time grain of the VAR, cointegration, Granger and asymmetry inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Sunday-ending weekly means of the daily prices.
    #[default]
    Weekly,
    /// Panel months.
    Monthly,
}

/// The Sunday closing the week that contains `date`.
pub fn week_ending(date: NaiveDate) -> NaiveDate {
    let ahead = 6 - date.weekday().num_days_from_monday();
    date + Duration::days(i64::from(ahead))
}

/// Fill interior gaps linearly and hold the last value past the end.
/// Leading gaps stay empty.
fn interpolate(values: &mut [Option<f64>]) {
    let mut last: Option<(usize, f64)> = None;
    for i in 0..values.len() {
        let Some(v) = values[i] else { continue };
        if let Some((j, prev)) = last {
            let span = (i - j) as f64;
            for (step, slot) in values[j + 1..i].iter_mut().enumerate() {
                *slot = Some(prev + (v - prev) * (step + 1) as f64 / span);
            }
        }
        last = Some((i, v));
    }
    if let Some((j, prev)) = last {
        for slot in &mut values[j + 1..] {
            *slot = Some(prev);
        }
    }
}

/// Weekly means of dated observations on one shared grid of week endings.
///
/// Weeks without data are interpolated per series; weeks before any series
/// starts are dropped for all of them.
pub fn weekly_series(
    names: Vec<String>,
    observations: &[Vec<(NaiveDate, f64)>],
) -> Result<SeriesSet, TransmissionError> {
    if names.len() != observations.len() {
        return Err(TransmissionError::LengthMismatch {
            expected: names.len(),
            got: observations.len(),
        });
    }

    let buckets: Vec<BTreeMap<NaiveDate, (f64, usize)>> = observations
        .iter()
        .map(|obs| {
            let mut weeks = BTreeMap::new();
            for &(date, price) in obs.iter().filter(|(_, p)| p.is_finite()) {
                let entry = weeks.entry(week_ending(date)).or_insert((0.0, 0));
                entry.0 += price;
                entry.1 += 1;
            }
            weeks
        })
        .collect();
    if let Some(empty) = buckets.iter().position(BTreeMap::is_empty) {
        return Err(TransmissionError::UnknownSeries(names[empty].clone()));
    }

    let first = buckets.iter().filter_map(|b| b.keys().next()).min();
    let last = buckets.iter().filter_map(|b| b.keys().next_back()).max();
    let (Some(&first), Some(&last)) = (first, last) else {
        return Err(TransmissionError::InsufficientObservations { needed: 1, got: 0 });
    };
    let n_weeks = ((last - first).num_days() / 7) as usize + 1;
    let grid: Vec<NaiveDate> = (0..n_weeks)
        .map(|w| first + Duration::days(7 * w as i64))
        .collect();

    let columns: Vec<Vec<Option<f64>>> = buckets
        .iter()
        .map(|weeks| {
            let mut col: Vec<Option<f64>> = grid
                .iter()
                .map(|d| weeks.get(d).map(|&(sum, count)| sum / count as f64))
                .collect();
            interpolate(&mut col);
            col
        })
        .collect();

    let start = columns
        .iter()
        .map(|c| c.iter().position(Option::is_some).unwrap_or(n_weeks))
        .max()
        .unwrap_or(0);
    let series: Vec<Vec<f64>> = columns
        .iter()
        .map(|c| c[start..].iter().flatten().copied().collect())
        .collect();
    debug!(
        weeks = n_weeks - start,
        from = %grid.get(start).map_or_else(String::new, |d| d.to_string()),
        "weekly price series"
    );
    SeriesSet::new(names, &series)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_week_ending_is_sunday() {
        // 2024-01-01 was a Monday.
        assert_eq!(week_ending(date(2024, 1, 1)), date(2024, 1, 7));
        assert_eq!(week_ending(date(2024, 1, 7)), date(2024, 1, 7));
        assert_eq!(week_ending(date(2024, 1, 8)), date(2024, 1, 14));
    }

    #[test]
    fn test_weekly_means_and_gaps() {
        let a = vec![
            (date(2024, 1, 1), 10.0),
            (date(2024, 1, 3), 20.0),
            // week ending 01-14 missing
            (date(2024, 1, 15), 30.0),
        ];
        let b = vec![
            (date(2024, 1, 9), 5.0),
            (date(2024, 1, 16), 7.0),
            (date(2024, 1, 23), 9.0),
        ];
        let set = weekly_series(vec!["a".into(), "b".into()], &[a, b]).expect("aligned");

        // The first week only has `a`, so it is dropped.
        assert_eq!(set.n_periods(), 3);
        assert_eq!(set.column("a").expect("a"), vec![22.5, 30.0, 30.0]);
        assert_eq!(set.column("b").expect("b"), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_series_without_prices() {
        let err = weekly_series(
            vec!["a".into(), "b".into()],
            &[vec![(date(2024, 1, 1), 1.0)], vec![]],
        )
        .unwrap_err();
        assert!(matches!(err, TransmissionError::UnknownSeries(name) if name == "b"));
    }
}
