//! Loading, merging and panel assembly.

mod common;

use approx::assert_relative_eq;
use chrono::{Datelike, NaiveDate};
use common::{synthetic_tables, ALIASED_MARKET};
use spatial_price::core::LocationRegistry;
use spatial_price::data::{
    aggregate_monthly, DataError, DataMerger, DataQualityReport, InputPaths, LagSpec, MergedRecord,
    PanelAssembler, PriceObservation, SourceTables, YearMonth, PRICE,
};
use std::fs;
use std::path::Path;

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

// ============================================================================
// CSV Loading
// ============================================================================

#[test]
fn test_load_source_tables_from_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let paths = InputPaths {
        prices: write(
            dir.path(),
            "prices.csv",
            "date,location_name,commodity_name,commodity_id,price,unit\n\
             2024-01-02,Kota Bandung,Beras,1,13500,kg\n\
             2024-01-03,Bogor,Beras,1,,kg\n",
        ),
        weather: write(
            dir.path(),
            "weather.csv",
            "date,location_name,temperature_mean_c,precipitation_mm\n\
             2024-01-02,Bandung,23.5,12.0\n\
             2024-01-03 00:00:00,Bogor,,8.5\n",
        ),
        fuel: write(
            dir.path(),
            "fuel.csv",
            "Date,Price_IDR_per_Liter\n01/01/2024,10000\n01/02/2024,\n",
        ),
        production: write(
            dir.path(),
            "production.csv",
            "year,kabupaten_kota,luas_panen_ha\n2024,Kabupaten Cirebon,81234.5\n",
        ),
        facilities: write(
            dir.path(),
            "facilities.csv",
            "search_location,facility_type,distance_to_location_km\n\
             Bandung,distribution,3.2\n\
             Bandung,market,\n",
        ),
    };

    let tables = SourceTables::load(&paths).expect("valid tables");

    assert_eq!(tables.prices.len(), 2);
    assert_eq!(tables.prices[0].location, ALIASED_MARKET);
    assert_eq!(tables.prices[0].price, Some(13500.0));
    assert_eq!(tables.prices[1].price, None);
    assert_eq!(
        tables.weather[1].date,
        NaiveDate::from_ymd_opt(2024, 1, 3).expect("valid date")
    );
    assert_eq!(tables.weather[1].temperature_mean_c, None);
    // Blank fuel prices are skipped.
    assert_eq!(tables.fuel.len(), 1);
    assert_eq!(tables.fuel[0].period, YearMonth::new(2024, 1));
    assert_eq!(tables.production[0].region, "Kabupaten Cirebon");
    assert_eq!(tables.facilities[1].distance_km, None);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.csv");
    let paths = InputPaths {
        prices: missing.clone(),
        weather: missing.clone(),
        fuel: missing.clone(),
        production: missing.clone(),
        facilities: missing,
    };
    let err = SourceTables::load(&paths).unwrap_err();
    assert!(matches!(err, DataError::Io { .. }));
}

#[test]
fn test_invalid_date_reports_record() {
    let csv = "date,location_name,temperature_mean_c,precipitation_mm\n\
               2024-01-01,Bandung,24,10\n\
               yesterday,Bandung,24,10\n";
    let err = spatial_price::data::read_weather(csv.as_bytes(), "weather").unwrap_err();
    assert!(matches!(
        err,
        DataError::InvalidDate { record: 2, ref value, .. } if value == "yesterday"
    ));
}

#[test]
fn test_fuel_header_is_case_sensitive() {
    let csv = "date,price_idr_per_liter\n2024-01-01,10000\n";
    let err = spatial_price::data::read_fuel(csv.as_bytes(), "fuel").unwrap_err();
    assert!(matches!(err, DataError::MissingColumn { column, .. } if column == "Date"));
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_merge_resolves_aliases_and_matches_every_join() {
    let registry = LocationRegistry::west_java();
    let tables = synthetic_tables(14, 3);

    let merged = DataMerger::new(&registry)
        .merge(&tables, Some("beras"))
        .expect("merge succeeds");

    assert_eq!(merged.records.len(), 11 * 14);
    assert!(merged.records.iter().all(|r| r.location != ALIASED_MARKET));
    assert!(merged.locations().contains(&"Bandung".to_string()));
    assert_eq!(merged.locations().len(), 11);

    let report = &merged.report;
    assert_eq!(report.dropped_unresolved, 0);
    assert_eq!(report.production_filled_zero, 0);
    assert_eq!(report.distance_filled_median, 0);
    let names: Vec<&str> = report.joins.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["weather", "fuel", "production", "facility_distance"]);
    for join in &report.joins {
        assert_eq!(join.unmatched_left, 0, "{} has unmatched rows", join.name);
        assert_relative_eq!(join.match_rate(), 1.0);
    }
}

#[test]
fn test_merge_fills_and_drops() {
    let registry = LocationRegistry::west_java();
    let mut tables = synthetic_tables(3, 8);
    tables.production.retain(|p| p.region != "DKI Jakarta");
    tables.facilities.retain(|f| f.search_location != "Depok");
    tables.weather.retain(|w| !(w.location == "Bogor" && w.date.month0() == 0));
    tables.prices.push(PriceObservation {
        location: "Garut".to_string(),
        date: NaiveDate::from_ymd_opt(2022, 1, 15).expect("valid date"),
        commodity: "Beras".to_string(),
        commodity_id: None,
        price: Some(12_000.0),
        unit: None,
    });

    let merged = DataMerger::new(&registry)
        .merge(&tables, Some("Beras"))
        .expect("merge succeeds");
    let report = &merged.report;

    assert_eq!(report.dropped_unresolved, 1);
    assert_eq!(report.unresolved_names, vec!["Garut".to_string()]);
    assert_eq!(report.production_filled_zero, 3);
    assert_eq!(report.distance_filled_median, 3);
    assert_eq!(report.dropped_missing_precipitation, 1);
    assert_eq!(report.final_rows, 11 * 3 - 1);

    let jakarta = merged
        .records
        .iter()
        .find(|r| r.location == "DKI Jakarta")
        .expect("jakarta present");
    assert_eq!(jakarta.harvested_area_ha, 0.0);
    let depok = merged
        .records
        .iter()
        .find(|r| r.location == "Depok")
        .expect("depok present");
    assert_relative_eq!(
        depok.avg_distance_km,
        merged.facilities.median_distance_km,
        epsilon = 1e-12
    );
}

#[test]
fn test_unknown_commodity_is_empty() {
    let registry = LocationRegistry::west_java();
    let err = DataMerger::new(&registry)
        .merge(&synthetic_tables(2, 1), Some("Cabai Merah"))
        .unwrap_err();
    assert!(matches!(err, DataError::Empty(_)));
}

#[test]
fn test_facility_counts_default_to_one() {
    let registry = LocationRegistry::west_java();
    let mut tables = synthetic_tables(2, 1);
    tables
        .facilities
        .retain(|f| !(f.search_location == "Bogor" && f.facility_type == "distribution"));

    let summary = DataMerger::new(&registry).summarize_facilities(&tables);
    let counts = summary.facility_counts(&["Bandung".to_string(), "Bogor".to_string()]);
    assert_eq!(counts, vec![1.0, 1.0]);
    assert_eq!(summary.distribution_counts.get("Bogor"), None);
    assert_eq!(summary.avg_distance_km.len(), 11);
}

// ============================================================================
// Monthly Aggregation
// ============================================================================

fn record(day: u32, price: f64, rain: f64, temp: Option<f64>) -> MergedRecord {
    MergedRecord {
        location: "Bandung".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 2, day).expect("valid date"),
        commodity: "Beras".to_string(),
        price,
        precipitation_mm: rain,
        temperature_mean_c: temp,
        fuel_price: 10_000.0,
        harvested_area_ha: 500.0,
        avg_distance_km: 4.0,
    }
}

#[test]
fn test_monthly_aggregation_rules() {
    let rows = aggregate_monthly(&[
        record(1, 100.0, 5.0, Some(24.0)),
        record(2, 110.0, 7.5, None),
        record(3, 120.0, 0.0, Some(26.0)),
    ]);

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.period, YearMonth::new(2024, 2));
    assert_relative_eq!(row.price, 110.0);
    assert_relative_eq!(row.precipitation_mm, 12.5);
    assert_relative_eq!(row.temperature_mean_c.expect("two readings"), 25.0);
    assert_relative_eq!(row.fuel_price, 10_000.0);
}

// ============================================================================
// Panel
// ============================================================================

#[test]
fn test_panel_from_synthetic_tables() {
    let registry = LocationRegistry::west_java();
    let tables = synthetic_tables(30, 42);
    let merged = DataMerger::new(&registry)
        .merge(&tables, Some("Beras"))
        .expect("merge succeeds");
    let panel = PanelAssembler::default()
        .assemble(&aggregate_monthly(&merged.records))
        .expect("panel assembles");

    assert!(panel.is_balanced());
    assert_eq!(panel.locations().len(), 11);
    assert_eq!(panel.periods().len(), 27);
    assert_eq!(panel.n_obs(), 11 * 27);
    assert_eq!(panel.report().dropped_for_lags, 11 * 3);

    let names = panel.regressor_names();
    assert_eq!(
        &names[..11],
        &[
            "price_lag1",
            "precipitation_mm",
            "rain_lag1",
            "rain_lag2",
            "rain_lag3",
            "temperature_mean_c",
            "temp_lag1",
            "fuel_price",
            "fuel_lag1",
            "harvested_area_ha",
            "avg_distance_km",
        ]
    );
    // Every calendar month appears, one is the baseline.
    assert_eq!(names.len(), 11 + 11);
    assert!(names[11..].iter().all(|n| n.starts_with("month_")));

    // Lag columns shift each location's own series.
    let price = panel.location_series("Bogor", PRICE).expect("price");
    let lag = panel.location_series("Bogor", "price_lag1").expect("lag");
    for t in 1..price.len() {
        assert_relative_eq!(lag[t], price[t - 1], epsilon = 1e-12);
    }

    let design = panel.spatial_design().expect("balanced");
    assert_eq!(design.n_periods(), 27);
    // The national fuel series is not spatially lagged.
    assert!(!design.durbin_names().contains(&"fuel_price"));
    assert!(design.durbin_names().contains(&"precipitation_mm"));

    let quality = DataQualityReport::build(&tables, &merged, &panel);
    assert_eq!(quality.total_missing(), 0);
    assert!(quality.balanced);
    assert_eq!(quality.daily_observations.get("Bandung"), Some(&30));
}

#[test]
fn test_panel_cross_section_and_period_means() {
    let registry = LocationRegistry::west_java();
    let merged = DataMerger::new(&registry)
        .merge(&synthetic_tables(12, 5), Some("Beras"))
        .expect("merge succeeds");
    let panel = PanelAssembler::new(LagSpec {
        price: 1,
        fuel: 1,
        rain: 1,
        temperature: 1,
    })
    .assemble(&aggregate_monthly(&merged.records))
    .expect("panel assembles");

    let cs = panel
        .cross_section_means(&["precipitation_mm"])
        .expect("known column");
    assert_eq!(cs.locations, panel.locations());
    let bogor = cs
        .locations
        .iter()
        .position(|l| l == "Bogor")
        .expect("bogor present");
    let series = panel
        .location_series("Bogor", "precipitation_mm")
        .expect("known column");
    assert_relative_eq!(
        cs.x[(bogor, 0)],
        series.iter().sum::<f64>() / series.len() as f64,
        epsilon = 1e-9
    );

    let means = panel.period_means("fuel_price").expect("known column");
    assert_eq!(means.len(), 11);

    assert!(matches!(
        panel.column("rainfall"),
        Err(DataError::UnknownColumn(name)) if name == "rainfall"
    ));
}

#[test]
fn test_unbalanced_panel_has_no_spatial_design() {
    let registry = LocationRegistry::west_java();
    let mut tables = synthetic_tables(8, 2);
    // Remove Depok's final month.
    let last = YearMonth::new(2022, 8);
    tables
        .prices
        .retain(|p| !(p.location == "Depok" && YearMonth::from_date(p.date) == last));

    let merged = DataMerger::new(&registry)
        .merge(&tables, Some("Beras"))
        .expect("merge succeeds");
    let panel = PanelAssembler::default()
        .assemble(&aggregate_monthly(&merged.records))
        .expect("panel assembles");

    assert!(!panel.is_balanced());
    assert!(matches!(
        panel.spatial_design(),
        Err(DataError::Unbalanced { ref location, got: 4, expected: 5 }) if location == "Depok"
    ));
}
