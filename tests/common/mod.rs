//! Common test utilities and data generators.
#![allow(dead_code)]

use chrono::NaiveDate;
use faer::{Col, Mat};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spatial_price::core::LocationRegistry;
use spatial_price::data::{
    FacilityRecord, FuelPrice, PriceObservation, ProductionRecord, SourceTables, SpatialDesign,
    WeatherObservation, YearMonth,
};
use spatial_price::utils::invert;
use spatial_price::weights::{SpatialWeights, WeightsKind};

/// Reproducible value in `[-0.5, 0.5)` for row `r` and stream `k`.
pub fn hashed_uniform(r: usize, k: usize) -> f64 {
    let v = (12.9898 * r as f64 + 78.233 * k as f64).sin() * 43_758.545_3;
    v - v.floor() - 0.5
}

/// Columns of very different magnitude, so column-pivoted QR reorders them.
pub const MIXED_SCALES: [f64; 6] = [1.0, 1000.0, 0.01, 50.0, 0.2, 5.0];

/// Generate simple linear data: y = x * beta + intercept + noise
pub fn generate_linear_data(
    n_samples: usize,
    n_features: usize,
    intercept: f64,
    noise_std: f64,
    seed: u64,
) -> (Mat<f64>, Col<f64>, Col<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let true_coefficients = Col::from_fn(n_features, |j| (j + 1) as f64);

    let mut x = Mat::zeros(n_samples, n_features);
    let mut y = Col::zeros(n_samples);
    for i in 0..n_samples {
        let mut yi = intercept;
        for j in 0..n_features {
            x[(i, j)] = rng.gen_range(-1.0..1.0);
            yi += x[(i, j)] * true_coefficients[j];
        }
        yi += noise_std * rng.gen_range(-1.0..1.0);
        y[i] = yi;
    }

    (x, y, true_coefficients)
}

/// Generate data with collinear features.
pub fn generate_collinear_data(n_samples: usize) -> (Mat<f64>, Col<f64>) {
    let mut x = Mat::zeros(n_samples, 3);
    let mut y = Col::zeros(n_samples);

    for i in 0..n_samples {
        x[(i, 0)] = i as f64;
        x[(i, 1)] = 2.0 * i as f64; // Perfectly collinear with x0
        x[(i, 2)] = (i * i) as f64;
        y[i] = 1.0 + 2.0 * x[(i, 0)] + 3.0 * x[(i, 2)];
    }

    (x, y)
}

/// Generate data with constant columns.
pub fn generate_constant_column_data(n_samples: usize) -> (Mat<f64>, Col<f64>) {
    let mut x = Mat::zeros(n_samples, 3);
    let mut y = Col::zeros(n_samples);

    for i in 0..n_samples {
        x[(i, 0)] = i as f64;
        x[(i, 1)] = 5.0; // Constant column
        x[(i, 2)] = (i * 2) as f64;
        y[i] = 1.0 + 2.0 * x[(i, 0)] + 3.0 * x[(i, 2)];
    }

    (x, y)
}

// ============================================================================
// Spatial Fixtures
// ============================================================================

pub fn location_names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("L{i:02}")).collect()
}

/// Ring contiguity: each location neighbours the one before and after it.
pub fn ring_weights(n: usize) -> SpatialWeights {
    let raw = Mat::from_fn(n, n, |i, j| {
        if (i + 1) % n == j || (j + 1) % n == i {
            1.0
        } else {
            0.0
        }
    });
    SpatialWeights::from_raw(location_names(n), raw, WeightsKind::Custom).expect("valid ring")
}

/// True parameters of a simulated Spatial Durbin panel with two covariates.
#[derive(Debug, Clone, Copy)]
pub struct SdmTruth {
    pub intercept: f64,
    pub rho: f64,
    pub beta: [f64; 2],
    pub theta: [f64; 2],
    pub noise: f64,
}

impl Default for SdmTruth {
    fn default() -> Self {
        Self {
            intercept: 5.0,
            rho: 0.4,
            beta: [2.0, -1.0],
            theta: [0.8, 0.5],
            noise: 0.1,
        }
    }
}

/// Draw `y = (I − ρW)⁻¹ (c + X β + W X θ + ε)` period by period and stack it
/// location-major. Covariates are named `x1` and `x2`.
pub fn simulate_sdm(
    weights: &SpatialWeights,
    n_periods: usize,
    truth: SdmTruth,
    seed: u64,
) -> SpatialDesign {
    let n = weights.n();
    let w = weights.matrix();
    let a = Mat::from_fn(n, n, |i, j| {
        f64::from(u8::from(i == j)) - truth.rho * w[(i, j)]
    });
    let m = invert(&a).expect("I - rho W is invertible");

    let mut rng = StdRng::seed_from_u64(seed);
    let draws: Vec<[f64; 3]> = (0..n * n_periods)
        .map(|_| {
            [
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                truth.noise * rng.gen_range(-1.0..1.0),
            ]
        })
        .collect();
    // Draws are indexed period-major; the design is location-major.
    let draw = |loc: usize, t: usize| draws[t * n + loc];

    let mut y = Col::zeros(n * n_periods);
    let mut x = Mat::zeros(n * n_periods, 2);
    for t in 0..n_periods {
        let rhs: Vec<f64> = (0..n)
            .map(|i| {
                let mut v = truth.intercept + draw(i, t)[2];
                for k in 0..2 {
                    let wx: f64 = (0..n).map(|j| w[(i, j)] * draw(j, t)[k]).sum();
                    v += truth.beta[k] * draw(i, t)[k] + truth.theta[k] * wx;
                }
                v
            })
            .collect();
        for i in 0..n {
            let row = i * n_periods + t;
            y[row] = (0..n).map(|j| m[(i, j)] * rhs[j]).sum();
            x[(row, 0)] = draw(i, t)[0];
            x[(row, 1)] = draw(i, t)[1];
        }
    }

    SpatialDesign::new(
        weights.locations().to_vec(),
        n_periods,
        y,
        x,
        vec!["x1".to_string(), "x2".to_string()],
    )
    .expect("well-formed design")
}

// ============================================================================
// Source Tables
// ============================================================================

/// Price reported with an alias that the registry must canonicalise.
pub const ALIASED_MARKET: &str = "Kota Bandung";

fn month_start(index: u32) -> YearMonth {
    YearMonth::new(2022 + (index / 12) as i32, index % 12 + 1)
}

/// One price observation per market and month for every West Java market,
/// with `price = 100 + 5 · rainfall + noise`.
///
/// Each market also gets weather, a yearly harvested area and two
/// facilities; fuel is one national series.
pub fn synthetic_tables(n_months: u32, seed: u64) -> SourceTables {
    let registry = LocationRegistry::west_java();
    let markets: Vec<String> = registry.names().map(str::to_string).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tables = SourceTables::default();

    for m in 0..n_months {
        let ym = month_start(m);
        tables.fuel.push(FuelPrice {
            period: ym,
            price: 10_000.0 + 40.0 * m as f64 + rng.gen_range(-30.0..30.0),
        });
    }

    for (idx, market) in markets.iter().enumerate() {
        let reported = if market == "Bandung" {
            ALIASED_MARKET.to_string()
        } else {
            market.clone()
        };
        for m in 0..n_months {
            let ym = month_start(m);
            let date = NaiveDate::from_ymd_opt(ym.year, ym.month, 15).expect("valid date");
            let rain = rng.gen_range(50.0..350.0);
            let temperature = 26.0 + rng.gen_range(-2.0..2.0);
            tables.weather.push(WeatherObservation {
                location: market.clone(),
                date,
                temperature_mean_c: Some(temperature),
                precipitation_mm: Some(rain),
            });
            tables.prices.push(PriceObservation {
                location: reported.clone(),
                date,
                commodity: "Beras".to_string(),
                commodity_id: Some("1".to_string()),
                price: Some(100.0 + 5.0 * rain + rng.gen_range(-10.0..10.0)),
                unit: Some("kg".to_string()),
            });
        }
        for year in 2022..=2022 + (n_months / 12) as i32 {
            tables.production.push(ProductionRecord {
                year,
                region: market.clone(),
                harvested_area_ha: Some(1_000.0 + 150.0 * idx as f64 + rng.gen_range(0.0..100.0)),
            });
        }
        for facility in 0..2 {
            tables.facilities.push(FacilityRecord {
                search_location: market.clone(),
                facility_type: if facility == 0 {
                    "distribution".to_string()
                } else {
                    "market".to_string()
                },
                distance_km: Some(1.0 + idx as f64 * 0.7 + facility as f64),
            });
        }
    }

    tables
}
