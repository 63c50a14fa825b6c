//! Price transmission: VAR, Granger causality, asymmetry and local regression.

mod common;

use approx::assert_relative_eq;
use common::synthetic_tables;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spatial_price::core::LocationRegistry;
use spatial_price::data::{aggregate_monthly, DataMerger, PanelAssembler, PRICE};
use spatial_price::transmission::{
    asymmetric_transmission, granger_causality, LocalRegression, SeriesSet, TransmissionError,
    VarModel,
};

/// `hub` follows its own lag; `spoke` follows the hub one month later.
fn hub_and_spoke(n: usize, seed: u64) -> SeriesSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let shocks: Vec<[f64; 3]> = (0..n)
        .map(|_| {
            [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ]
        })
        .collect();
    let mut hub = vec![0.0; n];
    let mut spoke = vec![0.0; n];
    let mut other = vec![0.0; n];
    for t in 1..n {
        hub[t] = 0.4 * hub[t - 1] + shocks[t][0];
        spoke[t] = 0.3 * spoke[t - 1] + 0.5 * hub[t - 1] + 0.2 * shocks[t][1];
        other[t] = 0.2 * other[t - 1] + shocks[t][2];
    }
    SeriesSet::new(
        vec!["hub".to_string(), "spoke".to_string(), "other".to_string()],
        &[hub, spoke, other],
    )
    .expect("aligned series")
}

// ============================================================================
// VAR
// ============================================================================

#[test]
fn test_var_coefficients_and_irf() {
    let series = hub_and_spoke(400, 3);
    let model = VarModel::fit_order(&series, 1).expect("long series");

    assert_eq!(model.lag_order(), 1);
    assert_eq!(model.n_obs(), 399);
    let a = &model.coefficient_matrices()[0];
    assert_relative_eq!(a[(0, 0)], 0.4, epsilon = 0.15);
    assert_relative_eq!(a[(1, 0)], 0.5, epsilon = 0.05);
    assert_relative_eq!(a[(1, 1)], 0.3, epsilon = 0.05);

    let irf = model.impulse_responses(3);
    assert_eq!(irf.len(), 4);
    for i in 0..3 {
        for j in 0..3 {
            assert_eq!(irf[0][(i, j)], if i == j { 1.0 } else { 0.0 });
            assert_relative_eq!(irf[1][(i, j)], a[(i, j)], epsilon = 1e-12);
            let a2: f64 = (0..3).map(|l| a[(i, l)] * a[(l, j)]).sum();
            assert_relative_eq!(irf[2][(i, j)], a2, epsilon = 1e-12);
        }
    }

    let response = model
        .impulse_response("hub", "spoke", 3)
        .expect("known series");
    assert_eq!(response[0], 0.0);
    assert_relative_eq!(response[1], a[(1, 0)], epsilon = 1e-12);
}

#[test]
fn test_var_lag_selection_table() {
    let series = hub_and_spoke(200, 8);
    let model = VarModel::fit(&series, 4).expect("long series");

    let table = model.lag_selection();
    assert_eq!(table.len(), 4);
    let best = table
        .iter()
        .min_by(|a, b| a.aic.total_cmp(&b.aic))
        .expect("non-empty");
    assert_eq!(best.lag, model.lag_order());
    assert_eq!(model.sigma().nrows(), 3);
}

#[test]
fn test_var_errors() {
    let series = hub_and_spoke(50, 1);
    assert!(matches!(
        VarModel::fit(&series, 0),
        Err(TransmissionError::InvalidLag(0))
    ));
    let model = VarModel::fit_order(&series, 1).expect("long series");
    assert!(matches!(
        model.impulse_response("hub", "nowhere", 2),
        Err(TransmissionError::UnknownSeries(name)) if name == "nowhere"
    ));
}

// ============================================================================
// Granger Causality
// ============================================================================

#[test]
fn test_granger_hub_leads_spoke() {
    let series = hub_and_spoke(300, 11);
    let result = granger_causality(&series, "hub", "spoke", 1).expect("long series");

    assert_eq!(result.cause, "hub");
    assert_eq!(result.effect, "spoke");
    assert_eq!(result.n_obs, 299);
    assert!(result.f_p_value < 1e-6);
    assert!(result.chi2_p_value < 1e-6);
    assert!(result.chi2 > result.f_statistic);
}

#[test]
fn test_granger_unknown_series() {
    let series = hub_and_spoke(30, 2);
    assert!(matches!(
        granger_causality(&series, "rice", "spoke", 1),
        Err(TransmissionError::UnknownSeries(name)) if name == "rice"
    ));
}

// ============================================================================
// Asymmetry
// ============================================================================

#[test]
fn test_symmetric_passthrough() {
    let n = 60;
    let x: Vec<f64> = (0..n)
        .scan(100.0, |level, t| {
            *level += 10.0 * ((t as f64) * 1.3).sin();
            Some(*level)
        })
        .collect();
    let dx: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let mut y = vec![50.0; n];
    for t in 2..n {
        y[t] = y[t - 1] + 0.6 * dx[t - 2];
    }

    let result = asymmetric_transmission(("fuel", x.as_slice()), ("price", y.as_slice()), 10.0)
        .expect("long series");

    assert_eq!(result.n_obs, n - 2);
    assert_relative_eq!(result.beta_increase, 0.6, epsilon = 1e-8);
    assert_relative_eq!(result.beta_decrease, 0.6, epsilon = 1e-8);
    assert_relative_eq!(result.response_increase, 6.0, epsilon = 1e-6);
    assert_relative_eq!(result.response_decrease, -6.0, epsilon = 1e-6);
}

#[test]
fn test_asymmetry_length_mismatch() {
    let err = asymmetric_transmission(("a", &[1.0; 10][..]), ("b", &[1.0; 9][..]), 1.0)
        .unwrap_err();
    assert!(matches!(
        err,
        TransmissionError::LengthMismatch { expected: 10, got: 9 }
    ));
}

// ============================================================================
// Local Regression
// ============================================================================

#[test]
fn test_local_regression_on_market_cross_section() {
    let registry = LocationRegistry::west_java();
    let merged = DataMerger::new(&registry)
        .merge(&synthetic_tables(18, 21), Some("Beras"))
        .expect("merge succeeds");
    let panel = PanelAssembler::default()
        .assemble(&aggregate_monthly(&merged.records))
        .expect("panel assembles");
    let cs = panel
        .cross_section_means(&["precipitation_mm", "avg_distance_km"])
        .expect("known columns");

    let local = LocalRegression::new(&registry)
        .with_bandwidth(0.5)
        .expect("positive bandwidth")
        .fit(&cs)
        .expect("enough locations");
    assert_eq!(local.fits.len(), 11);
    assert_eq!(local.names, vec!["precipitation_mm", "avg_distance_km"]);
    let surface = local
        .coefficient_surface("precipitation_mm")
        .expect("known covariate");
    assert_eq!(surface.len(), 11);
    assert!(local.coefficient_surface(PRICE).is_none());

    // A very wide kernel weights every market alike.
    let global = LocalRegression::new(&registry)
        .with_bandwidth(1e6)
        .expect("positive bandwidth")
        .fit(&cs)
        .expect("enough locations");
    let first = &global.fits[0].coefficients;
    for fit in &global.fits {
        for (a, b) in fit.coefficients.iter().zip(first) {
            assert_relative_eq!(*a, *b, epsilon = 1e-8);
        }
    }
}

#[test]
fn test_local_regression_rejects_bad_bandwidth() {
    let registry = LocationRegistry::west_java();
    assert!(matches!(
        LocalRegression::new(&registry).with_bandwidth(0.0),
        Err(TransmissionError::InvalidBandwidth(_))
    ));
}
