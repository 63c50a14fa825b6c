//! Effect decomposition and policy simulation on fitted models.

mod common;

use approx::assert_relative_eq;
use common::{ring_weights, simulate_sdm, SdmTruth};
use spatial_price::core::EstimationStrategy;
use spatial_price::effects::{
    spatial_multiplier, CovariateCoefficients, EffectsDecomposer, EffectsError, EffectsMethod,
    PolicySimulator, Shock, ShockSize,
};
use spatial_price::solvers::SdmRegressor;

// ============================================================================
// Multiplier
// ============================================================================

#[test]
fn test_multiplier_row_sums_for_row_stochastic_weights() {
    let w = ring_weights(7);
    let rho = 0.6;
    let m = spatial_multiplier(w.matrix(), rho).expect("rho in range");

    for i in 0..7 {
        let row: f64 = (0..7).map(|j| m[(i, j)]).sum();
        assert_relative_eq!(row, 1.0 / (1.0 - rho), epsilon = 1e-10);
        // The own effect includes feedback through neighbours.
        assert!(m[(i, i)] > 1.0);
    }
}

#[test]
fn test_multiplier_rejects_explosive_rho() {
    let w = ring_weights(4);
    assert!(matches!(
        spatial_multiplier(w.matrix(), -1.2),
        Err(EffectsError::UnstableRho(_))
    ));
    assert!(matches!(
        spatial_multiplier(w.matrix(), f64::NAN),
        Err(EffectsError::UnstableRho(_))
    ));
}

// ============================================================================
// Decomposition
// ============================================================================

#[test]
fn test_effects_identity() {
    let w = ring_weights(9);
    let dec = EffectsDecomposer::new(&w, 0.3, 0.01).expect("rho in range");
    let coefs = [
        CovariateCoefficients::new("a", 1.5, 0.4),
        CovariateCoefficients::new("b", -0.7, 0.2),
    ];

    for method in [EffectsMethod::Full, EffectsMethod::Simple] {
        for row in dec.decompose(&coefs, method) {
            assert_relative_eq!(row.direct + row.indirect, row.total, epsilon = 1e-12);
            assert_eq!(row.method, method);
        }
    }
}

#[test]
fn test_total_effect_closed_form() {
    let w = ring_weights(9);
    let rho = 0.3;
    let dec = EffectsDecomposer::new(&w, rho, 0.01).expect("rho in range");
    let row = dec.effect(
        &CovariateCoefficients::new("a", 1.5, 0.4),
        EffectsMethod::Full,
    );

    assert_relative_eq!(row.total, (1.5 + 0.4) / (1.0 - rho), epsilon = 1e-10);
}

#[test]
fn test_zero_rho_direct_equals_beta() {
    let w = ring_weights(5);
    let dec = EffectsDecomposer::new(&w, 0.0, 0.9).expect("rho in range");
    let row = dec.effect(
        &CovariateCoefficients::new("a", 2.0, 0.5),
        EffectsMethod::Full,
    );

    assert_relative_eq!(row.direct, 2.0, epsilon = 1e-12);
    assert_relative_eq!(row.indirect, 0.5, epsilon = 1e-12);
    assert!(!row.indirect_identified);
}

#[test]
fn test_decompose_fitted_model() {
    let weights = ring_weights(10);
    let truth = SdmTruth::default();
    let design = simulate_sdm(&weights, 40, truth, 101);
    let fit = SdmRegressor::builder()
        .strategy(EstimationStrategy::MlOnly)
        .build()
        .fit(&design, &weights)
        .expect("ML fit");

    let dec = EffectsDecomposer::from_result(&weights, &fit).expect("matching weights");
    let rows = dec
        .decompose_result(&fit, &["x1".to_string(), "x2".to_string()], EffectsMethod::Full)
        .expect("known covariates");

    assert_eq!(rows.len(), 2);
    let expected_total = (truth.beta[0] + truth.theta[0]) / (1.0 - truth.rho);
    assert_relative_eq!(rows[0].total, expected_total, epsilon = 0.3);
    assert!(rows[0].indirect_identified);
    assert_eq!(dec.multiplier_summary().len(), 10);
}

#[test]
fn test_unknown_covariate_is_error() {
    let weights = ring_weights(6);
    let design = simulate_sdm(&weights, 15, SdmTruth::default(), 4);
    let fit = SdmRegressor::default().fit(&design, &weights).expect("fit");
    let dec = EffectsDecomposer::from_result(&weights, &fit).expect("matching weights");

    let err = dec
        .decompose_result(&fit, &["rainfall".to_string()], EffectsMethod::Full)
        .unwrap_err();
    assert!(matches!(err, EffectsError::UnknownCovariate(name) if name == "rainfall"));
}

// ============================================================================
// Simulation
// ============================================================================

#[test]
fn test_simulation_scales_linearly() {
    let w = ring_weights(6);
    let dec = EffectsDecomposer::new(&w, 0.4, 0.01).expect("rho in range");
    let sim = PolicySimulator::new(&dec)
        .with_coefficients(CovariateCoefficients::new("precipitation_mm", 5.0, 1.0));

    let small = sim
        .simulate(&Shock::new("s", "precipitation_mm", ShockSize::Absolute(-100.0)))
        .expect("known covariate");
    let large = sim
        .simulate(&Shock::new("l", "precipitation_mm", ShockSize::Absolute(-200.0)))
        .expect("known covariate");

    assert_relative_eq!(large.average_total, 2.0 * small.average_total, epsilon = 1e-9);
    // Uniform shock on a ring: every location responds alike.
    for impact in &small.impacts {
        assert_relative_eq!(impact.total, small.average_total, epsilon = 1e-9);
    }
    assert_relative_eq!(small.average_total, -100.0 * 6.0 / 0.6, epsilon = 1e-9);
}

#[test]
fn test_simulation_from_fitted_model() {
    let weights = ring_weights(8);
    let design = simulate_sdm(&weights, 30, SdmTruth::default(), 55);
    let fit = SdmRegressor::default().fit(&design, &weights).expect("fit");
    let dec = EffectsDecomposer::from_result(&weights, &fit).expect("matching weights");

    let sim = PolicySimulator::from_result(&dec, &fit, &["x1".to_string()])
        .expect("known covariate")
        .with_baseline("x1", 2.0);
    assert!(sim.knows("x1"));
    assert!(!sim.knows("x2"));

    let result = sim
        .simulate(&Shock::new("x1_up", "x1", ShockSize::Relative(0.5)))
        .expect("baseline present");
    assert_relative_eq!(result.delta_x, 1.0, epsilon = 1e-12);
    assert_eq!(result.impacts.len(), 8);
    assert_relative_eq!(
        result.average_direct + result.average_spillover,
        result.average_total,
        epsilon = 1e-10
    );

    let runs = sim.run(&[Shock::new("x2", "x2", ShockSize::Absolute(1.0))]);
    assert!(matches!(runs, Err(EffectsError::UnknownCovariate(_))));
}
