//! Weight matrices over the West Java market registry.

mod common;

use approx::assert_relative_eq;
use common::ring_weights;
use faer::{Col, Mat};
use spatial_price::core::{Coordinate, LocationRegistry, KM_PER_DEGREE};
use spatial_price::weights::{
    SpatialWeights, WeightsBuilder, WeightsError, WeightsKind, WeightsSpec, ROW_SUM_TOLERANCE,
};

fn west_java_builder() -> WeightsBuilder {
    let registry = LocationRegistry::west_java();
    let names: Vec<String> = registry.names().map(str::to_string).collect();
    WeightsBuilder::new(&registry, &names).expect("all markets have coordinates")
}

fn assert_row_stochastic(w: &SpatialWeights) {
    let sums = w.row_sums();
    for i in 0..w.n() {
        assert_eq!(w.matrix()[(i, i)], 0.0, "diagonal at {i}");
        assert!(
            sums[i] == 0.0 || (sums[i] - 1.0).abs() < ROW_SUM_TOLERANCE,
            "row {i} sums to {}",
            sums[i]
        );
        for j in 0..w.n() {
            assert!(w.matrix()[(i, j)] >= 0.0);
        }
    }
}

// ============================================================================
// Registry Matrices
// ============================================================================

#[test]
fn test_knn5_over_west_java() {
    let b = west_java_builder();
    let w = b.knn(5).expect("k < n");

    assert_eq!(w.n(), 11);
    assert_row_stochastic(&w);
    assert_eq!(w.cardinalities(), vec![5; 11]);
    assert!(w.validate().is_ok());

    let summary = w.summary();
    assert_eq!(summary.label, "knn5");
    assert_relative_eq!(summary.s0, 11.0, epsilon = 1e-9);
    assert_relative_eq!(summary.mean_neighbours, 5.0, epsilon = 1e-12);
    assert_eq!(summary.islands, 0);
}

#[test]
fn test_knn_neighbours_are_nearby() {
    let b = west_java_builder();
    let w = b.knn(1).expect("k < n");
    let idx = |name: &str| {
        w.locations()
            .iter()
            .position(|l| l == name)
            .expect("registered market")
    };

    // The city and regency of Cirebon are each other's closest market.
    assert_eq!(w.matrix()[(idx("Cirebon"), idx("Kab. Cirebon"))], 1.0);
    assert_eq!(w.matrix()[(idx("Tasikmalaya"), idx("Kab. Tasikmalaya"))], 1.0);
}

#[test]
fn test_distance_matrix_is_symmetric() {
    let d = west_java_builder().distance_matrix_km();
    for i in 0..11 {
        assert_eq!(d[(i, i)], 0.0);
        for j in 0..11 {
            assert_relative_eq!(d[(i, j)], d[(j, i)], epsilon = 1e-12);
        }
    }
}

#[test]
fn test_distances_are_planar_degrees() {
    let registry = LocationRegistry::west_java();
    let b = west_java_builder();
    let d = b.distance_matrix_km();
    let idx = |name: &str| {
        b.locations()
            .iter()
            .position(|l| l == name)
            .expect("registered market")
    };
    let coord = |name: &str| registry.coordinate(name).expect("registered market");

    let (bandung, cirebon) = (coord("Bandung"), coord("Cirebon"));
    let degrees = ((bandung.lat - cirebon.lat).powi(2) + (bandung.lon - cirebon.lon).powi(2)).sqrt();
    assert_relative_eq!(
        d[(idx("Bandung"), idx("Cirebon"))],
        degrees * KM_PER_DEGREE,
        epsilon = 1e-9
    );

    // One degree is 111 km along either axis, with no latitude correction.
    let origin = Coordinate::new(-7.0, 107.0);
    assert_relative_eq!(origin.km_to(&Coordinate::new(-7.0, 108.0)), 111.0, epsilon = 1e-12);
    assert_relative_eq!(origin.km_to(&Coordinate::new(-6.0, 107.0)), 111.0, epsilon = 1e-12);
}

#[test]
fn test_every_variant_satisfies_contract() {
    let b = west_java_builder();
    let counts: Vec<f64> = (0..11).map(|i| 1.0 + i as f64).collect();

    let variants = [
        WeightsSpec::Knn { k: 3 },
        WeightsSpec::Economic,
        WeightsSpec::Combined { alpha: 0.5, k: 5 },
        WeightsSpec::InverseDistance,
        WeightsSpec::DistanceBand { threshold_km: None },
    ];
    for spec in &variants {
        let w = b.build(spec, Some(&counts)).expect("valid spec");
        assert_row_stochastic(&w);
        assert_eq!(w.locations(), b.locations());
    }
}

#[test]
fn test_labels() {
    let b = west_java_builder();
    let counts = [2.0; 11];
    assert_eq!(b.economic(&counts).expect("valid").kind().label(), "economic");
    assert_eq!(
        b.combined(0.3, 5, &counts).expect("valid").kind().label(),
        "combined_a0.3_knn5"
    );
    assert_eq!(
        b.distance_band(Some(25.0)).expect("valid").kind().label(),
        "band_25.0km"
    );
}

#[test]
fn test_economic_requires_counts() {
    let b = west_java_builder();
    let err = b.build(&WeightsSpec::Economic, None).unwrap_err();
    assert!(matches!(err, WeightsError::FacilityLength { expected: 11, .. }));

    let err = b.economic(&[1.0; 4]).unwrap_err();
    assert!(matches!(err, WeightsError::FacilityLength { expected: 11, got: 4 }));

    let mut counts = [1.0; 11];
    counts[2] = -1.0;
    let err = b.economic(&counts).unwrap_err();
    assert!(matches!(err, WeightsError::InvalidFacilityCount(name) if name == "Bandung"));
}

#[test]
fn test_unregistered_market_is_rejected() {
    let registry = LocationRegistry::west_java();
    let names = vec!["Bandung".to_string(), "Surabaya".to_string()];
    assert!(matches!(
        WeightsBuilder::new(&registry, &names),
        Err(WeightsError::UnknownLocation(name)) if name == "Surabaya"
    ));
}

#[test]
fn test_invalid_threshold() {
    let err = west_java_builder().distance_band(Some(0.0)).unwrap_err();
    assert!(matches!(err, WeightsError::InvalidThreshold(_)));
}

// ============================================================================
// Spatial Lag
// ============================================================================

#[test]
fn test_lag_is_neighbour_average() {
    let w = ring_weights(4);
    let v = Col::from_fn(4, |i| (i * i) as f64);
    let lag = w.lag(&v).expect("matching length");

    // Location 0 neighbours 1 and 3.
    assert_relative_eq!(lag[0], 0.5 * (1.0 + 9.0), epsilon = 1e-12);
    assert_relative_eq!(lag[2], 0.5 * (1.0 + 9.0), epsilon = 1e-12);
}

#[test]
fn test_panel_lag_is_location_major() {
    let w = ring_weights(3);
    let periods = 2;
    // v[loc * T + t] = 10 * loc + t
    let v = Col::from_fn(6, |r| (10 * (r / periods) + r % periods) as f64);
    let lag = w.panel_lag(&v, periods).expect("matching length");

    for loc in 0..3 {
        for t in 0..periods {
            let others: f64 = (0..3)
                .filter(|&j| j != loc)
                .map(|j| (10 * j + t) as f64)
                .sum();
            assert_relative_eq!(lag[loc * periods + t], 0.5 * others, epsilon = 1e-12);
        }
    }

    let x = Mat::from_fn(6, 2, |r, c| v[r] * (c + 1) as f64);
    let lx = w.panel_lag_matrix(&x, periods).expect("matching length");
    for r in 0..6 {
        assert_relative_eq!(lx[(r, 1)], 2.0 * lag[r], epsilon = 1e-12);
    }
}

#[test]
fn test_panel_lag_length_mismatch() {
    let w = ring_weights(3);
    let err = w.panel_lag(&Col::zeros(7), 2).unwrap_err();
    assert!(matches!(
        err,
        WeightsError::LagLength { got: 7, n: 3, periods: 2 }
    ));
}

// ============================================================================
// Raw Matrices
// ============================================================================

#[test]
fn test_from_raw_standardises_and_keeps_islands() {
    let raw = Mat::from_fn(3, 3, |i, j| if i == 0 && j > 0 { j as f64 } else { 0.0 });
    let w = SpatialWeights::from_raw(
        vec!["a".into(), "b".into(), "c".into()],
        raw,
        WeightsKind::Custom,
    )
    .expect("valid raw matrix");

    assert_relative_eq!(w.matrix()[(0, 1)], 1.0 / 3.0, epsilon = 1e-12);
    assert_relative_eq!(w.matrix()[(0, 2)], 2.0 / 3.0, epsilon = 1e-12);
    assert_eq!(w.islands(), vec![1, 2]);
    assert_eq!(w.summary().islands, 2);
}

#[test]
fn test_from_raw_rejects_bad_input() {
    let names = vec!["a".to_string(), "b".to_string()];
    let err = SpatialWeights::from_raw(names.clone(), Mat::zeros(2, 3), WeightsKind::Custom)
        .unwrap_err();
    assert!(matches!(err, WeightsError::NotSquare { rows: 2, cols: 3 }));

    let err = SpatialWeights::from_raw(
        vec!["a".to_string()],
        Mat::zeros(2, 2),
        WeightsKind::Custom,
    )
    .unwrap_err();
    assert!(matches!(err, WeightsError::LabelMismatch { .. }));

    let negative = Mat::from_fn(2, 2, |i, j| if i != j { -1.0 } else { 0.0 });
    let err = SpatialWeights::from_raw(names, negative, WeightsKind::Custom).unwrap_err();
    assert!(matches!(err, WeightsError::InvalidWeight { .. }));
}
