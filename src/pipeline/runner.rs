//! End-to-end run for one commodity and one primary weight matrix.

use faer::Mat;
use tracing::{info, warn};

use super::config::{PipelineConfig, PipelineOptions};
use super::robustness::{robustness_check, robustness_specs, RobustnessSummary};
use super::PipelineError;
use crate::core::LocationRegistry;
use crate::data::{
    aggregate_monthly, CrossSection, DataMerger, DataQualityReport, InputPaths, JoinAudit,
    MergeReport, MergedRecord, Panel, PanelAssembler, PanelReport, SourceTables,
    MONTH_DUMMY_PREFIX, PRICE,
};
use crate::diagnostics::{
    adf_test, breusch_pagan_ols, lm_tests, local_moran, moran_i, residual_diagnostics, vif_report,
    AdfResult, BreuschPaganResult, DiagnosticsError, LisaRow, LmDiagnostics, MoranResult,
    ResidualDiagnostics, VifRow,
};
use crate::effects::{
    canonical_scenarios, EffectRow, EffectsDecomposer, MultiplierRow, PolicySimulator,
    SimulationResult,
};
use crate::solvers::{EarlyWarning, SdmRegressor, SdmResult};
use crate::transmission::{
    asymmetric_transmission, granger_causality, johansen_trace, weekly_series, AsymmetryResult,
    Frequency, GrangerResult, GwrResult, JohansenResult, LocalRegression, SeriesSet,
    TransmissionError, VarModel,
};
use crate::utils::mean;
use crate::weights::{WeightsBuilder, WeightsSummary};

/// Responses of one market to a unit shock in another.
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub impulse: String,
    pub response: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TransmissionReport {
    pub gwr: Option<GwrResult>,
    pub frequency: Frequency,
    /// Periods in the multi-market series.
    pub n_periods: usize,
    pub cointegration: Option<JohansenResult>,
    pub var: Option<VarModel>,
    pub impulse_response: Option<ImpulseResponse>,
    pub granger: Option<GrangerResult>,
    pub asymmetry: Option<AsymmetryResult>,
}

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub commodity: String,
    pub merge: MergeReport,
    pub panel: PanelReport,
    pub quality: DataQualityReport,
    pub adf: Vec<AdfResult>,
    pub vif: Vec<VifRow>,
    pub breusch_pagan: Option<BreuschPaganResult>,
    pub moran: Option<MoranResult>,
    pub lisa: Vec<LisaRow>,
    pub lm_tests: Option<LmDiagnostics>,
    pub weights: WeightsSummary,
    pub model: SdmResult,
    pub residuals: Option<ResidualDiagnostics>,
    pub effects: Vec<EffectRow>,
    pub multiplier: Mat<f64>,
    pub multiplier_summary: Vec<MultiplierRow>,
    pub simulations: Vec<SimulationResult>,
    pub early_warning: Option<EarlyWarning>,
    pub robustness: RobustnessSummary,
    pub weights_comparison: Vec<WeightsSummary>,
    pub transmission: Option<TransmissionReport>,
}

impl PipelineReport {
    pub fn joins(&self) -> &[JoinAudit] {
        &self.merge.joins
    }
}

/// Diagnostics inform but never stop a run.
fn informational<T>(label: &str, outcome: Result<T, DiagnosticsError>) -> Option<T> {
    outcome
        .map_err(|e| warn!(diagnostic = label, error = %e, "diagnostic skipped"))
        .ok()
}

fn optional<T>(label: &str, outcome: Result<T, TransmissionError>) -> Option<T> {
    outcome
        .map_err(|e| warn!(analysis = label, error = %e, "transmission analysis skipped"))
        .ok()
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: LocationRegistry,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(registry: LocationRegistry, options: PipelineOptions) -> Result<Self, PipelineError> {
        options.validate()?;
        Ok(Self { registry, options })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(config.registry()?, config.options.clone())
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    /// Load the input files and run.
    pub fn run(&self, inputs: &InputPaths) -> Result<PipelineReport, PipelineError> {
        let tables = SourceTables::load(inputs)?;
        self.run_tables(&tables)
    }

    pub fn run_tables(&self, tables: &SourceTables) -> Result<PipelineReport, PipelineError> {
        let opts = &self.options;
        info!(commodity = %opts.commodity, weights = ?opts.weights, "starting pipeline");

        let merged = DataMerger::new(&self.registry).merge(tables, Some(&opts.commodity))?;
        let monthly = aggregate_monthly(&merged.records);
        let panel = PanelAssembler::new(opts.lags).assemble(&monthly)?;
        let quality = DataQualityReport::build(tables, &merged, &panel);
        let design = panel.spatial_design()?;
        info!(
            rows = panel.n_obs(),
            locations = design.n_locations(),
            periods = design.n_periods(),
            "panel ready"
        );

        let builder = WeightsBuilder::new(&self.registry, panel.locations())?;
        let counts = merged.facilities.facility_counts(panel.locations());
        let weights = builder.build(&opts.weights, Some(&counts))?;

        let adf = self.stationarity(&panel);
        let (vif, breusch_pagan) = self.collinearity(&panel);

        let covariates: Vec<&str> = opts.covariates.iter().map(String::as_str).collect();
        let cross_section = panel.cross_section_means(&covariates)?;
        let moran = informational(
            "moran",
            moran_i(PRICE, &cross_section.y, &weights, opts.permutations, opts.seed),
        );
        let lisa = informational(
            "lisa",
            local_moran(&cross_section.y, &weights, opts.permutations, opts.seed),
        )
        .unwrap_or_default();
        let lm = informational(
            "lm_tests",
            lm_tests(&cross_section.y, &cross_section.x, &weights, opts.significance),
        );

        let estimator = SdmRegressor::new(opts.sdm.clone());
        let model = estimator.fit(&design, &weights)?;
        let residuals = informational(
            "residuals",
            residual_diagnostics(&model, &weights, opts.permutations, opts.seed),
        );

        let decomposer =
            EffectsDecomposer::from_result(&weights, &model)?.with_significance(opts.significance);
        let effects = decomposer.decompose_result(&model, &opts.covariates, opts.effects_method)?;
        let multiplier_summary = decomposer.multiplier_summary();
        let simulations = self.simulate(&decomposer, &model, &panel)?;
        let early_warning = model.early_warning(&opts.rain_lag_prefix, opts.significance);
        if let Some(ew) = &early_warning {
            info!(
                variable = %ew.variable,
                lead_days = ew.lead_days,
                significant = ew.significant,
                "early warning"
            );
        }

        let specs = robustness_specs(&opts.knn_grid, &opts.alpha_grid, opts.combined_k);
        let run = robustness_check(
            &design,
            &builder,
            &counts,
            &specs,
            &estimator,
            &opts.focus_coefficient,
        );
        let mut weights_comparison = vec![weights.summary()];
        weights_comparison.extend(run.weights);

        let transmission = opts
            .transmission
            .enabled
            .then(|| self.transmission(&panel, &cross_section, &merged.records));

        info!(
            method = %model.method(),
            rho = model.rho(),
            robustness_failures = run.summary.failures.len(),
            "pipeline finished"
        );

        Ok(PipelineReport {
            commodity: opts.commodity.clone(),
            merge: merged.report,
            panel: panel.report().clone(),
            quality,
            adf,
            vif,
            breusch_pagan,
            moran,
            lisa,
            lm_tests: lm,
            weights: weights.summary(),
            multiplier: decomposer.multiplier().clone(),
            model,
            residuals,
            effects,
            multiplier_summary,
            simulations,
            early_warning,
            robustness: run.summary,
            weights_comparison,
            transmission,
        })
    }

    /// ADF on the cross-location average of price and each covariate.
    fn stationarity(&self, panel: &Panel) -> Vec<AdfResult> {
        std::iter::once(PRICE)
            .chain(self.options.covariates.iter().map(String::as_str))
            .filter_map(|name| {
                let series = panel
                    .period_means(name)
                    .map_err(|e| warn!(variable = name, error = %e, "no series for ADF"))
                    .ok()?;
                let values: Vec<f64> = series.into_iter().map(|(_, v)| v).collect();
                informational("adf", adf_test(name, &values, None))
            })
            .collect()
    }

    /// VIF and Breusch–Pagan on the regressors without month dummies.
    fn collinearity(&self, panel: &Panel) -> (Vec<VifRow>, Option<BreuschPaganResult>) {
        let keep: Vec<usize> = panel
            .regressor_names()
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.starts_with(MONTH_DUMMY_PREFIX))
            .map(|(j, _)| j)
            .collect();
        let names: Vec<String> = keep
            .iter()
            .map(|&j| panel.regressor_names()[j].clone())
            .collect();
        let x = Mat::from_fn(panel.n_obs(), keep.len(), |i, c| panel.x()[(i, keep[c])]);

        let vif = informational("vif", vif_report(&x, &names)).unwrap_or_default();
        let bp = informational("breusch_pagan", breusch_pagan_ols(panel.x(), panel.y()));
        (vif, bp)
    }

    /// Canonical scenarios for the covariates the model identified.
    fn simulate(
        &self,
        decomposer: &EffectsDecomposer<'_>,
        model: &SdmResult,
        panel: &Panel,
    ) -> Result<Vec<SimulationResult>, PipelineError> {
        let mut simulator = PolicySimulator::from_result(decomposer, model, &self.options.covariates)?;
        for name in &self.options.covariates {
            let values = panel.column(name)?;
            simulator = simulator.with_baseline(name.clone(), mean(&values));
        }

        let mut results = Vec::new();
        for shock in canonical_scenarios() {
            if !simulator.knows(&shock.variable) {
                warn!(scenario = %shock.name, variable = %shock.variable, "no coefficient, scenario skipped");
                continue;
            }
            results.push(simulator.simulate(&shock)?);
        }
        Ok(results)
    }

    /// Price series of the VAR markets at the configured grain.
    fn market_series(
        &self,
        panel: &Panel,
        records: &[MergedRecord],
    ) -> Result<SeriesSet, TransmissionError> {
        let t = &self.options.transmission;
        let available: Vec<String> = t
            .var_locations
            .iter()
            .filter(|loc| panel.locations().contains(loc))
            .cloned()
            .collect();
        if available.len() < 2 {
            return Err(TransmissionError::InsufficientObservations {
                needed: 2,
                got: available.len(),
            });
        }

        match t.frequency {
            Frequency::Weekly => {
                let observations: Vec<Vec<_>> = available
                    .iter()
                    .map(|loc| {
                        records
                            .iter()
                            .filter(|r| &r.location == loc)
                            .map(|r| (r.date, r.price))
                            .collect()
                    })
                    .collect();
                weekly_series(available, &observations)
            }
            Frequency::Monthly => {
                let mut prices = Vec::with_capacity(available.len());
                for loc in &available {
                    let series = panel
                        .location_series(loc, PRICE)
                        .map_err(|_| TransmissionError::UnknownSeries(loc.clone()))?;
                    prices.push(series);
                }
                SeriesSet::new(available, &prices)
            }
        }
    }

    fn transmission(
        &self,
        panel: &Panel,
        cross_section: &CrossSection,
        records: &[MergedRecord],
    ) -> TransmissionReport {
        let t = &self.options.transmission;
        let gwr = optional(
            "gwr",
            LocalRegression::new(&self.registry)
                .with_bandwidth(t.gwr_bandwidth)
                .and_then(|lr| lr.fit(cross_section)),
        );

        let series = optional("series", self.market_series(panel, records));
        let (cause, effect) = (&t.pair.0, &t.pair.1);
        let mut report = TransmissionReport {
            gwr,
            frequency: t.frequency,
            ..TransmissionReport::default()
        };
        let Some(series) = series else {
            return report;
        };
        report.n_periods = series.n_periods();
        info!(
            frequency = ?t.frequency,
            markets = series.n_variables(),
            periods = series.n_periods(),
            "transmission series ready"
        );

        report.cointegration = optional("johansen", johansen_trace(&series, t.johansen_lags));
        report.var = optional("var", VarModel::fit(&series, t.var_max_lags));
        report.impulse_response = report.var.as_ref().and_then(|var| {
            optional("irf", var.impulse_response(cause, effect, t.irf_horizon)).map(|values| {
                ImpulseResponse {
                    impulse: cause.clone(),
                    response: effect.clone(),
                    values,
                }
            })
        });
        report.granger = optional(
            "granger",
            granger_causality(&series, cause, effect, t.granger_lag),
        );

        if let (Ok(x), Ok(y)) = (series.column(cause), series.column(effect)) {
            report.asymmetry = optional(
                "asymmetry",
                asymmetric_transmission(
                    (cause.as_str(), x.as_slice()),
                    (effect.as_str(), y.as_slice()),
                    t.asymmetry_shock,
                ),
            );
        }
        report
    }
}
