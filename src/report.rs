//! CSV export of a pipeline run.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::pipeline::PipelineReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("cannot create {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize)]
struct ModelFitRow<'a> {
    commodity: &'a str,
    weights: &'a str,
    method: String,
    fallback_cause: Option<String>,
    n_locations: usize,
    n_periods: usize,
    n_observations: usize,
    rho: f64,
    rho_p_value: f64,
    sigma2: f64,
    pseudo_r_squared: f64,
    log_likelihood: f64,
    aic: f64,
    bic: f64,
    rmse: f64,
    mape: f64,
}

#[derive(Debug, Serialize)]
struct LmRow<'a> {
    test: &'a str,
    statistic: f64,
    df: usize,
    p_value: f64,
    recommendation: String,
}

#[derive(Debug, Serialize)]
struct MoranRow<'a> {
    scope: &'a str,
    variable: &'a str,
    i: f64,
    expected: f64,
    variance: f64,
    z_score: f64,
    p_value: f64,
    p_permutation: f64,
    permutations: usize,
}

#[derive(Debug, Serialize)]
struct ResidualRow {
    mean: f64,
    std_dev: f64,
    jarque_bera: f64,
    jarque_bera_p_value: f64,
    skewness: f64,
    kurtosis: f64,
    moran_i: f64,
    moran_p_value: f64,
}

#[derive(Debug, Serialize)]
struct ScenarioRow<'a> {
    scenario: &'a str,
    variable: &'a str,
    delta_x: f64,
    beta: f64,
    theta: f64,
    average_direct: f64,
    average_spillover: f64,
    average_total: f64,
}

#[derive(Debug, Serialize)]
struct ScenarioImpactRow<'a> {
    scenario: &'a str,
    location: &'a str,
    direct: f64,
    spillover: f64,
    total: f64,
}

#[derive(Debug, Serialize)]
struct CvRow<'a> {
    statistic: &'a str,
    coefficient_of_variation: f64,
}

#[derive(Debug, Serialize)]
struct IrfRow {
    horizon: usize,
    response: f64,
}

/// Writes the tables of a [`PipelineReport`] into one directory.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| ReportError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialise `rows` to `name`; returns the path written.
    pub fn write_rows<T: Serialize>(
        &self,
        name: &str,
        rows: impl IntoIterator<Item = T>,
    ) -> Result<PathBuf, ReportError> {
        let path = self.dir.join(name);
        let csv_err = |source| ReportError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        let mut count = 0usize;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
            count += 1;
        }
        writer.flush().map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(file = %path.display(), rows = count, "wrote table");
        Ok(path)
    }

    /// Table with an explicit header and pre-formatted records.
    fn write_records(
        &self,
        name: &str,
        header: &[String],
        records: &[Vec<String>],
    ) -> Result<PathBuf, ReportError> {
        let path = self.dir.join(name);
        let csv_err = |source| ReportError::Csv {
            path: path.clone(),
            source,
        };
        let mut writer = csv::Writer::from_path(&path).map_err(csv_err)?;
        writer.write_record(header).map_err(csv_err)?;
        for record in records {
            writer.write_record(record).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Write every table of the run.
    pub fn write_all(&self, report: &PipelineReport) -> Result<Vec<PathBuf>, ReportError> {
        let model = &report.model;
        let mut written = Vec::new();

        written.push(self.write_rows("coefficients.csv", model.coefficient_table())?);
        written.push(self.write_rows(
            "model_fit.csv",
            [ModelFitRow {
                commodity: &report.commodity,
                weights: &report.weights.label,
                method: model.method().to_string(),
                fallback_cause: model.fallback_cause().map(|c| c.to_string()),
                n_locations: model.n_locations(),
                n_periods: model.n_periods(),
                n_observations: model.n_observations(),
                rho: model.rho(),
                rho_p_value: model.rho_p_value(),
                sigma2: model.sigma2(),
                pseudo_r_squared: model.pseudo_r_squared(),
                log_likelihood: model.log_likelihood(),
                aic: model.aic(),
                bic: model.bic(),
                rmse: model.rmse(),
                mape: model.mape(),
            }],
        )?);

        written.push(self.write_rows("vif.csv", &report.vif)?);
        written.push(self.write_rows("adf.csv", &report.adf)?);
        written.push(self.write_rows("breusch_pagan.csv", report.breusch_pagan.iter())?);
        if let Some(lm) = &report.lm_tests {
            let rows = lm.tests().map(|t| LmRow {
                test: &t.test,
                statistic: t.statistic,
                df: t.df,
                p_value: t.p_value,
                recommendation: lm.recommendation.to_string(),
            });
            written.push(self.write_rows("lm_tests.csv", rows)?);
        }

        let mut moran_rows = Vec::new();
        if let Some(m) = &report.moran {
            moran_rows.push(moran_row("price", m));
        }
        if let Some(r) = &report.residuals {
            moran_rows.push(moran_row("residual", &r.moran));
        }
        written.push(self.write_rows("moran.csv", moran_rows)?);
        written.push(self.write_rows("lisa.csv", &report.lisa)?);
        if let Some(r) = &report.residuals {
            written.push(self.write_rows(
                "residual_diagnostics.csv",
                [ResidualRow {
                    mean: r.mean,
                    std_dev: r.std_dev,
                    jarque_bera: r.jarque_bera.statistic,
                    jarque_bera_p_value: r.jarque_bera.p_value,
                    skewness: r.jarque_bera.skewness,
                    kurtosis: r.jarque_bera.kurtosis,
                    moran_i: r.moran.i,
                    moran_p_value: r.moran.p_value,
                }],
            )?);
        }

        written.push(self.write_rows("effects.csv", &report.effects)?);
        written.push(self.write_multiplier(report)?);
        written.push(self.write_rows("multiplier_summary.csv", &report.multiplier_summary)?);

        written.push(self.write_rows(
            "simulations.csv",
            report.simulations.iter().map(|s| ScenarioRow {
                scenario: &s.scenario,
                variable: &s.variable,
                delta_x: s.delta_x,
                beta: s.beta,
                theta: s.theta,
                average_direct: s.average_direct,
                average_spillover: s.average_spillover,
                average_total: s.average_total,
            }),
        )?);
        written.push(self.write_rows(
            "simulation_impacts.csv",
            report.simulations.iter().flat_map(|s| {
                s.impacts.iter().map(move |i| ScenarioImpactRow {
                    scenario: &s.scenario,
                    location: &i.location,
                    direct: i.direct,
                    spillover: i.spillover,
                    total: i.total,
                })
            }),
        )?);
        written.push(self.write_rows("early_warning.csv", report.early_warning.iter())?);

        let robustness = &report.robustness;
        written.push(self.write_rows("robustness.csv", &robustness.rows)?);
        written.push(self.write_rows(
            "robustness_cv.csv",
            [
                CvRow {
                    statistic: "rho",
                    coefficient_of_variation: robustness.rho_cv,
                },
                CvRow {
                    statistic: &robustness.focus,
                    coefficient_of_variation: robustness.focus_cv,
                },
                CvRow {
                    statistic: "pseudo_r_squared",
                    coefficient_of_variation: robustness.r_squared_cv,
                },
            ],
        )?);
        if !robustness.failures.is_empty() {
            written.push(self.write_rows("robustness_failures.csv", &robustness.failures)?);
        }
        written.push(self.write_rows("weights_comparison.csv", &report.weights_comparison)?);

        written.push(self.write_rows("join_audit.csv", report.joins())?);
        written.push(self.write_rows("merge_report.csv", [&report.merge])?);
        written.push(self.write_rows("panel_report.csv", [&report.panel])?);
        written.push(self.write_rows("data_quality.csv", &report.quality.missing)?);

        if let Some(t) = &report.transmission {
            if let Some(gwr) = &t.gwr {
                let mut header = vec![
                    "location".to_string(),
                    "lat".to_string(),
                    "lon".to_string(),
                    "r_squared".to_string(),
                ];
                header.extend(gwr.names.iter().map(|n| format!("coef_{n}")));
                let records: Vec<Vec<String>> = gwr
                    .fits
                    .iter()
                    .map(|f| {
                        let mut r = vec![
                            f.location.clone(),
                            f.lat.to_string(),
                            f.lon.to_string(),
                            f.r_squared.to_string(),
                        ];
                        r.extend(f.coefficients.iter().map(|c| c.to_string()));
                        r
                    })
                    .collect();
                written.push(self.write_records("gwr.csv", &header, &records)?);
            }
            if let Some(johansen) = &t.cointegration {
                written.push(self.write_rows("johansen.csv", &johansen.ranks)?);
            }
            if let Some(irf) = &t.impulse_response {
                written.push(self.write_rows(
                    "irf.csv",
                    irf.values.iter().enumerate().map(|(h, &response)| IrfRow {
                        horizon: h,
                        response,
                    }),
                )?);
            }
            if let Some(var) = &t.var {
                written.push(self.write_rows("var_lag_selection.csv", var.lag_selection())?);
            }
            written.push(self.write_rows("granger.csv", t.granger.iter())?);
            written.push(self.write_rows("asymmetry.csv", t.asymmetry.iter())?);
        }

        info!(dir = %self.dir.display(), files = written.len(), "report written");
        Ok(written)
    }

    fn write_multiplier(&self, report: &PipelineReport) -> Result<PathBuf, ReportError> {
        let locations = report.model.locations();
        let mut header = vec!["location".to_string()];
        header.extend(locations.iter().cloned());
        let m = &report.multiplier;
        let records: Vec<Vec<String>> = locations
            .iter()
            .enumerate()
            .map(|(i, loc)| {
                let mut r = vec![loc.clone()];
                r.extend((0..m.ncols()).map(|j| m[(i, j)].to_string()));
                r
            })
            .collect();
        self.write_records("multiplier_matrix.csv", &header, &records)
    }
}

fn moran_row<'a>(scope: &'a str, m: &'a crate::diagnostics::MoranResult) -> MoranRow<'a> {
    MoranRow {
        scope,
        variable: &m.variable,
        i: m.i,
        expected: m.expected,
        variance: m.variance,
        z_score: m.z_score,
        p_value: m.p_value,
        p_permutation: m.p_permutation,
        permutations: m.permutations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        value: f64,
    }

    #[test]
    fn test_write_rows() {
        let dir = tempfile::tempdir().expect("temp dir");
        let writer = ReportWriter::new(dir.path().join("out")).expect("creatable");
        let path = writer
            .write_rows(
                "t.csv",
                [
                    Row {
                        name: "a",
                        value: 1.5,
                    },
                    Row {
                        name: "b",
                        value: -2.0,
                    },
                ],
            )
            .expect("writable");
        let text = fs::read_to_string(path).expect("readable");
        assert_eq!(text, "name,value\na,1.5\nb,-2.0\n");
    }
}
