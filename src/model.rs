use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
    optimization::{CoxOptimizer, OptimizationConfig, TieMethod, invert_matrix},
};

/// everything a fit produces, on the original covariate scale
#[derive(Debug, Clone)]
struct FittedState {
    coefficients: Array1<f64>,
    standard_errors: Array1<f64>,
    means: Array1<f64>,
    log_likelihood: f64,
    null_log_likelihood: f64,
    n_samples: usize,
    n_events: usize,
    iterations: usize,
}

/// cox proportional hazards model w/ ridge penalty, fit on standardized covariates
#[derive(Debug, Clone)]
pub struct CoxModel {
    penalizer: f64,                     // ridge penalty
    ties: TieMethod,                    // efron or breslow
    max_iterations: usize,              // optimization limit
    tolerance: f64,                     // convergence threshold
    alpha: f64,                         // 1 - confidence level
    feature_names: Option<Vec<String>>, // optional covariate labels
    fitted: Option<FittedState>,
}

impl Default for CoxModel {
    fn default() -> Self {
        Self {
            penalizer: 0.0,
            ties: TieMethod::Efron,
            max_iterations: 500,
            tolerance: 1e-7,
            alpha: 0.05,
            feature_names: None,
            fitted: None,
        }
    }
}

impl CoxModel {
    /// new cox model w/ defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// ridge penalty - shrinks coefficients, applied as n * penalizer / 2 * |beta|^2
    pub fn with_penalizer(mut self, penalizer: f64) -> Self {
        self.penalizer = penalizer.max(0.0);
        self
    }

    pub fn with_ties(mut self, ties: TieMethod) -> Self {
        self.ties = ties;
        self
    }

    /// max iterations before giving up
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// how close is close enough for convergence
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// confidence intervals cover 1 - alpha
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// give names to your covariates for nicer output
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// fit the model to data - this does the actual work
    pub fn fit(&mut self, data: &SurvivalData) -> Result<&mut Self> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(SurvivalError::invalid_parameter("alpha", self.alpha.to_string()));
        }

        let mut standardized = data.clone();
        let (means, stds) = standardized.standardize_covariates()?;

        let optimizer = CoxOptimizer::new(OptimizationConfig {
            penalizer: self.penalizer,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
            ties: self.ties,
        });
        let result = optimizer.optimize(&standardized)?;

        let covariance = invert_matrix(&(-&result.hessian))?;
        let standard_errors = covariance
            .diag()
            .iter()
            .zip(stds.iter())
            .map(|(&var, &std)| {
                if var > 0.0 && var.is_finite() {
                    Ok(var.sqrt() / std)
                } else {
                    Err(SurvivalError::numerical_error(format!(
                        "variance estimate {} is not positive",
                        var
                    )))
                }
            })
            .collect::<Result<Array1<f64>>>()?;

        let null_log_likelihood =
            optimizer.log_likelihood(&standardized, &Array1::zeros(data.n_features()))?;

        debug!(
            "cox fit converged in {} iterations: loglik = {:.4}, null loglik = {:.4}",
            result.iterations, result.log_likelihood, null_log_likelihood
        );

        self.fitted = Some(FittedState {
            coefficients: &result.beta / &stds,
            standard_errors,
            means,
            log_likelihood: result.log_likelihood,
            null_log_likelihood,
            n_samples: data.n_samples(),
            n_events: data.n_events(),
            iterations: result.iterations,
        });

        Ok(self)
    }

    fn state(&self) -> Result<&FittedState> {
        self.fitted.as_ref().ok_or(SurvivalError::ModelNotFitted)
    }

    /// get the fitted coefficients (betas) on the original covariate scale
    pub fn coefficients(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.coefficients.view())
    }

    pub fn standard_errors(&self) -> Result<ArrayView1<'_, f64>> {
        Ok(self.state()?.standard_errors.view())
    }

    /// exp(beta) per covariate
    pub fn hazard_ratios(&self) -> Result<Array1<f64>> {
        Ok(self.coefficients()?.mapv(f64::exp))
    }

    /// log partial hazard: centered linear predictor (x - mean) . beta
    pub fn predict(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        let state = self.state()?;

        if covariates.ncols() != state.coefficients.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "feature count mismatch: expected {}, got {}",
                state.coefficients.len(),
                covariates.ncols()
            )));
        }

        let offset = state.means.dot(&state.coefficients);
        Ok(covariates.dot(&state.coefficients) - offset)
    }

    /// partial hazard - relative risk exp(log partial hazard)
    pub fn predict_partial_hazard(&self, covariates: ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict(covariates)?.mapv(f64::exp))
    }

    /// two-sided normal quantile for the configured alpha
    fn z_critical(&self) -> Result<f64> {
        let normal = Normal::new(0.0, 1.0).map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
        Ok(normal.inverse_cdf(1.0 - self.alpha / 2.0))
    }

    /// (lower, upper) bounds per coefficient on the log-hazard scale
    pub fn confidence_intervals(&self) -> Result<Array2<f64>> {
        let state = self.state()?;
        let z = self.z_critical()?;

        let lower = &state.coefficients - &(z * &state.standard_errors);
        let upper = &state.coefficients + &(z * &state.standard_errors);
        ndarray::stack(Axis(1), &[lower.view(), upper.view()])
            .map_err(|e| SurvivalError::invalid_dimensions(e.to_string()))
    }

    /// penalized log partial likelihood at the fitted coefficients
    pub fn log_likelihood(&self) -> Result<f64> {
        Ok(self.state()?.log_likelihood)
    }

    /// fitted model vs the model with every coefficient at zero
    pub fn log_likelihood_ratio_test(&self) -> Result<LikelihoodRatioTest> {
        let state = self.state()?;
        let degrees_freedom = state.coefficients.len();
        let test_statistic = (2.0 * (state.log_likelihood - state.null_log_likelihood)).max(0.0);

        Ok(LikelihoodRatioTest {
            test_statistic,
            degrees_freedom,
            p_value: chi2_sf(test_statistic, degrees_freedom)?,
        })
    }

    /// get a nice summary of the fitted model
    pub fn summary(&self) -> Result<CoxModelSummary> {
        let state = self.state()?;
        let z_critical = self.z_critical()?;
        let normal = Normal::new(0.0, 1.0).map_err(|e| SurvivalError::numerical_error(e.to_string()))?;

        let z_scores = &state.coefficients / &state.standard_errors;
        let p_values = z_scores.mapv(|z| 2.0 * normal.sf(z.abs()));
        let lower = &state.coefficients - &(z_critical * &state.standard_errors);
        let upper = &state.coefficients + &(z_critical * &state.standard_errors);

        Ok(CoxModelSummary {
            coefficients: state.coefficients.clone(),
            hazard_ratios: state.coefficients.mapv(f64::exp),
            standard_errors: state.standard_errors.clone(),
            z_scores,
            p_values,
            lower_bounds: lower,
            upper_bounds: upper,
            log_likelihood: state.log_likelihood,
            likelihood_ratio: self.log_likelihood_ratio_test()?,
            n_samples: state.n_samples,
            n_events: state.n_events,
            iterations: state.iterations,
            penalizer: self.penalizer,
            alpha: self.alpha,
            feature_names: self.feature_names.clone(),
        })
    }

    /// has this model been fit to data yet?
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn penalizer(&self) -> f64 {
        self.penalizer
    }
}

/// upper tail of the chi-squared distribution
fn chi2_sf(x: f64, df: usize) -> Result<f64> {
    if df == 0 {
        return Ok(1.0);
    }
    let chi2 = ChiSquared::new(df as f64).map_err(|e| SurvivalError::numerical_error(e.to_string()))?;
    Ok(chi2.sf(x))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LikelihoodRatioTest {
    pub test_statistic: f64,
    pub degrees_freedom: usize,
    pub p_value: f64,
}

/// nice summary of what the model learned
#[derive(Debug, Clone)]
pub struct CoxModelSummary {
    pub coefficients: Array1<f64>,   // the betas
    pub hazard_ratios: Array1<f64>,  // exp(betas)
    pub standard_errors: Array1<f64>,
    pub z_scores: Array1<f64>,
    pub p_values: Array1<f64>,       // wald
    pub lower_bounds: Array1<f64>,   // log-hazard scale
    pub upper_bounds: Array1<f64>,
    pub log_likelihood: f64,
    pub likelihood_ratio: LikelihoodRatioTest,
    pub n_samples: usize,
    pub n_events: usize,
    pub iterations: usize,
    pub penalizer: f64,
    pub alpha: f64,
    pub feature_names: Option<Vec<String>>,
}

impl CoxModelSummary {
    /// print out what we learned
    pub fn print(&self) {
        println!("cox proportional hazards model summary");
        println!("=====================================");
        println!("subjects: {}, events: {}", self.n_samples, self.n_events);
        println!("penalizer: {:.6}", self.penalizer);
        println!("log-likelihood: {:.4} ({} iterations)", self.log_likelihood, self.iterations);
        println!(
            "likelihood ratio test: {:.3} on {} df, p = {:.4}",
            self.likelihood_ratio.test_statistic,
            self.likelihood_ratio.degrees_freedom,
            self.likelihood_ratio.p_value
        );
        println!();

        let level = format!("{:.0}%", 100.0 * (1.0 - self.alpha));
        println!(
            "{:<16} {:>10} {:>10} {:>10} {:>10} {:>10} {:>10}",
            "covariate", "coef", "exp(coef)", "se", "p", format!("lower {}", level), format!("upper {}", level)
        );
        println!("{:-<94}", "");

        for i in 0..self.coefficients.len() {
            let default_name = format!("x{}", i);
            let name = match &self.feature_names {
                Some(names) => names.get(i).map(|s| s.as_str()).unwrap_or(&default_name),
                None => &default_name,
            };

            println!(
                "{:<16} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                name,
                self.coefficients[i],
                self.hazard_ratios[i],
                self.standard_errors[i],
                self.p_values[i],
                self.lower_bounds[i],
                self.upper_bounds[i]
            );
        }
    }
}
