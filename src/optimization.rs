use log::debug;
use ndarray::{Array1, Array2, ArrayView1};
use serde::Deserialize;

use crate::{
    data::SurvivalData,
    error::{Result, SurvivalError},
};

/// How tied event times enter the partial likelihood
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieMethod {
    #[default]
    Efron,
    Breslow,
}

/// Configuration for Cox model optimization
#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    /// ridge strength, scaled by the number of subjects
    pub penalizer: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub ties: TieMethod,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            penalizer: 0.0,
            max_iterations: 500,
            tolerance: 1e-7,
            ties: TieMethod::Efron,
        }
    }
}

/// What the optimizer hands back
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub beta: Array1<f64>,
    /// penalized Hessian of the log partial likelihood at `beta`
    pub hessian: Array2<f64>,
    /// penalized log partial likelihood at `beta`
    pub log_likelihood: f64,
    pub iterations: usize,
}

const MAX_STEP_HALVINGS: usize = 30;

/// Newton-Raphson for the ridge-penalized Cox partial likelihood
pub struct CoxOptimizer {
    config: OptimizationConfig,
}

impl CoxOptimizer {
    pub fn new(config: OptimizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Optimize from beta = 0. Expects covariates already on a sensible scale.
    pub fn optimize(&self, data: &SurvivalData) -> Result<OptimizationResult> {
        if data.n_events() == 0 {
            return Err(SurvivalError::invalid_survival_data(
                "no events observed - nothing to fit",
            ));
        }
        if self.config.penalizer < 0.0 || !self.config.penalizer.is_finite() {
            return Err(SurvivalError::invalid_parameter(
                "penalizer",
                self.config.penalizer.to_string(),
            ));
        }

        self.newton_raphson_optimize(data)
    }

    fn newton_raphson_optimize(&self, data: &SurvivalData) -> Result<OptimizationResult> {
        let mut beta = Array1::zeros(data.n_features());
        let (mut loglik, mut gradient, mut hessian) = self.penalized_derivatives(data, &beta)?;

        for iteration in 0..self.config.max_iterations {
            let neg_hessian = -&hessian;
            let delta = solve_linear_system(&neg_hessian, &gradient)?;

            // halve the step until the penalized likelihood stops dropping
            let mut step = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_STEP_HALVINGS {
                let candidate = &beta + &(step * &delta);
                if let Ok((ll, g, h)) = self.penalized_derivatives(data, &candidate) {
                    if ll.is_finite() && ll >= loglik - 1e-12 * loglik.abs().max(1.0) {
                        accepted = Some((candidate, ll, g, h));
                        break;
                    }
                }
                step *= 0.5;
            }

            let Some((candidate, ll, g, h)) = accepted else {
                return Err(SurvivalError::optimization_failed(
                    "step halving couldn't improve the partial likelihood",
                ));
            };

            let step_norm = (step * &delta).mapv(|x| x * x).sum().sqrt();
            let improvement = ll - loglik;

            beta = candidate;
            loglik = ll;
            gradient = g;
            hessian = h;

            debug!(
                "newton-raphson iteration {}: loglik = {:.6}, |step| = {:.3e}, step size = {}",
                iteration + 1,
                loglik,
                step_norm,
                step
            );

            if step_norm < self.config.tolerance || improvement.abs() < self.config.tolerance {
                return Ok(OptimizationResult {
                    beta,
                    hessian,
                    log_likelihood: loglik,
                    iterations: iteration + 1,
                });
            }
        }

        Err(SurvivalError::optimization_failed(format!(
            "Newton-Raphson failed to converge in {} iterations",
            self.config.max_iterations
        )))
    }

    /// log partial likelihood, gradient and Hessian with the ridge term applied
    pub fn penalized_derivatives(
        &self,
        data: &SurvivalData,
        beta: &Array1<f64>,
    ) -> Result<(f64, Array1<f64>, Array2<f64>)> {
        let (mut loglik, mut gradient, mut hessian) = self.compute_likelihood_derivatives(data, beta)?;

        let strength = self.config.penalizer * data.n_samples() as f64;
        if strength > 0.0 {
            loglik -= 0.5 * strength * beta.dot(beta);
            gradient.scaled_add(-strength, beta);
            for i in 0..beta.len() {
                hessian[[i, i]] -= strength;
            }
        }

        Ok((loglik, gradient, hessian))
    }

    /// unpenalized log partial likelihood
    pub fn log_likelihood(&self, data: &SurvivalData, beta: &Array1<f64>) -> Result<f64> {
        Ok(self.compute_likelihood_derivatives(data, beta)?.0)
    }

    /// Compute log partial likelihood and its derivatives.
    ///
    /// Walks subjects from the latest time backwards so each risk set is the
    /// running sum of everything seen so far. Weights are shifted by the max
    /// linear predictor to keep `exp` in range.
    fn compute_likelihood_derivatives(
        &self,
        data: &SurvivalData,
        beta: &Array1<f64>,
    ) -> Result<(f64, Array1<f64>, Array2<f64>)> {
        let n_features = data.n_features();
        if beta.len() != n_features {
            return Err(SurvivalError::invalid_dimensions(format!(
                "beta has {} entries, data has {} features",
                beta.len(),
                n_features
            )));
        }

        let covariates = data.covariates();
        let times = data.times();
        let events = data.events();
        let order = data.descending_order();

        let linear_pred = covariates.dot(beta);
        let shift = linear_pred.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let shift = if shift.is_finite() { shift } else { 0.0 };

        let mut loglik = 0.0;
        let mut gradient = Array1::zeros(n_features);
        let mut hessian = Array2::zeros((n_features, n_features));

        let mut risk_sum = 0.0;
        let mut risk_first = Array1::<f64>::zeros(n_features);
        let mut risk_second = Array2::<f64>::zeros((n_features, n_features));

        let mut i = 0;
        while i < order.len() {
            let time = times[order[i]];

            let mut tied_sum = 0.0;
            let mut tied_first = Array1::<f64>::zeros(n_features);
            let mut tied_second = Array2::<f64>::zeros((n_features, n_features));
            let mut n_tied = 0usize;

            while i < order.len() && times[order[i]] == time {
                let idx = order[i];
                let weight = (linear_pred[idx] - shift).exp();
                if !weight.is_finite() {
                    return Err(SurvivalError::numerical_error(format!(
                        "Invalid exponential prediction: {}",
                        weight
                    )));
                }
                let row = covariates.row(idx);

                risk_sum += weight;
                risk_first.scaled_add(weight, &row);
                add_weighted_outer(&mut risk_second, weight, row);

                if events[idx] {
                    tied_sum += weight;
                    tied_first.scaled_add(weight, &row);
                    add_weighted_outer(&mut tied_second, weight, row);

                    loglik += linear_pred[idx];
                    gradient += &row;
                    n_tied += 1;
                }
                i += 1;
            }

            for l in 0..n_tied {
                let fraction = match self.config.ties {
                    TieMethod::Efron => l as f64 / n_tied as f64,
                    TieMethod::Breslow => 0.0,
                };

                let denom = risk_sum - fraction * tied_sum;
                if !(denom > 0.0) {
                    return Err(SurvivalError::numerical_error("Risk set sum is non-positive"));
                }

                let mean = (&risk_first - &(fraction * &tied_first)) / denom;
                let second = (&risk_second - &(fraction * &tied_second)) / denom;

                loglik -= denom.ln() + shift;
                gradient -= &mean;
                hessian -= &second;
                add_weighted_outer(&mut hessian, 1.0, mean.view());
            }
        }

        Ok((loglik, gradient, hessian))
    }
}

fn add_weighted_outer(target: &mut Array2<f64>, weight: f64, v: ArrayView1<f64>) {
    let n = v.len();
    for j in 0..n {
        for k in 0..n {
            target[[j, k]] += weight * v[j] * v[k];
        }
    }
}

/// Solve linear system Ax = b with partial pivoting
pub fn solve_linear_system(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return Err(SurvivalError::invalid_dimensions("Matrix dimensions mismatch"));
    }

    let mut a_copy = a.clone();
    let mut b_copy = b.clone();

    // Forward elimination
    for i in 0..n {
        let mut max_row = i;
        for k in i + 1..n {
            if a_copy[[k, i]].abs() > a_copy[[max_row, i]].abs() {
                max_row = k;
            }
        }

        if !(a_copy[[max_row, i]].abs() >= 1e-12) {
            return Err(SurvivalError::numerical_error("Matrix is singular"));
        }

        if max_row != i {
            for j in 0..n {
                a_copy.swap([i, j], [max_row, j]);
            }
            b_copy.swap(i, max_row);
        }

        for k in i + 1..n {
            let factor = a_copy[[k, i]] / a_copy[[i, i]];
            for j in i..n {
                a_copy[[k, j]] -= factor * a_copy[[i, j]];
            }
            b_copy[k] -= factor * b_copy[i];
        }
    }

    // Back substitution
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = b_copy[i];
        for j in i + 1..n {
            x[i] -= a_copy[[i, j]] * x[j];
        }
        x[i] /= a_copy[[i, i]];
    }

    Ok(x)
}

/// Invert a square matrix one unit column at a time
pub fn invert_matrix(a: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    let mut inverse = Array2::zeros((n, n));
    for j in 0..n {
        let mut unit = Array1::zeros(n);
        unit[j] = 1.0;
        let column = solve_linear_system(a, &unit)?;
        inverse.column_mut(j).assign(&column);
    }
    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn create_test_data() -> SurvivalData {
        let times = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let events = vec![true, true, false, true, true, false];
        let covariates = Array2::from_shape_vec((6, 2), vec![
            1.0, 0.0,
            0.0, 1.0,
            1.0, 1.0,
            -1.0, 0.0,
            0.0, -1.0,
            -1.0, 0.5,
        ]).unwrap();

        SurvivalData::new(times, events, covariates).unwrap()
    }

    fn tied_data() -> SurvivalData {
        let times = vec![1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 4.0];
        let events = vec![true, true, true, true, false, true, false];
        let covariates = Array2::from_shape_vec((7, 1), vec![1.2, 0.4, 0.8, -0.3, 0.1, -0.9, -1.1]).unwrap();
        SurvivalData::new(times, events, covariates).unwrap()
    }

    #[test]
    fn test_optimizer_creation() {
        let config = OptimizationConfig::default();
        let optimizer = CoxOptimizer::new(config.clone());
        assert_eq!(optimizer.config().penalizer, config.penalizer);
        assert_eq!(optimizer.config().ties, TieMethod::Efron);
    }

    #[test]
    fn test_gradient_vanishes_at_optimum() {
        let data = tied_data();
        for ties in [TieMethod::Efron, TieMethod::Breslow] {
            let optimizer = CoxOptimizer::new(OptimizationConfig { ties, ..Default::default() });
            let result = optimizer.optimize(&data).unwrap();
            let (_, gradient, _) = optimizer.penalized_derivatives(&data, &result.beta).unwrap();
            assert!(gradient.iter().all(|g| g.abs() < 1e-4), "{:?}: {:?}", ties, gradient);
        }
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let data = tied_data();
        let optimizer = CoxOptimizer::new(OptimizationConfig::default());
        let beta = Array1::from(vec![0.3]);
        let (_, gradient, hessian) = optimizer.penalized_derivatives(&data, &beta).unwrap();

        let h = 1e-5;
        let up = optimizer.log_likelihood(&data, &Array1::from(vec![0.3 + h])).unwrap();
        let down = optimizer.log_likelihood(&data, &Array1::from(vec![0.3 - h])).unwrap();
        assert_relative_eq!(gradient[0], (up - down) / (2.0 * h), epsilon = 1e-5);

        let (_, g_up, _) = optimizer.penalized_derivatives(&data, &Array1::from(vec![0.3 + h])).unwrap();
        let (_, g_down, _) = optimizer.penalized_derivatives(&data, &Array1::from(vec![0.3 - h])).unwrap();
        assert_relative_eq!(hessian[[0, 0]], (g_up[0] - g_down[0]) / (2.0 * h), epsilon = 1e-4);
    }

    #[test]
    fn test_ties_agree_without_tied_events() {
        let data = create_test_data();
        let beta = Array1::from(vec![0.2, -0.4]);
        let efron = CoxOptimizer::new(OptimizationConfig::default());
        let breslow = CoxOptimizer::new(OptimizationConfig { ties: TieMethod::Breslow, ..Default::default() });

        assert_relative_eq!(
            efron.log_likelihood(&data, &beta).unwrap(),
            breslow.log_likelihood(&data, &beta).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_null_log_likelihood_by_hand() {
        // at beta = 0 with no ties: sum over events of -ln(|risk set|)
        let data = create_test_data();
        let optimizer = CoxOptimizer::new(OptimizationConfig::default());
        let ll = optimizer.log_likelihood(&data, &Array1::zeros(2)).unwrap();
        let expected = -(6.0f64.ln() + 5.0f64.ln() + 3.0f64.ln() + 2.0f64.ln());
        assert_relative_eq!(ll, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_large_ridge_shrinks_to_zero() {
        let data = create_test_data();
        let optimizer = CoxOptimizer::new(OptimizationConfig { penalizer: 1e4, ..Default::default() });
        let result = optimizer.optimize(&data).unwrap();
        assert!(result.beta.iter().all(|b| b.abs() < 1e-3));
    }

    #[test]
    fn test_no_events_is_an_error() {
        let covariates = Array2::from_shape_vec((3, 1), vec![0.1, 0.2, 0.3]).unwrap();
        let data = SurvivalData::new(vec![1.0, 2.0, 3.0], vec![false; 3], covariates).unwrap();
        let optimizer = CoxOptimizer::new(OptimizationConfig::default());
        assert!(optimizer.optimize(&data).is_err());
    }

    #[test]
    fn test_solve_and_invert() {
        let a = Array2::from_shape_vec((2, 2), vec![4.0, 1.0, 2.0, 3.0]).unwrap();
        let b = Array1::from(vec![1.0, 2.0]);
        let x = solve_linear_system(&a, &b).unwrap();
        assert_relative_eq!(x[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(x[1], 0.6, epsilon = 1e-12);

        let inverse = invert_matrix(&a).unwrap();
        let identity = a.dot(&inverse);
        assert_relative_eq!(identity[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(identity[[0, 1]], 0.0, epsilon = 1e-12);

        let singular = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        assert!(solve_linear_system(&singular, &b).is_err());
    }
}
