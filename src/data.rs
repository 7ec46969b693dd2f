use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, SurvivalError};

/// survival data - times, events, and subject covariates
#[derive(Debug, Clone)]
pub struct SurvivalData {
    times: Array1<f64>,           // time to event/censoring
    events: Vec<bool>,            // true = event, false = censored
    covariates: Array2<f64>,      // subject covariates (n_samples x n_features)
    descending_order: Vec<usize>, // indices sorted by time, latest first
}

impl SurvivalData {
    /// make new survival data from raw vecs/arrays
    pub fn new(
        times: Vec<f64>,          // survival/censoring times
        events: Vec<bool>,        // true = event occurred, false = censored
        covariates: Array2<f64>,  // subject covariate matrix
    ) -> Result<Self> {
        let n_samples = times.len();

        if events.len() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                n_samples,
                events.len()
            )));
        }

        if covariates.nrows() != n_samples {
            return Err(SurvivalError::invalid_dimensions(format!(
                "covariates rows ({}) != n_samples ({})",
                covariates.nrows(),
                n_samples
            )));
        }

        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "survival times must be non-negative & finite",
            ));
        }

        if covariates.iter().any(|x| !x.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "covariates must be finite - drop missing rows first",
            ));
        }

        let mut descending_order: Vec<usize> = (0..n_samples).collect();
        descending_order.sort_by(|&a, &b| times[b].partial_cmp(&times[a]).unwrap_or(Ordering::Equal));

        Ok(Self {
            times: Array1::from(times),
            events,
            covariates,
            descending_order,
        })
    }

    /// how many subjects
    pub fn n_samples(&self) -> usize {
        self.times.len()
    }

    /// how many covariates per subject
    pub fn n_features(&self) -> usize {
        self.covariates.ncols()
    }

    pub fn n_events(&self) -> usize {
        self.events.iter().filter(|&&e| e).count()
    }

    /// survival/censoring times
    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    /// event indicators (true = event, false = censored)
    pub fn events(&self) -> &[bool] {
        &self.events
    }

    /// subject covariate matrix
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    /// subject indices ordered by time, latest first - risk sets grow along this order
    pub fn descending_order(&self) -> &[usize] {
        &self.descending_order
    }

    /// same subjects, different covariates (e.g. a single group indicator)
    pub fn with_covariates(&self, covariates: Array2<f64>) -> Result<Self> {
        Self::new(self.times.to_vec(), self.events.clone(), covariates)
    }

    /// column means and population stds, erroring on constant columns
    pub fn covariate_moments(&self) -> Result<(Array1<f64>, Array1<f64>)> {
        if self.n_samples() == 0 {
            return Err(SurvivalError::invalid_survival_data("no subjects to standardize"));
        }

        let means = self
            .covariates
            .mean_axis(Axis(0))
            .ok_or_else(|| SurvivalError::invalid_survival_data("no subjects to standardize"))?;
        let stds = self.covariates.std_axis(Axis(0), 0.0);

        for (j, &std) in stds.iter().enumerate() {
            if std == 0.0 {
                return Err(SurvivalError::numerical_error(format!(
                    "feature {} has zero variance - can't standardize",
                    j
                )));
            }
        }

        Ok((means, stds))
    }

    /// standardize covariates (mean=0, std=1) - modifies in place
    pub fn standardize_covariates(&mut self) -> Result<(Array1<f64>, Array1<f64>)> {
        let (means, stds) = self.covariate_moments()?;

        // z-score normalization
        for j in 0..self.n_features() {
            self.covariates
                .column_mut(j)
                .mapv_inplace(|x| (x - means[j]) / stds[j]);
        }

        Ok((means, stds))
    }
}
