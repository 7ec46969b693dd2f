//! # survival baselines
//!
//! cox proportional hazards baselines for risk stratification - fit per cv fold,
//! split test subjects into risk groups, see how well the groups separate
//!
//! ## what you get
//!
//! - ridge-penalized cox regression (efron or breslow ties)
//! - fold-wise fitting w/ the risk cutoff taken from training scores only
//! - pooled results across folds, exportable to csv
//! - group hazard ratio w/ confidence interval & likelihood-ratio p-value
//! - kaplan-meier curves w/ at-risk tables, rendered to svg
//! - harrell's concordance index that skips undefined risks
//!
//! ## quick start
//!
//! ```rust
//! use survival_baselines::{CoxModel, SurvivalData, c_index_from_risk};
//! use ndarray::Array2;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // one covariate per subject
//! let times = vec![1.0, 2.5, 3.2, 4.1, 5.0, 6.3];
//! let events = vec![true, false, true, true, false, true]; // true = died, false = censored
//! let covariates = Array2::from_shape_vec((6, 1), vec![2.0, 1.5, 1.8, 0.4, 0.9, 0.1])?;
//! let data = SurvivalData::new(times, events, covariates)?;
//!
//! // fit w/ a bit of ridge
//! let mut model = CoxModel::new().with_penalizer(0.1);
//! model.fit(&data)?;
//!
//! // relative risk per subject, then how well it ranks survival
//! let risks = model.predict_partial_hazard(data.covariates())?;
//! let c = c_index_from_risk(risks.view(), data.events(), data.times())?;
//! assert!((0.0..=1.0).contains(&c));
//! # Ok(())
//! # }
//! ```
//!
//! the full pipeline is [`baseline_model`] over a [`SubjectTable`] and a
//! directory of `splits_{k}.csv` files, then [`get_hazard`] / [`plot_km`] on
//! the pooled [`ResultsTable`].

pub mod config;
pub mod cross_validation;
pub mod data;
pub mod error;
pub mod hazard;
pub mod kaplan_meier;
pub mod metrics;
pub mod model;
pub mod optimization;
pub mod plot;
pub mod results;
pub mod splits;
pub mod stratify;
pub mod table;

pub use config::{PipelineConfig, StratificationMode};
pub use cross_validation::{baseline_model, baseline_model_from_config};
pub use data::SurvivalData;
pub use error::{Result, SurvivalError};
pub use hazard::{HazardSummary, get_hazard, get_hazard_with_alpha};
pub use kaplan_meier::KaplanMeier;
pub use metrics::{c_index_from_risk, concordance_index};
pub use model::CoxModel;
pub use plot::{KmFigure, plot_km, plot_km_tri};
pub use results::{ResultsTable, RiskGroup, ScoredSubject};
pub use stratify::{RiskThreshold, fit_model, fit_model_tertiles};
pub use table::SubjectTable;

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_basic_functionality() {
        let n_samples = 100;
        let n_features = 2;

        let times = (0..n_samples).map(|i| 1.0 + i as f64).collect();
        let events = vec![true; n_samples];
        let covariates = Array2::from_shape_fn((n_samples, n_features), |(i, j)| (i % (5 + 2 * j)) as f64);

        let data = SurvivalData::new(times, events, covariates).unwrap();
        assert_eq!(data.n_samples(), n_samples);
        assert_eq!(data.n_features(), n_features);

        let mut model = CoxModel::new().with_penalizer(0.1);
        model.fit(&data).unwrap();
        assert!(model.is_fitted());
        assert_eq!(model.coefficients().unwrap().len(), n_features);
    }
}
