//! Fold-wise fitting and risk stratification.
//!
//! The cutoff is always taken from the training partial hazards before the
//! test partition is scored, so nothing about the test subjects can move it.

use std::cmp::Ordering;

use log::debug;
use ndarray::ArrayView1;

use crate::{
    config::ModelConfig,
    data::SurvivalData,
    error::{Result, SurvivalError},
    model::CoxModel,
    results::{RiskGroup, ScoredSubject},
};

/// Cutoff(s) on the partial hazard scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RiskThreshold {
    /// low iff score < cutoff, high otherwise
    Binary(f64),
    /// low iff score < lower, high iff score >= upper
    Tertile { lower: f64, upper: f64 },
}

impl RiskThreshold {
    pub fn classify(&self, score: f64) -> RiskGroup {
        match *self {
            RiskThreshold::Binary(cutoff) => {
                if score < cutoff {
                    RiskGroup::Low
                } else {
                    RiskGroup::High
                }
            }
            RiskThreshold::Tertile { lower, upper } => {
                if score < lower {
                    RiskGroup::Low
                } else if score >= upper {
                    RiskGroup::High
                } else {
                    RiskGroup::Medium
                }
            }
        }
    }
}

/// Output of one fold: the fitted model, its cutoff and the scored test rows
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub model: CoxModel,
    pub threshold: RiskThreshold,
    pub rows: Vec<ScoredSubject>,
}

/// Percentile with linear interpolation between order statistics.
///
/// `p` is on the 0-100 scale. NaN values are rejected rather than sorted.
pub fn percentile(values: ArrayView1<f64>, p: f64) -> Result<f64> {
    if !(0.0..=100.0).contains(&p) {
        return Err(SurvivalError::invalid_parameter("percentile", p.to_string()));
    }
    if values.is_empty() {
        return Err(SurvivalError::invalid_dimensions("percentile of an empty array"));
    }
    if values.iter().any(|v| v.is_nan()) {
        return Err(SurvivalError::numerical_error("percentile input contains NaN"));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

fn fit_cox(train: &SurvivalData, config: &ModelConfig) -> Result<CoxModel> {
    let mut model = CoxModel::new()
        .with_penalizer(config.penalizer)
        .with_ties(config.ties)
        .with_max_iterations(config.max_iterations)
        .with_tolerance(config.tolerance)
        .with_alpha(config.alpha);
    model.fit(train)?;
    Ok(model)
}

fn score_test(
    model: &CoxModel,
    threshold: RiskThreshold,
    test: &SurvivalData,
    test_ids: &[String],
    fold: usize,
) -> Result<Vec<ScoredSubject>> {
    if test_ids.len() != test.n_samples() {
        return Err(SurvivalError::invalid_dimensions(format!(
            "{} test ids for {} test subjects",
            test_ids.len(),
            test.n_samples()
        )));
    }

    let scores = model.predict_partial_hazard(test.covariates())?;
    let covariates = test.covariates();

    Ok(test_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let score = scores[i];
            let risk_group = threshold.classify(score);
            ScoredSubject {
                id: id.clone(),
                fold,
                time: test.times()[i],
                event: test.events()[i],
                covariates: covariates.row(i).to_vec(),
                predicted_hazard: score,
                low_risk: risk_group == RiskGroup::Low,
                risk_group,
            }
        })
        .collect())
}

/// Fit on `train`, cut at `lowrisk_percentile` of the training partial
/// hazards, then label every test subject low-risk iff its score is below
/// that cutoff.
pub fn fit_model(
    train: &SurvivalData,
    test: &SurvivalData,
    test_ids: &[String],
    fold: usize,
    config: &ModelConfig,
    lowrisk_percentile: f64,
) -> Result<FoldResult> {
    let model = fit_cox(train, config)?;
    let train_scores = model.predict_partial_hazard(train.covariates())?;
    let threshold = RiskThreshold::Binary(percentile(train_scores.view(), lowrisk_percentile)?);
    debug!("fold {}: threshold {:?} from {} training scores", fold, threshold, train_scores.len());

    let rows = score_test(&model, threshold, test, test_ids, fold)?;
    Ok(FoldResult { model, threshold, rows })
}

/// Three groups cut at the training tertiles
pub fn fit_model_tertiles(
    train: &SurvivalData,
    test: &SurvivalData,
    test_ids: &[String],
    fold: usize,
    config: &ModelConfig,
) -> Result<FoldResult> {
    let model = fit_cox(train, config)?;
    let train_scores = model.predict_partial_hazard(train.covariates())?;
    let threshold = RiskThreshold::Tertile {
        lower: percentile(train_scores.view(), 100.0 / 3.0)?,
        upper: percentile(train_scores.view(), 200.0 / 3.0)?,
    };
    debug!("fold {}: threshold {:?} from {} training scores", fold, threshold, train_scores.len());

    let rows = score_test(&model, threshold, test, test_ids, fold)?;
    Ok(FoldResult { model, threshold, rows })
}
