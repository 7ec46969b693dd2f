use std::fmt;

use log::debug;

use crate::{
    error::{Result, SurvivalError},
    model::CoxModel,
    results::ResultsTable,
};

/// Low-risk vs high-risk hazard ratio with its interval and LR-test p-value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardSummary {
    pub hazard_ratio: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub p_value: f64,
}

impl fmt::Display for HazardSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HR = {:.3}\nCI [{:.3}, {:.3}]\np = {:.3}",
            self.hazard_ratio, self.ci_lower, self.ci_upper, self.p_value
        )
    }
}

/// 95% interval version of [`get_hazard_with_alpha`]
pub fn get_hazard(results: &ResultsTable) -> Result<HazardSummary> {
    get_hazard_with_alpha(results, 0.05)
}

/// Unpenalized univariate Cox fit of the outcomes on the low-risk flag.
/// Everything is exponentiated back from the log-hazard scale.
pub fn get_hazard_with_alpha(results: &ResultsTable, alpha: f64) -> Result<HazardSummary> {
    if results.is_empty() {
        return Err(SurvivalError::invalid_survival_data("no scored subjects to compare"));
    }

    let data = results.low_risk_data()?;
    let mut model = CoxModel::new()
        .with_penalizer(0.0)
        .with_alpha(alpha)
        .with_feature_names(vec!["lowrisk".to_string()]);
    model.fit(&data)?;

    let beta = model.coefficients()?[0];
    let bounds = model.confidence_intervals()?;
    let lr = model.log_likelihood_ratio_test()?;

    let summary = HazardSummary {
        hazard_ratio: beta.exp(),
        ci_lower: bounds[[0, 0]].exp(),
        ci_upper: bounds[[0, 1]].exp(),
        p_value: lr.p_value,
    };
    debug!("group hazard: {:?} (LR statistic {:.4})", summary, lr.test_statistic);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{RiskGroup, ScoredSubject};

    fn row(i: usize, time: f64, event: bool, low: bool) -> ScoredSubject {
        ScoredSubject {
            id: i.to_string(),
            fold: 0,
            time,
            event,
            covariates: vec![],
            predicted_hazard: if low { 0.5 } else { 2.0 },
            low_risk: low,
            risk_group: if low { RiskGroup::Low } else { RiskGroup::High },
        }
    }

    fn separated_results() -> ResultsTable {
        // low-risk subjects survive longer on average, with some overlap
        let mut rows = Vec::new();
        for i in 0..20 {
            let low = i % 2 == 0;
            let base = if low { 4.0 } else { 1.5 };
            let time = base + (i % 5) as f64 * 1.2;
            rows.push(row(i, time, i % 7 != 0, low));
        }
        ResultsTable::from_rows(vec![], rows).unwrap()
    }

    #[test]
    fn test_hazard_bounds_and_direction() {
        let summary = get_hazard(&separated_results()).unwrap();
        assert!(summary.ci_lower <= summary.hazard_ratio);
        assert!(summary.hazard_ratio <= summary.ci_upper);
        assert!(summary.hazard_ratio < 1.0);
        assert!((0.0..=1.0).contains(&summary.p_value));
    }

    #[test]
    fn test_wider_interval_at_smaller_alpha() {
        let results = separated_results();
        let narrow = get_hazard_with_alpha(&results, 0.2).unwrap();
        let wide = get_hazard_with_alpha(&results, 0.01).unwrap();
        assert!(wide.ci_lower < narrow.ci_lower);
        assert!(wide.ci_upper > narrow.ci_upper);
        assert_eq!(wide.p_value, narrow.p_value);
    }

    #[test]
    fn test_single_group_fails() {
        let rows = (0..6).map(|i| row(i, 1.0 + i as f64, true, true)).collect();
        let results = ResultsTable::from_rows(vec![], rows).unwrap();
        assert!(get_hazard(&results).is_err());
        assert!(get_hazard(&ResultsTable::new(vec![])).is_err());
    }

    #[test]
    fn test_display_matches_annotation_layout() {
        let summary = HazardSummary { hazard_ratio: 0.5, ci_lower: 0.25, ci_upper: 1.0, p_value: 0.0123 };
        assert_eq!(summary.to_string(), "HR = 0.500\nCI [0.250, 1.000]\np = 0.012");
    }
}
