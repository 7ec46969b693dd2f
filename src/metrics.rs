use ndarray::{Array1, ArrayView1};

use crate::error::{Result, SurvivalError};

/// Harrell's concordance between predicted scores and observed outcomes.
///
/// Scores follow survival-time orientation: higher score = expected to live
/// longer. Pair (i, j) is comparable when i had the event and j outlived it,
/// or j was censored no earlier than i's event. Ties in score count half.
pub fn concordance_index(
    predicted_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: &[bool],
) -> Result<f64> {
    let n = predicted_scores.len();
    if n != times.len() || n != events.len() {
        return Err(SurvivalError::invalid_dimensions(
            "scores, times, and events must have same length",
        ));
    }

    let mut concordant = 0.0;
    let mut tied = 0.0;
    let mut comparable = 0u64;

    for i in 0..n {
        if !events[i] {
            continue; // censored subjects can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                comparable += 1;

                // concordant if the longer survivor got the higher score
                if predicted_scores[j] > predicted_scores[i] {
                    concordant += 1.0;
                } else if predicted_scores[j] == predicted_scores[i] {
                    tied += 1.0;
                }
            }
        }
    }

    if comparable == 0 {
        return Err(SurvivalError::numerical_error(
            "no comparable pairs for concordance calc",
        ));
    }

    Ok((concordant + 0.5 * tied) / comparable as f64)
}

/// drop entries whose risk score is NaN, keeping the three arrays aligned
pub fn filter_defined_risks(
    risks: ArrayView1<f64>,
    events: &[bool],
    times: ArrayView1<f64>,
) -> Result<(Array1<f64>, Vec<bool>, Array1<f64>)> {
    if risks.len() != events.len() || risks.len() != times.len() {
        return Err(SurvivalError::invalid_dimensions(
            "risks, events, and times must have same length",
        ));
    }

    let keep: Vec<usize> = (0..risks.len()).filter(|&i| !risks[i].is_nan()).collect();

    Ok((
        keep.iter().map(|&i| risks[i]).collect(),
        keep.iter().map(|&i| events[i]).collect(),
        keep.iter().map(|&i| times[i]).collect(),
    ))
}

/// c-index for risk scores (higher risk = shorter expected survival).
/// Undefined risks are skipped and the remaining scores are negated.
pub fn c_index_from_risk(
    risks: ArrayView1<f64>,
    events: &[bool],
    times: ArrayView1<f64>,
) -> Result<f64> {
    let (risks, events, times) = filter_defined_risks(risks, events, times)?;
    let predicted_scores = risks.mapv(|r| -r);
    concordance_index(predicted_scores.view(), times.view(), &events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    #[test]
    fn test_perfect_concordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true, true, true, true];
        let risks = Array1::from(vec![4.0, 3.0, 2.0, 1.0]); // strictly decreasing with time

        let c_index = c_index_from_risk(risks.view(), &events, times.view()).unwrap();
        assert_relative_eq!(c_index, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_perfect_discordance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);
        let events = vec![true; 4];
        let risks = Array1::from(vec![1.0, 2.0, 3.0, 4.0]);

        let c_index = c_index_from_risk(risks.view(), &events, times.view()).unwrap();
        assert_relative_eq!(c_index, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_constant_scores_are_chance() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        let events = vec![true, false, true, true, false];
        let risks = Array1::from(vec![0.7; 5]);

        let c_index = c_index_from_risk(risks.view(), &events, times.view()).unwrap();
        assert_relative_eq!(c_index, 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_censoring_pairs() {
        // censored at time 2 is comparable with the event at 2 but not the event at 3
        let times = Array1::from(vec![2.0, 2.0, 3.0]);
        let events = vec![true, false, true];
        let scores = Array1::from(vec![0.0, 1.0, 2.0]);

        // comparable: (0,1), (0,2) -> both concordant
        let c_index = concordance_index(scores.view(), times.view(), &events).unwrap();
        assert_relative_eq!(c_index, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_nan_risks_are_skipped() {
        let times = Array1::from(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let events = vec![true, true, false, true, true, true, false, true, true, true];
        let risks = Array1::from(vec![0.9, 0.8, f64::NAN, 0.5, 0.7, 0.3, 0.4, 0.1, 0.2, 0.0]);

        let (kept, kept_events, kept_times) =
            filter_defined_risks(risks.view(), &events, times.view()).unwrap();
        assert_eq!(kept.len(), 9);
        assert_eq!(kept_events.len(), 9);
        assert!(!kept_times.iter().any(|&t| t == 3.0));

        let with_nan = c_index_from_risk(risks.view(), &events, times.view()).unwrap();
        let by_hand = concordance_index(kept.mapv(|r| -r).view(), kept_times.view(), &kept_events).unwrap();
        assert_relative_eq!(with_nan, by_hand, epsilon = 1e-12);
        assert!((0.0..=1.0).contains(&with_nan));
    }

    #[test]
    fn test_no_comparable_pairs() {
        let times = Array1::from(vec![1.0, 2.0]);
        let events = vec![false, false];
        let risks = Array1::from(vec![1.0, 2.0]);
        assert!(c_index_from_risk(risks.view(), &events, times.view()).is_err());
    }

    #[test]
    fn test_dimension_mismatch_error() {
        let risks = Array1::from(vec![1.0, 2.0]);
        let times = Array1::from(vec![1.0, 2.0, 3.0]);
        let events = vec![true, false];

        assert!(c_index_from_risk(risks.view(), &events, times.view()).is_err());
        assert!(concordance_index(risks.view(), times.view(), &events).is_err());
    }
}
