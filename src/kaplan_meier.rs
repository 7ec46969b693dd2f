use std::cmp::Ordering;

use ndarray::ArrayView1;
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{Result, SurvivalError};

/// One row of the event table: what happened at a single timeline point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventTableRow {
    pub time: f64,
    pub removed: usize,  // left observation at this time (events + censored)
    pub observed: usize, // events
    pub censored: usize,
    pub at_risk: usize,  // under observation just before this time
}

/// At-risk table entry for a plot tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtRiskCounts {
    pub time: f64,
    pub at_risk: usize,  // still under observation after `time`
    pub censored: usize, // censored up to and including `time`
    pub events: usize,   // events up to and including `time`
}

/// Kaplan-Meier survival estimate for one group
#[derive(Debug, Clone)]
pub struct KaplanMeier {
    label: String,
    timeline: Vec<f64>,
    survival: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    table: Vec<EventTableRow>,
    durations: Vec<f64>,
    events: Vec<bool>,
}

impl KaplanMeier {
    /// fit with 95% exponential Greenwood bands
    pub fn fit(times: ArrayView1<f64>, events: &[bool], label: impl Into<String>) -> Result<Self> {
        Self::fit_with_alpha(times, events, label, 0.05)
    }

    pub fn fit_with_alpha(
        times: ArrayView1<f64>,
        events: &[bool],
        label: impl Into<String>,
        alpha: f64,
    ) -> Result<Self> {
        if times.len() != events.len() {
            return Err(SurvivalError::invalid_dimensions(format!(
                "times len ({}) != events len ({})",
                times.len(),
                events.len()
            )));
        }
        if times.is_empty() {
            return Err(SurvivalError::invalid_survival_data(
                "can't fit a survival curve to zero subjects",
            ));
        }
        if times.iter().any(|&t| t < 0.0 || !t.is_finite()) {
            return Err(SurvivalError::invalid_survival_data(
                "survival times must be non-negative & finite",
            ));
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(SurvivalError::invalid_parameter("alpha", alpha.to_string()));
        }

        let z = Normal::new(0.0, 1.0)
            .map_err(|e| SurvivalError::numerical_error(e.to_string()))?
            .inverse_cdf(1.0 - alpha / 2.0);

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[a].partial_cmp(&times[b]).unwrap_or(Ordering::Equal));

        let mut timeline = Vec::new();
        let mut survival = Vec::new();
        let mut lower = Vec::new();
        let mut upper = Vec::new();
        let mut table = Vec::new();

        let n = times.len();
        if times[order[0]] > 0.0 {
            timeline.push(0.0);
            survival.push(1.0);
            lower.push(1.0);
            upper.push(1.0);
            table.push(EventTableRow { time: 0.0, removed: 0, observed: 0, censored: 0, at_risk: n });
        }

        let mut at_risk = n;
        let mut surv = 1.0;
        let mut greenwood = 0.0;
        let mut i = 0;
        while i < n {
            let time = times[order[i]];
            let mut removed = 0;
            let mut observed = 0;
            while i < n && times[order[i]] == time {
                removed += 1;
                if events[order[i]] {
                    observed += 1;
                }
                i += 1;
            }

            if observed > 0 {
                surv *= 1.0 - observed as f64 / at_risk as f64;
                if observed < at_risk {
                    greenwood += observed as f64 / (at_risk as f64 * (at_risk - observed) as f64);
                }
            }

            let (lo, hi) = exponential_greenwood(surv, greenwood, z);
            timeline.push(time);
            survival.push(surv);
            lower.push(lo);
            upper.push(hi);
            table.push(EventTableRow {
                time,
                removed,
                observed,
                censored: removed - observed,
                at_risk,
            });

            at_risk -= removed;
        }

        Ok(Self {
            label: label.into(),
            timeline,
            survival,
            lower,
            upper,
            table,
            durations: times.to_vec(),
            events: events.to_vec(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn n_subjects(&self) -> usize {
        self.durations.len()
    }

    /// 0 (when nobody left at 0) followed by every distinct duration
    pub fn timeline(&self) -> &[f64] {
        &self.timeline
    }

    pub fn survival_function(&self) -> &[f64] {
        &self.survival
    }

    /// (lower, upper) band aligned with the timeline
    pub fn confidence_interval(&self) -> (&[f64], &[f64]) {
        (&self.lower, &self.upper)
    }

    pub fn event_table(&self) -> &[EventTableRow] {
        &self.table
    }

    /// right-continuous step lookup
    pub fn survival_at(&self, t: f64) -> f64 {
        let idx = self.timeline.partition_point(|&x| x <= t);
        if idx == 0 { 1.0 } else { self.survival[idx - 1] }
    }

    /// first time the curve reaches 0.5, if it ever does
    pub fn median_survival_time(&self) -> Option<f64> {
        self.timeline
            .iter()
            .zip(self.survival.iter())
            .find(|&(_, &s)| s <= 0.5)
            .map(|(&t, _)| t)
    }

    pub fn at_risk_counts(&self, t: f64) -> AtRiskCounts {
        let mut counts = AtRiskCounts { time: t, at_risk: 0, censored: 0, events: 0 };
        for (&d, &e) in self.durations.iter().zip(self.events.iter()) {
            if d > t {
                counts.at_risk += 1;
            } else if e {
                counts.events += 1;
            } else {
                counts.censored += 1;
            }
        }
        counts
    }

    pub fn last_time(&self) -> f64 {
        self.timeline.last().copied().unwrap_or(0.0)
    }
}

/// log(-log) transformed bounds; collapse to the estimate at 0 and 1
fn exponential_greenwood(surv: f64, greenwood: f64, z: f64) -> (f64, f64) {
    if surv >= 1.0 {
        return (1.0, 1.0);
    }
    if surv <= 0.0 {
        return (0.0, 0.0);
    }

    let log_surv = surv.ln();
    let se = (greenwood / (log_surv * log_surv)).sqrt();
    let theta = (-log_surv).ln();
    let lower = (-(theta + z * se).exp()).exp();
    let upper = (-(theta - z * se).exp()).exp();
    (lower, upper)
}
