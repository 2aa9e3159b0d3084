use std::fmt;

use ndarray::ArrayView1;
use crate::error::{CoxError, Result};

/// scores predicted survival probabilities against binary event flags
///
/// the validation metrics compare one point-in-time survival probability per
/// subject w/ "did the event ever happen" - a censoring-naive stand-in for a
/// time-dependent brier score. `None` means undefined for that fold.
pub trait ValidationMetric: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn score(&self, predicted: ArrayView1<f64>, events: ArrayView1<bool>) -> Option<f64>;
}

fn indicator(event: bool) -> f64 {
    if event { 1.0 } else { 0.0 }
}

fn mean_loss(predicted: ArrayView1<f64>, events: ArrayView1<bool>, loss: impl Fn(f64) -> f64) -> Option<f64> {
    if predicted.is_empty() || predicted.len() != events.len() {
        return None;
    }
    let total: f64 = predicted
        .iter()
        .zip(events.iter())
        .map(|(&p, &e)| loss(p - indicator(e)))
        .sum();
    Some(total / predicted.len() as f64)
}

/// mean |p - delta|
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteError;

impl ValidationMetric for MeanAbsoluteError {
    fn name(&self) -> &'static str {
        "mae"
    }

    fn score(&self, predicted: ArrayView1<f64>, events: ArrayView1<bool>) -> Option<f64> {
        mean_loss(predicted, events, f64::abs)
    }
}

/// mean (p - delta)^2 - the selection criterion by default
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl ValidationMetric for MeanSquaredError {
    fn name(&self) -> &'static str {
        "mse"
    }

    fn score(&self, predicted: ArrayView1<f64>, events: ArrayView1<bool>) -> Option<f64> {
        mean_loss(predicted, events, |d| d * d)
    }
}

/// ROC AUC w/ the survival probability as score and the event flag as label
///
/// mann-whitney form w/ average ranks for ties. higher survival should mean
/// fewer events, so a good model lands *below* 0.5 here.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAuc;

impl ValidationMetric for RocAuc {
    fn name(&self) -> &'static str {
        "auc"
    }

    fn score(&self, predicted: ArrayView1<f64>, events: ArrayView1<bool>) -> Option<f64> {
        let n = predicted.len();
        if n != events.len() {
            return None;
        }
        let n_pos = events.iter().filter(|&&e| e).count() as f64;
        let n_neg = n as f64 - n_pos;
        if n_pos == 0.0 || n_neg == 0.0 {
            return None;
        }

        let mut idx: Vec<usize> = (0..n).collect();
        idx.sort_by(|&i, &j| predicted[i].total_cmp(&predicted[j]));

        // average ranks over tied scores
        let mut ranks = vec![0.0; n];
        let mut i = 0;
        while i < n {
            let mut j = i + 1;
            while j < n && predicted[idx[j]] == predicted[idx[i]] {
                j += 1;
            }
            let avg_rank = (i + j - 1) as f64 / 2.0 + 1.0;
            for &k in &idx[i..j] {
                ranks[k] = avg_rank;
            }
            i = j;
        }

        let rank_sum_pos: f64 = (0..n).filter(|&k| events[k]).map(|k| ranks[k]).sum();
        let u = rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0;
        Some(u / (n_pos * n_neg))
    }
}

/// concordance between survival probability and the event flag
///
/// over every (event, non-event) pair, the event subject should carry the
/// lower survival probability; ties count half.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryConcordance;

impl ValidationMetric for BinaryConcordance {
    fn name(&self) -> &'static str {
        "c_index"
    }

    fn score(&self, predicted: ArrayView1<f64>, events: ArrayView1<bool>) -> Option<f64> {
        if predicted.len() != events.len() {
            return None;
        }

        let mut concordant = 0.0;
        let mut comparable = 0u64;
        for (i, &p_event) in predicted.iter().enumerate() {
            if !events[i] {
                continue;
            }
            for (j, &p_other) in predicted.iter().enumerate() {
                if events[j] {
                    continue;
                }
                comparable += 1;
                if p_event < p_other {
                    concordant += 1.0;
                } else if p_event == p_other {
                    concordant += 0.5;
                }
            }
        }

        if comparable == 0 {
            return None;
        }
        Some(concordant / comparable as f64)
    }
}

/// Harrell's C-index for risk scores against observed times, w/ tie handling
pub fn harrell_c_index(
    risk_scores: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: ArrayView1<bool>,
) -> Result<f64> {
    let n = risk_scores.len();
    if n != times.len() || n != events.len() {
        return Err(CoxError::shape_mismatch(
            "risk scores, times, and events must have same length"
        ));
    }

    let mut concordant = 0.0;
    let mut discordant = 0.0;
    let mut tied_risk = 0.0;

    for i in 0..n {
        if !events[i] {
            continue; // censored obs can't anchor a pair
        }

        for j in 0..n {
            if i == j {
                continue;
            }

            // j is comparable to i if j survived longer (event or censored)
            if times[j] > times[i] || (!events[j] && times[j] >= times[i]) {
                if risk_scores[i] > risk_scores[j] {
                    concordant += 1.0;
                } else if risk_scores[i] < risk_scores[j] {
                    discordant += 1.0;
                } else {
                    tied_risk += 1.0;
                }
            }
        }
    }

    let total_pairs = concordant + discordant + tied_risk;
    if total_pairs == 0.0 {
        return Err(CoxError::degenerate(
            "no comparable pairs for C-index calculation"
        ));
    }

    Ok((concordant + 0.5 * tied_risk) / total_pairs)
}
