//! cox partial log-likelihood
//!
//! risk set for subject `i` = everyone with `T_j >= T_i` (ties sit in each
//! other's risk sets, no breslow/efron correction). the log of each risk-set
//! sum is taken with a log-sum-exp shift so large linear predictors don't
//! overflow.

use ndarray::{Array1, ArrayView1, ArrayView2};
use crate::error::{CoxError, Result};

/// subjects ordered by descending time, grouped by tied times
///
/// walking this order while accumulating `exp(eta)` yields every risk-set sum
/// in one pass.
#[derive(Debug, Clone)]
pub struct RiskSetOrder {
    order: Vec<usize>,       // subject indices, latest time first
    group_ends: Vec<usize>,  // exclusive end of each tied-time group in `order`
}

impl RiskSetOrder {
    pub fn new(times: ArrayView1<f64>) -> Self {
        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by(|&a, &b| times[b].total_cmp(&times[a]));

        let mut group_ends = Vec::new();
        for pos in 1..order.len() {
            if times[order[pos]] != times[order[pos - 1]] {
                group_ends.push(pos);
            }
        }
        if !order.is_empty() {
            group_ends.push(order.len());
        }

        Self { order, group_ends }
    }

    pub fn n_samples(&self) -> usize {
        self.order.len()
    }

    /// partial log-likelihood given precomputed linear predictors
    pub fn log_likelihood(&self, eta: ArrayView1<f64>, events: ArrayView1<bool>) -> Result<f64> {
        if eta.len() != self.order.len() || events.len() != self.order.len() {
            return Err(CoxError::shape_mismatch(
                format!(
                    "risk sets cover {} subjects, got {} predictors and {} event flags",
                    self.order.len(), eta.len(), events.len()
                )
            ));
        }

        let shift = eta.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if shift.is_nan() || shift == f64::INFINITY {
            return Ok(f64::NEG_INFINITY);
        }
        if shift == f64::NEG_INFINITY {
            // empty cohort or every predictor at -inf
            return Ok(if events.iter().any(|&e| e) { f64::NEG_INFINITY } else { 0.0 });
        }

        let mut loglik = 0.0;
        let mut scaled_risk_sum = 0.0;
        let mut start = 0;

        for &end in &self.group_ends {
            let group = &self.order[start..end];
            for &i in group {
                scaled_risk_sum += (eta[i] - shift).exp();
            }

            let log_risk_sum = shift + scaled_risk_sum.ln();
            for &i in group {
                if events[i] {
                    loglik += eta[i] - log_risk_sum;
                }
            }
            start = end;
        }

        Ok(loglik)
    }
}

/// linear predictor `Z b`
pub fn linear_predictor(design: ArrayView2<f64>, beta: ArrayView1<f64>) -> Result<Array1<f64>> {
    if design.ncols() != beta.len() {
        return Err(CoxError::shape_mismatch(
            format!("design has {} columns but beta has {} entries", design.ncols(), beta.len())
        ));
    }
    Ok(design.dot(&beta))
}

/// cox partial log-likelihood
/// `sum_i delta_i * ((Z b)_i - log(sum_{j: T_j >= T_i} exp((Z b)_j)))`
pub fn partial_log_likelihood(
    beta: ArrayView1<f64>,
    times: ArrayView1<f64>,
    events: ArrayView1<bool>,
    design: ArrayView2<f64>,
) -> Result<f64> {
    if times.len() != events.len() || design.nrows() != times.len() {
        return Err(CoxError::shape_mismatch(
            format!(
                "times ({}), events ({}) and design rows ({}) must agree",
                times.len(), events.len(), design.nrows()
            )
        ));
    }

    let eta = linear_predictor(design, beta)?;
    RiskSetOrder::new(times).log_likelihood(eta.view(), events)
}
