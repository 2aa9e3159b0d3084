//! baseline hazard + subject-level survival curves
//!
//! 1. zero-covariate cox fit -> cumulative baseline hazard at each distinct event time
//! 2. divided differences of that curve -> hazard on the grid (last time point dropped)
//! 3. subject hazard = baseline * exp(eta)
//! 4. survival = exp(-running integral), integrated w/ the min-plus-half-gap trapezoid

use std::fmt;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use crate::{
    data::distinct_event_times,
    error::{CoxError, Result},
};

/// cumulative baseline hazard sampled at distinct event times
#[derive(Debug, Clone)]
pub struct CumulativeHazard {
    pub times: Array1<f64>,
    pub values: Array1<f64>,
}

/// source of the covariate-free cumulative hazard; swap in another estimator here
pub trait BaselineEstimator: Send + Sync + fmt::Debug {
    fn cumulative_hazard(&self, times: ArrayView1<f64>, events: ArrayView1<bool>) -> Result<CumulativeHazard>;
}

/// breslow estimator of a cox model w/ no covariates (= nelson-aalen)
#[derive(Debug, Clone, Copy, Default)]
pub struct BreslowEstimator;

impl BaselineEstimator for BreslowEstimator {
    fn cumulative_hazard(&self, times: ArrayView1<f64>, events: ArrayView1<bool>) -> Result<CumulativeHazard> {
        if times.len() != events.len() {
            return Err(CoxError::shape_mismatch(
                format!("times len ({}) != events len ({})", times.len(), events.len())
            ));
        }

        let event_times = distinct_event_times(times, events);
        let mut values = Vec::with_capacity(event_times.len());
        let mut cumulative = 0.0;

        for &event_time in &event_times {
            let at_risk = times.iter().filter(|&&t| t >= event_time).count();
            let deaths = times
                .iter()
                .zip(events.iter())
                .filter(|&(&t, &e)| e && t == event_time)
                .count();
            cumulative += deaths as f64 / at_risk as f64;
            values.push(cumulative);
        }

        Ok(CumulativeHazard {
            times: Array1::from(event_times),
            values: Array1::from(values),
        })
    }
}

/// baseline hazard on a time grid
#[derive(Debug, Clone)]
pub struct BaselineHazard {
    grid: Array1<f64>,       // event times minus the last one
    increments: Array1<f64>, // non-negative baseline hazard per grid time
}

impl BaselineHazard {
    /// estimate from training times/events
    pub fn fit(estimator: &dyn BaselineEstimator, times: ArrayView1<f64>, events: ArrayView1<bool>) -> Result<Self> {
        let cumulative = estimator.cumulative_hazard(times, events)?;
        Self::from_cumulative(&cumulative)
    }

    /// differentiate a cumulative curve; needs at least two distinct event times
    pub fn from_cumulative(cumulative: &CumulativeHazard) -> Result<Self> {
        let m = cumulative.times.len();
        if cumulative.values.len() != m {
            return Err(CoxError::shape_mismatch(
                format!("{} cumulative values for {} times", cumulative.values.len(), m)
            ));
        }
        if m < 2 {
            return Err(CoxError::invalid_cohort(
                format!("need at least 2 distinct event times for a baseline hazard, got {}", m)
            ));
        }

        let mut increments = Array1::zeros(m - 1);
        for k in 0..m - 1 {
            let dt = cumulative.times[k + 1] - cumulative.times[k];
            if !(dt > 0.0) {
                return Err(CoxError::degenerate(
                    "cumulative hazard times must be strictly increasing"
                ));
            }
            let rate = (cumulative.values[k + 1] - cumulative.values[k]) / dt;
            increments[k] = rate.max(0.0);
        }

        Ok(Self {
            grid: cumulative.times.slice(ndarray::s![..m - 1]).to_owned(),
            increments,
        })
    }

    pub fn grid(&self) -> ArrayView1<'_, f64> {
        self.grid.view()
    }

    pub fn increments(&self) -> ArrayView1<'_, f64> {
        self.increments.view()
    }

    /// hazard & survival curves for subjects w/ linear predictors `eta`
    pub fn predict(&self, eta: ArrayView1<f64>) -> PredictionSurface {
        let n = eta.len();
        let m = self.grid.len();
        let mut hazard = Array2::zeros((n, m));
        let mut survival = Array2::zeros((n, m));

        for (i, &lp) in eta.iter().enumerate() {
            let ratio = lp.exp();
            let subject_hazard = self.increments.mapv(|h| h * ratio);
            survival.row_mut(i).assign(&integrate_survival(self.grid.view(), subject_hazard.view()));
            hazard.row_mut(i).assign(&subject_hazard);
        }

        PredictionSurface {
            times: self.grid.clone(),
            hazard,
            survival,
        }
    }
}

/// survival curve from a hazard curve on `grid`
///
/// between neighbouring grid points the cumulative hazard grows by
/// `dt*min(h_k, h_{k-1}) + 0.5*dt*|h_k - h_{k-1}|` (trapezoid written as
/// floor plus half the gap), and `S_k = exp(-cumulative)`. `S_0 = 1`.
pub fn integrate_survival(grid: ArrayView1<f64>, hazard: ArrayView1<f64>) -> Array1<f64> {
    let m = grid.len().min(hazard.len());
    let mut survival = Array1::ones(m);
    let mut cumulative = 0.0;

    for k in 1..m {
        let dt = grid[k] - grid[k - 1];
        let (h, h_prev) = (hazard[k], hazard[k - 1]);
        let mut area = dt * h.min(h_prev) + 0.5 * dt * (h - h_prev).abs();
        if area.is_nan() {
            // inf - inf in the gap term: the hazard blew up, so does the area
            area = f64::INFINITY;
        }
        cumulative += area;
        survival[k] = (-cumulative).exp();
    }

    survival
}

/// index of the grid time closest to `time`
///
/// an exact midpoint goes to the earlier time; anything outside the grid
/// clamps to the nearest end. `None` only for an empty grid.
pub fn nearest_time_index(grid: ArrayView1<f64>, time: f64) -> Option<usize> {
    let m = grid.len();
    if m == 0 {
        return None;
    }

    let above = grid.iter().position(|&t| t >= time).unwrap_or(m);
    Some(match above {
        0 => 0,
        k if k == m => m - 1,
        k => {
            if time - grid[k - 1] <= grid[k] - time { k - 1 } else { k }
        }
    })
}

/// per-subject hazard & survival curves on a shared time grid
#[derive(Debug, Clone)]
pub struct PredictionSurface {
    pub times: Array1<f64>,    // grid, length m
    pub hazard: Array2<f64>,   // n_query x m
    pub survival: Array2<f64>, // n_query x m
}

impl PredictionSurface {
    pub fn n_subjects(&self) -> usize {
        self.survival.len_of(Axis(0))
    }

    /// survival of `subject` at the grid time nearest `time`
    pub fn survival_at(&self, subject: usize, time: f64) -> Result<f64> {
        if subject >= self.n_subjects() {
            return Err(CoxError::invalid_parameter("subject", subject));
        }
        let k = nearest_time_index(self.times.view(), time)
            .ok_or_else(|| CoxError::degenerate("prediction surface has an empty time grid"))?;
        Ok(self.survival[[subject, k]])
    }

    /// each subject's survival at its own time (nearest grid point, no interpolation)
    pub fn survival_at_observed(&self, times: ArrayView1<f64>) -> Result<Array1<f64>> {
        if times.len() != self.n_subjects() {
            return Err(CoxError::shape_mismatch(
                format!("{} query times for {} subjects", times.len(), self.n_subjects())
            ));
        }
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| self.survival_at(i, t))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }
}
