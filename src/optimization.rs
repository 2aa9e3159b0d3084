use std::fmt;

use ndarray::{Array1, ArrayView1};
use rand::{rngs::StdRng, Rng};
use rand_distr::StandardNormal;
use crate::{
    error::{CoxError, Result},
    objective::Objective,
};

/// anything that can drive an objective down within an iteration budget
///
/// non-convergence is not an error: implementations hand back the best point
/// they saw. only an objective that was never finite counts as failure.
pub trait Minimizer: Send + Sync + fmt::Debug {
    fn minimize(&self, objective: &dyn Objective, budget: usize, rng: &mut StdRng) -> Result<Array1<f64>>;
}

/// rescale to unit euclidean norm in place; zero/non-finite norms are left alone
pub fn normalize_unit(beta: &mut Array1<f64>) {
    let norm = beta.dot(beta).sqrt();
    if norm > 0.0 && norm.is_finite() {
        beta.mapv_inplace(|b| b / norm);
    }
}

/// uniform start in `[-range, range)` per coordinate
fn random_start(dim: usize, range: f64, rng: &mut StdRng) -> Array1<f64> {
    Array1::from_shape_fn(dim, |_| rng.gen_range(-range..range))
}

/// NaN objectives are treated as +inf so comparisons stay total
fn evaluate(objective: &dyn Objective, beta: ArrayView1<f64>) -> f64 {
    let value = objective.evaluate(beta);
    if value.is_nan() { f64::INFINITY } else { value }
}

fn finish(best: Array1<f64>, best_value: f64, name: &str) -> Result<Array1<f64>> {
    if !best_value.is_finite() {
        return Err(CoxError::minimizer_failed(
            format!("{} never reached a finite objective value", name)
        ));
    }
    Ok(best)
}

fn check_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CoxError::invalid_parameter(name, value));
    }
    Ok(())
}

/// per-coordinate proposal std grows by this on an improving move and shrinks
/// by `STEP_GROWTH^(-1/4)` otherwise, so it settles where ~1 in 5 proposals improve
const STEP_GROWTH: f64 = 1.5;
const MIN_STEP: f64 = 1e-10;
const MAX_STEP: f64 = 1e3;

/// non-finite bests (nothing evaluated yet) fall back to 1
fn temperature_scale(best_value: f64) -> f64 {
    if best_value.is_finite() {
        best_value.abs().max(f64::MIN_POSITIVE)
    } else {
        1.0
    }
}

/// Configuration for simulated annealing
///
/// temperatures are relative: both get multiplied by the magnitude of the
/// best objective value seen so far, so the same defaults suit a mean
/// log-likelihood of order 1 and an objective in the thousands.
#[derive(Debug, Clone)]
pub struct AnnealingConfig {
    pub initial_temperature: f64,
    pub final_temperature: f64,       // reached on the last temperature level of the budget
    pub steps_per_temperature: usize, // iterations spent at each temperature level
    pub step_scale: f64,              // starting proposal std of every coordinate
    pub zero_probability: f64,        // chance a proposal sets its coordinate to exactly 0
    pub init_range: f64,              // start drawn from U[-init_range, init_range)
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 0.05,
            final_temperature: 1e-6,
            steps_per_temperature: 10,
            step_scale: 0.5,
            zero_probability: 0.1,
            init_range: 1.0,
        }
    }
}

impl AnnealingConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("initial_temperature", self.initial_temperature)?;
        check_positive("final_temperature", self.final_temperature)?;
        if self.final_temperature > self.initial_temperature {
            return Err(CoxError::invalid_parameter(
                "final_temperature",
                format!("{} (above initial {})", self.final_temperature, self.initial_temperature),
            ));
        }
        if self.steps_per_temperature == 0 {
            return Err(CoxError::invalid_parameter("steps_per_temperature", 0));
        }
        check_positive("step_scale", self.step_scale)?;
        if !(0.0..1.0).contains(&self.zero_probability) {
            return Err(CoxError::invalid_parameter("zero_probability", self.zero_probability));
        }
        check_positive("init_range", self.init_range)
    }
}

/// single-coordinate simulated annealing w/ geometric cooling
///
/// iteration `k` perturbs coordinate `(k-1) mod dim`: usually by a gaussian
/// step w/ that coordinate's own std, sometimes straight to zero so lasso
/// kinks are reachable exactly. the temperature is held for
/// `steps_per_temperature` iterations at a time and falls geometrically from
/// the initial to the final temperature across the budget; uphill moves are
/// accepted w/ metropolis probability `exp(-dy/T)`. each step std follows the
/// 1/5 success rule on strict improvements.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAnnealing {
    config: AnnealingConfig,
}

impl SimulatedAnnealing {
    pub fn new(config: AnnealingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnnealingConfig {
        &self.config
    }

    fn temperature(&self, scale: f64, iteration: usize, budget: usize) -> f64 {
        let steps = self.config.steps_per_temperature.max(1);
        let level = ((iteration - 1) / steps) * steps;
        let progress = (level as f64 / budget.saturating_sub(1).max(1) as f64).min(1.0);
        let ratio = self.config.final_temperature / self.config.initial_temperature;
        scale * self.config.initial_temperature * ratio.powf(progress)
    }
}

impl Minimizer for SimulatedAnnealing {
    fn minimize(&self, objective: &dyn Objective, budget: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
        let dim = objective.dim();
        let mut current = random_start(dim, self.config.init_range, rng);
        let mut current_value = evaluate(objective, current.view());
        let mut best = current.clone();
        let mut best_value = current_value;
        if dim == 0 {
            return finish(best, best_value, "simulated annealing");
        }

        let shrink = STEP_GROWTH.powf(-0.25);
        let mut steps = Array1::from_elem(dim, self.config.step_scale);
        let mut accepted = 0usize;

        for iteration in 1..=budget {
            let temperature = self.temperature(temperature_scale(best_value), iteration, budget);
            let j = (iteration - 1) % dim;
            let origin = current[j];

            let snap = rng.gen::<f64>() < self.config.zero_probability;
            current[j] = if snap {
                0.0
            } else {
                origin + steps[j] * rng.sample::<f64, _>(StandardNormal)
            };
            let candidate_value = evaluate(objective, current.view());
            let uphill = candidate_value - current_value;

            if !snap {
                let factor = if uphill < 0.0 { STEP_GROWTH } else { shrink };
                steps[j] = (steps[j] * factor).clamp(MIN_STEP, MAX_STEP);
            }

            let accept = uphill <= 0.0 || rng.gen::<f64>() < (-uphill / temperature).exp();
            if accept {
                current_value = candidate_value;
                accepted += 1;
                if current_value < best_value {
                    best.assign(&current);
                    best_value = current_value;
                }
            } else {
                current[j] = origin;
            }
        }

        log::debug!(
            "annealing: {} iterations, {} accepted, best objective {:.6}",
            budget, accepted, best_value
        );
        finish(best, best_value, "simulated annealing")
    }
}

/// Configuration for coordinate search
#[derive(Debug, Clone)]
pub struct CoordinateSearchConfig {
    pub initial_step: f64,
    pub min_step: f64,
    pub shrink: f64,       // step multiplier after a sweep w/o improvement
    pub init_range: f64,
}

impl Default for CoordinateSearchConfig {
    fn default() -> Self {
        Self {
            initial_step: 0.5,
            min_step: 1e-6,
            shrink: 0.5,
            init_range: 1.0,
        }
    }
}

/// derivative-free coordinate-wise compass search
///
/// each sweep tries, per coordinate, `+step`, `-step` and an exact zero (so
/// lasso kinks can be reached exactly), keeping the first improvement. the
/// budget counts sweeps. aside from the random start it is deterministic,
/// which makes it handy for checking the annealer's results.
#[derive(Debug, Clone, Default)]
pub struct CoordinateSearch {
    config: CoordinateSearchConfig,
}

impl CoordinateSearchConfig {
    pub fn validate(&self) -> Result<()> {
        check_positive("initial_step", self.initial_step)?;
        check_positive("min_step", self.min_step)?;
        if !(self.shrink > 0.0 && self.shrink < 1.0) {
            return Err(CoxError::invalid_parameter("shrink", self.shrink));
        }
        check_positive("init_range", self.init_range)
    }
}

impl CoordinateSearch {
    pub fn new(config: CoordinateSearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
}

impl Minimizer for CoordinateSearch {
    fn minimize(&self, objective: &dyn Objective, budget: usize, rng: &mut StdRng) -> Result<Array1<f64>> {
        let dim = objective.dim();
        let mut beta = random_start(dim, self.config.init_range, rng);
        let mut value = evaluate(objective, beta.view());
        let mut step = self.config.initial_step;
        let mut sweeps = 0;

        for _ in 0..budget {
            sweeps += 1;
            let mut improved = false;

            for j in 0..dim {
                let origin = beta[j];
                for trial in [origin + step, origin - step, 0.0] {
                    if trial == origin {
                        continue;
                    }
                    beta[j] = trial;
                    let trial_value = evaluate(objective, beta.view());
                    if trial_value < value {
                        value = trial_value;
                        improved = true;
                        break;
                    }
                    beta[j] = origin;
                }
            }

            if !improved {
                step *= self.config.shrink;
                if step < self.config.min_step {
                    break;
                }
            }
        }

        log::debug!("coordinate search: {} sweeps, final step {:.2e}, objective {:.6}", sweeps, step, value);
        finish(beta, value, "coordinate search")
    }
}
